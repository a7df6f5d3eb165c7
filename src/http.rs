// 🌐 HTTP layer - fetch trait, reqwest implementation, throttling, retry
//
// Connectors only see `HttpFetch`. Any HTTP status is returned as data so
// each connector decides what a non-2xx means for its source.

use crate::error::{PipelineError, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ============================================================================
// RESPONSE + FETCH TRAIT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        HttpResponse {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16) -> Self {
        HttpResponse {
            status,
            body: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking GET against one source
///
/// Shared across worker threads, so implementations must be `Send + Sync`.
pub trait HttpFetch: Send + Sync {
    /// A transport failure is `Network`; every HTTP status is `Ok`.
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse>;
}

impl<F: HttpFetch + ?Sized> HttpFetch for &F {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse> {
        (**self).get(url, query)
    }
}

// ============================================================================
// REQWEST FETCHER
// ============================================================================

pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(ReqwestFetcher { client })
    }
}

impl HttpFetch for ReqwestFetcher {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse> {
        let network = |e: reqwest::Error| PipelineError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).query(query).send().map_err(network)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(network)?;

        debug!(url, status, bytes = body.len(), "fetched");
        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// PER-HOST THROTTLE
// ============================================================================

/// Spaces request starts to the same host by at least `min_interval`
pub struct Throttled<F> {
    inner: F,
    min_interval: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl<F: HttpFetch> Throttled<F> {
    pub fn new(inner: F, min_interval: Duration) -> Self {
        Throttled {
            inner,
            min_interval,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve the next free slot for the host and return how long to wait
    fn reserve(&self, host: &str) -> Duration {
        let now = Instant::now();
        let mut slots = match self.next_slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let start = slots
            .get(host)
            .copied()
            .filter(|slot| *slot > now)
            .unwrap_or(now);
        slots.insert(host.to_string(), start + self.min_interval);

        start.saturating_duration_since(now)
    }
}

impl<F: HttpFetch> HttpFetch for Throttled<F> {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse> {
        if !self.min_interval.is_zero() {
            let host = host_of(url);
            let wait = self.reserve(&host);
            if !wait.is_zero() {
                thread::sleep(wait);
            }
        }
        self.inner.get(url, query)
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}

// ============================================================================
// RETRY POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            delay: Duration::from_secs(5),
            max_attempts: 30,
        }
    }
}

/// GET with fixed-delay retry on non-2xx and transport failures
///
/// Makes at most `max_attempts` requests, sleeping `delay` between them, and
/// escalates to `SourceExhausted` when the last one still fails.
pub fn fetch_with_retry<F: HttpFetch + ?Sized>(
    fetcher: &F,
    url: &str,
    query: &[(&str, String)],
    policy: RetryPolicy,
) -> Result<HttpResponse> {
    for attempt in 1..=policy.max_attempts {
        let failure = match fetcher.get(url, query) {
            Ok(response) if response.is_success() => return Ok(response),
            Ok(response) => PipelineError::TransientSource {
                url: url.to_string(),
                status: response.status,
            },
            Err(err @ PipelineError::Network { .. }) => err,
            Err(err) => return Err(err),
        };

        warn!(url, attempt, max_attempts = policy.max_attempts, error = %failure, "source request failed");
        if attempt < policy.max_attempts && !policy.delay.is_zero() {
            thread::sleep(policy.delay);
        }
    }

    Err(PipelineError::SourceExhausted {
        url: url.to_string(),
        attempts: policy.max_attempts,
    })
}

// ============================================================================
// SCRIPTED FETCHER (tests)
// ============================================================================


// ============================================================================
// TESTS
// ============================================================================
