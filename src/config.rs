// ⚙️ Pipeline configuration
// Layered: built-in defaults → TOML file → environment (.env honoured) → CLI flags.
// The CLI layer lives in main.rs and writes straight into the struct.

use crate::connectors::NationTables;
use crate::error::{PipelineError, Result};
use crate::http::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const API_KEY_VAR: &str = "TWFY_API_KEY";
pub const DB_PATH_VAR: &str = "PARLIAMENT_GRAPH_DB";
pub const WORKERS_VAR: &str = "PARLIAMENT_GRAPH_WORKERS";

/// Where every source lives; `{id}` is substituted per member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceUrls {
    pub members: String,
    pub election_template: String,
    pub posts: String,
    pub secondary: String,
    pub regions: String,
    pub votes_template: String,
}

impl Default for SourceUrls {
    fn default() -> Self {
        SourceUrls {
            members: "https://members-api.parliament.uk/api/Members/Search".to_string(),
            election_template: "https://members-api.parliament.uk/api/Members/{id}/LatestElectionResult"
                .to_string(),
            posts: "https://members-api.parliament.uk/api/Posts/GovernmentPosts".to_string(),
            secondary: "https://www.theyworkforyou.com/api/getMPs".to_string(),
            regions: "https://en.wikipedia.org/wiki/Constituencies_of_the_Parliament_of_the_United_Kingdom"
                .to_string(),
            votes_template: "https://www.theyworkforyou.com/mp/{id}/votes".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sources: SourceUrls,
    pub page_size: usize,
    pub max_page_requests: usize,
    pub retry_delay_secs: u64,
    pub retry_max_attempts: u32,
    pub workers: usize,
    /// Minimum spacing between requests to the same host
    pub throttle_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Environment only; never written back out
    #[serde(skip)]
    pub api_key: Option<String>,
    pub db_path: PathBuf,
    pub party_alias_file: Option<PathBuf>,
    pub nations: NationTables,
    /// Fail a legislator whose vote page cannot be read instead of flagging it
    pub strict_votes: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            sources: SourceUrls::default(),
            page_size: 20,
            max_page_requests: 200,
            retry_delay_secs: 5,
            retry_max_attempts: 30,
            workers: 4,
            throttle_ms: 250,
            timeout_secs: 30,
            user_agent: format!("parliament-graph/{}", env!("CARGO_PKG_VERSION")),
            api_key: None,
            db_path: PathBuf::from("parliament_graph.db"),
            party_alias_file: None,
            nations: NationTables::default(),
            strict_votes: false,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by whatever the TOML file sets
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {}", path.display(), e)))?;

        Self::from_toml_str(&contents)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Load `.env` if present, then apply the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        self.apply_env_with(|name| env::var(name).ok())
    }

    pub fn apply_env_with<L>(&mut self, lookup: L) -> Result<()>
    where
        L: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_VAR).filter(|key| !key.trim().is_empty()) {
            self.api_key = Some(key.trim().to_string());
        }
        if let Some(path) = lookup(DB_PATH_VAR).filter(|path| !path.trim().is_empty()) {
            self.db_path = PathBuf::from(path.trim());
        }
        if let Some(workers) = lookup(WORKERS_VAR) {
            self.workers = workers.trim().parse().map_err(|_| {
                PipelineError::Config(format!("{} must be a positive integer, got '{}'", WORKERS_VAR, workers))
            })?;
        }
        Ok(())
    }

    /// `live` runs talk to the secondary API and need its key
    pub fn validate(&self, live: bool) -> Result<()> {
        if self.page_size == 0 {
            return Err(PipelineError::Config("page_size must be at least 1".to_string()));
        }
        if self.retry_max_attempts == 0 {
            return Err(PipelineError::Config("retry_max_attempts must be at least 1".to_string()));
        }
        if self.workers == 0 {
            return Err(PipelineError::Config("workers must be at least 1".to_string()));
        }
        if self.max_page_requests == 0 {
            return Err(PipelineError::Config("max_page_requests must be at least 1".to_string()));
        }
        for template in [&self.sources.election_template, &self.sources.votes_template] {
            if !template.contains("{id}") {
                return Err(PipelineError::Config(format!("'{}' has no {{id}} placeholder", template)));
            }
        }
        if live && self.api_key.is_none() {
            return Err(PipelineError::Config(format!(
                "a live run needs the secondary API key in {}",
                API_KEY_VAR
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_secs(self.retry_delay_secs),
            max_attempts: self.retry_max_attempts,
        }
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============================================================================
// TESTS
// ============================================================================
