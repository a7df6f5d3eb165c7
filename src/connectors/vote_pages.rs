// 📜 Per-member vote scraper
// container → panels → (h2 with id) → vote-descriptions list → one
// VoteRecord per list item. Panels whose heading has no id are not policy
// issues and are skipped; a page with no qualifying panel has no votes.

use super::VoteSource;
use crate::error::{PipelineError, Result};
use crate::http::HttpFetch;
use crate::votes::VoteRecord;
use scraper::{Html, Selector};
use tracing::debug;

struct VotePageSelectors {
    container: Selector,
    panel: Selector,
    heading: Selector,
    descriptions: Selector,
    item: Selector,
    evidence: Selector,
}

impl VotePageSelectors {
    fn new() -> Result<Self> {
        let parse = |css: &str| {
            Selector::parse(css)
                .map_err(|e| PipelineError::Parse(format!("bad selector '{}': {}", css, e)))
        };

        Ok(VotePageSelectors {
            container: parse("div.primary-content__unit")?,
            panel: parse("div.panel")?,
            heading: parse("h2")?,
            descriptions: parse("ul.vote-descriptions")?,
            item: parse("li.vote-description")?,
            evidence: parse("a.vote-description__evidence")?,
        })
    }
}

/// Parse one member's vote page
pub fn parse_vote_page(html: &str) -> Result<Vec<VoteRecord>> {
    let selectors = VotePageSelectors::new()?;
    let document = Html::parse_document(html);

    let container = document
        .select(&selectors.container)
        .next()
        .ok_or_else(|| PipelineError::Parse("vote page has no content container".to_string()))?;

    let mut votes = Vec::new();
    for panel in container.select(&selectors.panel) {
        let issue_id = panel
            .select(&selectors.heading)
            .next()
            .and_then(|heading| heading.value().attr("id"));
        let Some(issue_id) = issue_id else {
            continue;
        };

        let descriptions = panel.select(&selectors.descriptions).next().ok_or_else(|| {
            PipelineError::Parse(format!("issue panel '{}' has no vote descriptions", issue_id))
        })?;

        for item in descriptions.select(&selectors.item) {
            let policy = item.value().attr("data-policy-desc").ok_or_else(|| {
                PipelineError::Parse(format!("vote in '{}' has no policy description", issue_id))
            })?;
            let evidence = item
                .select(&selectors.evidence)
                .next()
                .map(|a| a.text().collect::<String>())
                .ok_or_else(|| {
                    PipelineError::Parse(format!("vote '{}' has no evidence text", policy))
                })?;

            votes.push(VoteRecord::from_evidence(policy.trim(), evidence.trim())?);
        }
    }

    Ok(votes)
}

// ============================================================================
// SCRAPER
// ============================================================================

pub struct VotePageScraper<'a, F: ?Sized> {
    fetcher: &'a F,
    /// Contains `{id}`, replaced by the secondary-source id
    url_template: String,
}

impl<'a, F: HttpFetch + ?Sized> VotePageScraper<'a, F> {
    pub fn new(fetcher: &'a F, url_template: impl Into<String>) -> Self {
        VotePageScraper {
            fetcher,
            url_template: url_template.into(),
        }
    }
}

impl<'a, F: HttpFetch + ?Sized> VoteSource for VotePageScraper<'a, F> {
    fn votes(&self, secondary_id: &str) -> Result<Vec<VoteRecord>> {
        let url = self.url_template.replace("{id}", secondary_id);
        let response = self.fetcher.get(&url, &[])?;
        if !response.is_success() {
            return Err(PipelineError::TransientSource {
                url,
                status: response.status,
            });
        }

        let votes = parse_vote_page(&response.body)?;
        debug!(secondary_id, votes = votes.len(), "vote page parsed");
        Ok(votes)
    }
}

// ============================================================================
// TESTS
// ============================================================================
