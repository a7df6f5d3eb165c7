// 🔌 Source connectors
// Each connector fetches and parses exactly one external source into a
// keyed mapping. No side effects beyond the HTTP requests themselves.

pub mod elections;
pub mod members;
pub mod posts;
pub mod regions;
pub mod secondary;
pub mod vote_pages;

pub use elections::ElectionResultClient;
pub use members::{MemberListing, MembersPaginator, RejectedMember};
pub use posts::GovernmentPostsClient;
pub use regions::{parse_region_tables, NationTables, RegionTableScraper};
pub use secondary::SecondaryApiClient;
pub use vote_pages::{parse_vote_page, VotePageScraper};

use crate::error::{PipelineError, Result};
use crate::http::HttpResponse;
use crate::legislator::ElectionStats;
use crate::votes::VoteRecord;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

// ============================================================================
// PER-MEMBER SOURCES
// ============================================================================

/// Live election statistics for one member
pub trait ElectionStatsSource: Send + Sync {
    fn election_stats(&self, member_id: &str) -> Result<ElectionStats>;
}

/// Vote record of one member, by secondary-source id
pub trait VoteSource: Send + Sync {
    fn votes(&self, secondary_id: &str) -> Result<Vec<VoteRecord>>;
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Turn a non-2xx into `TransientSource`, then decode the JSON body
pub(crate) fn decode_json<T: DeserializeOwned>(url: &str, response: HttpResponse) -> Result<T> {
    if !response.is_success() {
        return Err(PipelineError::TransientSource {
            url: url.to_string(),
            status: response.status,
        });
    }

    serde_json::from_str(&response.body)
        .map_err(|e| PipelineError::Parse(format!("unexpected JSON from {}: {}", url, e)))
}

/// Ids arrive as numbers from one API and strings from another
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}
