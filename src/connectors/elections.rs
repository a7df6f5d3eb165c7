// 📊 Election-statistics connector
// Latest election result per member. A missing `value` payload leaves the
// stats unset; a non-success status fails that legislator.

use super::{decode_json, ElectionStatsSource};
use crate::error::Result;
use crate::http::HttpFetch;
use crate::legislator::ElectionStats;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct ElectionEnvelope {
    #[serde(default)]
    value: Option<ElectionValue>,
}

#[derive(Debug, Deserialize)]
struct ElectionValue {
    #[serde(default)]
    electorate: Option<i64>,
    #[serde(default)]
    turnout: Option<i64>,
    #[serde(default)]
    majority: Option<i64>,
}

pub struct ElectionResultClient<'a, F: ?Sized> {
    fetcher: &'a F,
    /// Contains `{id}`, replaced per member
    url_template: String,
}

impl<'a, F: HttpFetch + ?Sized> ElectionResultClient<'a, F> {
    pub fn new(fetcher: &'a F, url_template: impl Into<String>) -> Self {
        ElectionResultClient {
            fetcher,
            url_template: url_template.into(),
        }
    }

    fn url_for(&self, member_id: &str) -> String {
        self.url_template.replace("{id}", member_id)
    }
}

impl<'a, F: HttpFetch + ?Sized> ElectionStatsSource for ElectionResultClient<'a, F> {
    fn election_stats(&self, member_id: &str) -> Result<ElectionStats> {
        let url = self.url_for(member_id);
        let response = self.fetcher.get(&url, &[])?;
        let envelope: ElectionEnvelope = decode_json(&url, response)?;

        match envelope.value {
            Some(value) => Ok(ElectionStats {
                electorate: value.electorate,
                turnout: value.turnout,
                majority: value.majority,
            }),
            None => {
                warn!(member_id, "election result has no value payload, leaving stats unset");
                Ok(ElectionStats::default())
            }
        }
    }
}
