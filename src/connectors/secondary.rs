// 🔑 Secondary-API client (keyed third-party member list)
// One authenticated request returns every member; no paging, no retry.

use super::{decode_json, string_or_number};
use crate::error::Result;
use crate::http::HttpFetch;
use crate::mappings::{ConstituencyKey, SecondaryIdentityMap};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct SecondaryRecord {
    constituency: String,
    name: String,
    #[serde(deserialize_with = "string_or_number")]
    person_id: String,
}

pub struct SecondaryApiClient<'a, F: ?Sized> {
    fetcher: &'a F,
    url: String,
    api_key: String,
    output: String,
}

impl<'a, F: HttpFetch + ?Sized> SecondaryApiClient<'a, F> {
    pub fn new(fetcher: &'a F, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        SecondaryApiClient {
            fetcher,
            url: url.into(),
            api_key: api_key.into(),
            output: "js".to_string(),
        }
    }

    /// constituency → {display name, secondary id}
    ///
    /// A network failure or non-2xx propagates unrecovered.
    pub fn fetch_identities(&self) -> Result<SecondaryIdentityMap> {
        info!(url = %self.url, "fetching secondary identities");
        let query = [("key", self.api_key.clone()), ("output", self.output.clone())];
        let response = self.fetcher.get(&self.url, &query)?;
        let records: Vec<SecondaryRecord> = decode_json(&self.url, response)?;

        let mut identities = SecondaryIdentityMap::new();
        for record in records {
            let key = ConstituencyKey::new(&record.constituency)?;
            identities.insert(key, &record.name, &record.person_id)?;
        }

        debug!(identities = identities.len(), "secondary identities parsed");
        Ok(identities)
    }
}
