// 👥 Members paginator
// Pages through the members search endpoint with skip/take offsets until the
// number of distinct constituencies equals the reported total.
//
// Duplicate or renamed constituencies can keep the distinct count below the
// total forever, so the number of page requests is capped as well.

use super::{decode_json, string_or_number};
use crate::aliases::PartyAliases;
use crate::error::{PipelineError, Result};
use crate::http::{fetch_with_retry, HttpFetch, RetryPolicy};
use crate::legislator::MemberFragment;
use crate::mappings::ConstituencyKey;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    items: Vec<SearchItem>,
    total_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    value: MemberValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberValue {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name_display_as: String,
    latest_party: NamedValue,
    latest_house_membership: HouseMembership,
    #[serde(default)]
    gender: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedValue {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HouseMembership {
    membership_from: String,
    membership_start_date: String,
}

// ============================================================================
// LISTING
// ============================================================================

/// Members read from the source, plus the ones whose records were unusable
#[derive(Debug, Default)]
pub struct MemberListing {
    pub members: BTreeMap<ConstituencyKey, MemberFragment>,
    pub rejected: Vec<RejectedMember>,
}

impl MemberListing {
    /// Every distinct member the source reported, usable or not
    pub fn seen(&self) -> usize {
        self.members.len() + self.rejected.len()
    }
}

#[derive(Debug)]
pub struct RejectedMember {
    pub member_id: String,
    pub error: PipelineError,
}

impl RejectedMember {
    /// Label used in run reports, since no constituency key could be built
    pub fn label(&self) -> String {
        format!("member {}", self.member_id)
    }
}

fn into_rejections(rejected: BTreeMap<String, PipelineError>) -> Vec<RejectedMember> {
    rejected
        .into_iter()
        .map(|(member_id, error)| RejectedMember { member_id, error })
        .collect()
}

// ============================================================================
// PAGINATOR
// ============================================================================

pub struct MembersPaginator<'a, F: ?Sized> {
    fetcher: &'a F,
    url: String,
    house: u32,
    page_size: usize,
    max_page_requests: usize,
    retry: RetryPolicy,
    aliases: &'a PartyAliases,
}

impl<'a, F: HttpFetch + ?Sized> MembersPaginator<'a, F> {
    pub fn new(fetcher: &'a F, url: impl Into<String>, aliases: &'a PartyAliases) -> Self {
        MembersPaginator {
            fetcher,
            url: url.into(),
            house: 1,
            page_size: 20,
            max_page_requests: 200,
            retry: RetryPolicy::default(),
            aliases,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_page_requests(mut self, max_page_requests: usize) -> Self {
        self.max_page_requests = max_page_requests.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_house(mut self, house: u32) -> Self {
        self.house = house;
        self
    }

    /// Fetch every current member, keyed by constituency
    ///
    /// Retry exhaustion on any page is fatal for the whole run. A member whose
    /// own record cannot be read is set aside in `rejected` and still counts
    /// towards the reported total.
    pub fn fetch_all(&self) -> Result<MemberListing> {
        info!(url = %self.url, page_size = self.page_size, "paging members source");
        let mut listing = MemberListing::default();
        let mut rejected = BTreeMap::new();
        let mut skip = 0usize;

        for page_number in 1..=self.max_page_requests {
            let page = self.fetch_page(skip)?;
            let received = page.items.len();

            for item in page.items {
                let member_id = item.value.id.clone();
                match self.to_fragment(item.value) {
                    Ok(fragment) => {
                        rejected.remove(&member_id);
                        if let Some(previous) = listing.members.insert(fragment.constituency.clone(), fragment) {
                            debug!(constituency = %previous.constituency, "constituency seen twice, keeping latest");
                        }
                    }
                    Err(err) => {
                        warn!(member_id = %member_id, error = %err, "unreadable member record, skipping");
                        rejected.insert(member_id, err);
                    }
                }
            }

            let collected = listing.members.len() + rejected.len();
            debug!(page_number, received, collected, total = page.total_results, "members page");
            if collected >= page.total_results {
                info!(
                    members = listing.members.len(),
                    rejected = rejected.len(),
                    pages = page_number,
                    "members source complete"
                );
                listing.rejected = into_rejections(rejected);
                return Ok(listing);
            }
            if received == 0 {
                warn!(
                    collected,
                    total = page.total_results,
                    "members source ran out of items before reaching its reported total"
                );
                listing.rejected = into_rejections(rejected);
                return Ok(listing);
            }

            skip += self.page_size;
        }

        warn!(
            collected = listing.members.len() + rejected.len(),
            max_page_requests = self.max_page_requests,
            "members source hit the page request cap before reaching its reported total"
        );
        listing.rejected = into_rejections(rejected);
        Ok(listing)
    }

    fn fetch_page(&self, skip: usize) -> Result<SearchPage> {
        let query = [
            ("take", self.page_size.to_string()),
            ("skip", skip.to_string()),
            ("IsCurrentMember", "true".to_string()),
            ("House", self.house.to_string()),
        ];
        let response = fetch_with_retry(self.fetcher, &self.url, &query, self.retry)?;
        decode_json(&self.url, response)
    }

    fn to_fragment(&self, member: MemberValue) -> Result<MemberFragment> {
        let membership = member.latest_house_membership;

        Ok(MemberFragment {
            constituency: ConstituencyKey::new(&membership.membership_from)?,
            start_date: parse_start_date(&membership.membership_start_date)?,
            party: self.aliases.canonical(&member.latest_party.name),
            gender: member.gender.filter(|g| !g.trim().is_empty()),
            name: member.name_display_as,
            id: member.id,
        })
    }
}

/// "2023-01-01T00:00:00" → 2023-01-01
fn parse_start_date(raw: &str) -> Result<NaiveDate> {
    let date_part = raw.split('T').next().unwrap_or(raw).trim();
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| PipelineError::Parse(format!("bad membership start date '{}': {}", raw, e)))
}

// ============================================================================
// TESTS
// ============================================================================
