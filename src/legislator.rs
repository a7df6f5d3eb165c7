// 🏛️ Legislator aggregate + staged construction
//
// A `Legislator` only exists once every required field has been set: the
// builder is the single way to obtain one and `build()` reports every
// missing field at once.

use crate::error::{PipelineError, Result};
use crate::mappings::{ConstituencyKey, SecondaryIdentity};
use crate::votes::VoteRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// MEMBER FRAGMENT (from the members paginator)
// ============================================================================

/// What the members source knows about one seat before reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberFragment {
    pub id: String,
    pub name: String,
    pub party: String,
    pub constituency: ConstituencyKey,
    pub gender: Option<String>,
    pub start_date: NaiveDate,
}

// ============================================================================
// ELECTION STATS + VOTE STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionStats {
    pub electorate: Option<i64>,
    pub turnout: Option<i64>,
    pub majority: Option<i64>,
}

impl ElectionStats {
    pub fn is_empty(&self) -> bool {
        self.electorate.is_none() && self.turnout.is_none() && self.majority.is_none()
    }
}

/// Whether the vote list is the full record or a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VotesStatus {
    Complete,
    /// The vote page could not be read; the legislator is persisted flagged
    Unavailable { reason: String },
}

// ============================================================================
// LEGISLATOR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Legislator {
    id: String,
    name: String,
    secondary_id: Option<String>,
    party: String,
    constituency: ConstituencyKey,
    region: String,
    gender: Option<String>,
    start_date: NaiveDate,
    election: ElectionStats,
    government_post: Option<String>,
    votes: Vec<VoteRecord>,
    votes_status: VotesStatus,
}

impl Legislator {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secondary_id(&self) -> Option<&str> {
        self.secondary_id.as_deref()
    }

    pub fn party(&self) -> &str {
        &self.party
    }

    pub fn constituency(&self) -> &ConstituencyKey {
        &self.constituency
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Not every member record carries one
    pub fn gender(&self) -> Option<&str> {
        self.gender.as_deref()
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn election(&self) -> ElectionStats {
        self.election
    }

    pub fn government_post(&self) -> Option<&str> {
        self.government_post.as_deref()
    }

    pub fn votes(&self) -> &[VoteRecord] {
        &self.votes
    }

    pub fn votes_status(&self) -> &VotesStatus {
        &self.votes_status
    }

    pub fn votes_complete(&self) -> bool {
        self.votes_status == VotesStatus::Complete
    }

    pub fn describe(&self) -> String {
        format!(
            "{} of the {} party, representing the constituents of {}",
            self.name, self.party, self.constituency
        )
    }
}

// ============================================================================
// BUILDER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct LegislatorBuilder {
    id: Option<String>,
    name: Option<String>,
    secondary_id: Option<String>,
    party: Option<String>,
    constituency: Option<ConstituencyKey>,
    region: Option<String>,
    gender: Option<String>,
    start_date: Option<NaiveDate>,
    election: ElectionStats,
    government_post: Option<String>,
    votes: Option<(Vec<VoteRecord>, VotesStatus)>,
}

/// Blank strings count as "not set"
fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl LegislatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the members source
    pub fn from_fragment(fragment: &MemberFragment) -> Self {
        LegislatorBuilder::new()
            .with_id(&fragment.id)
            .with_name(&fragment.name)
            .with_party(&fragment.party)
            .with_constituency(fragment.constituency.clone())
            .with_gender(fragment.gender.as_deref().unwrap_or_default())
            .with_start_date(fragment.start_date)
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = non_blank(id);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = non_blank(name);
        self
    }

    pub fn with_party(mut self, party: &str) -> Self {
        self.party = non_blank(party);
        self
    }

    pub fn with_constituency(mut self, constituency: ConstituencyKey) -> Self {
        self.constituency = Some(constituency);
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = non_blank(region);
        self
    }

    pub fn with_gender(mut self, gender: &str) -> Self {
        self.gender = non_blank(gender);
        self
    }

    pub fn with_start_date(mut self, start_date: NaiveDate) -> Self {
        self.start_date = Some(start_date);
        self
    }

    /// The secondary source's display name replaces the members-API name
    pub fn with_secondary_identity(mut self, identity: &SecondaryIdentity) -> Self {
        self.name = non_blank(&identity.display_name);
        self.secondary_id = non_blank(&identity.secondary_id);
        self
    }

    /// Id only, keeping the current name (snapshot imports)
    pub fn with_secondary_id(mut self, secondary_id: &str) -> Self {
        self.secondary_id = non_blank(secondary_id);
        self
    }

    pub fn with_government_post(mut self, post: &str) -> Self {
        self.government_post = non_blank(post);
        self
    }

    pub fn with_election(mut self, election: ElectionStats) -> Self {
        self.election = election;
        self
    }

    pub fn with_votes(mut self, votes: Vec<VoteRecord>) -> Self {
        self.votes = Some((votes, VotesStatus::Complete));
        self
    }

    pub fn with_votes_unavailable(mut self, reason: impl Into<String>) -> Self {
        self.votes = Some((
            Vec::new(),
            VotesStatus::Unavailable {
                reason: reason.into(),
            },
        ));
        self
    }

    /// Secondary id, once the identity join has run
    pub fn secondary_id(&self) -> Option<&str> {
        self.secondary_id.as_deref()
    }

    pub fn constituency(&self) -> Option<&ConstituencyKey> {
        self.constituency.as_ref()
    }

    pub fn build(self) -> Result<Legislator> {
        let mut missing = Vec::new();
        if self.id.is_none() {
            missing.push("id");
        }
        if self.name.is_none() {
            missing.push("name");
        }
        if self.party.is_none() {
            missing.push("party");
        }
        if self.constituency.is_none() {
            missing.push("constituency");
        }
        if self.region.is_none() {
            missing.push("region");
        }
        if self.start_date.is_none() {
            missing.push("start_date");
        }
        if self.votes.is_none() {
            missing.push("votes");
        }

        match (
            self.id,
            self.name,
            self.party,
            self.constituency,
            self.region,
            self.start_date,
            self.votes,
        ) {
            (
                Some(id),
                Some(name),
                Some(party),
                Some(constituency),
                Some(region),
                Some(start_date),
                Some((votes, votes_status)),
            ) => Ok(Legislator {
                id,
                name,
                secondary_id: self.secondary_id,
                party,
                constituency,
                region,
                gender: self.gender,
                start_date,
                election: self.election,
                government_post: self.government_post,
                votes,
                votes_status,
            }),
            _ => Err(PipelineError::Validation(format!(
                "legislator is missing required fields: {}",
                missing.join(", ")
            ))),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
