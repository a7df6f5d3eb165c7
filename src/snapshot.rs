// 💾 Snapshot files
// A JSON list of reconciled legislators, used as fixtures and for offline
// imports. Votes are stored as [policy, direction, strength] triples.
// A record that cannot be turned into a legislator is set aside on its own;
// only an unreadable file or a non-list document fails the whole load.
//
// [
//   {"id": 1, "name": "MP 1", "party": "Labour", "constituency": "Constituency 1",
//    "region": "London", "gender": "F", "start_date": "2019-01-01",
//    "votes": [["Policy 1", "voted_for", 0.75]]}
// ]

use crate::connectors::string_or_number;
use crate::error::{PipelineError, Result};
use crate::legislator::{ElectionStats, Legislator, LegislatorBuilder};
use crate::mappings::ConstituencyKey;
use crate::votes::{VoteDirection, VoteRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

type VoteTriple = (String, VoteDirection, f64);

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
    party: String,
    constituency: String,
    region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gender: Option<String>,
    start_date: NaiveDate,
    /// Kept loose so a non-list value is reported as a validation error
    votes: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secondary_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    government_post: Option<String>,
    #[serde(default, skip_serializing_if = "ElectionStats::is_empty")]
    election: ElectionStats,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    votes_complete: bool,
}

impl SnapshotRecord {
    fn from_legislator(legislator: &Legislator) -> Self {
        let votes: Vec<VoteTriple> = legislator
            .votes()
            .iter()
            .map(|vote| (vote.policy_name.clone(), vote.direction, vote.strength))
            .collect();

        SnapshotRecord {
            id: legislator.id().to_string(),
            name: legislator.name().to_string(),
            party: legislator.party().to_string(),
            constituency: legislator.constituency().to_string(),
            region: legislator.region().to_string(),
            gender: legislator.gender().map(str::to_string),
            start_date: legislator.start_date(),
            votes: serde_json::json!(votes),
            secondary_id: legislator.secondary_id().map(str::to_string),
            government_post: legislator.government_post().map(str::to_string),
            election: legislator.election(),
            votes_complete: legislator.votes_complete(),
        }
    }

    fn into_legislator(self) -> Result<Legislator> {
        if !self.votes.is_array() {
            return Err(PipelineError::Validation(format!(
                "votes for '{}' must be a list, got {}",
                self.name, self.votes
            )));
        }
        let triples: Vec<VoteTriple> = serde_json::from_value(self.votes).map_err(|e| {
            PipelineError::Validation(format!(
                "votes for '{}' must be [policy, direction, strength] triples: {}",
                self.name, e
            ))
        })?;
        let votes = triples
            .into_iter()
            .map(|(policy, direction, strength)| VoteRecord::new(policy, direction, strength))
            .collect::<Result<Vec<_>>>()?;

        let mut builder = LegislatorBuilder::new()
            .with_id(&self.id)
            .with_name(&self.name)
            .with_party(&self.party)
            .with_constituency(ConstituencyKey::new(&self.constituency)?)
            .with_region(&self.region)
            .with_start_date(self.start_date)
            .with_election(self.election);

        if let Some(gender) = &self.gender {
            builder = builder.with_gender(gender);
        }
        if let Some(post) = &self.government_post {
            builder = builder.with_government_post(post);
        }
        if let Some(secondary_id) = &self.secondary_id {
            builder = builder.with_secondary_id(secondary_id);
        }
        builder = if self.votes_complete {
            builder.with_votes(votes)
        } else {
            builder.with_votes_unavailable("recorded as incomplete in snapshot")
        };

        builder.build()
    }
}

/// One snapshot entry that could not be loaded
#[derive(Debug)]
pub struct RejectedRecord {
    /// Position in the snapshot list
    pub index: usize,
    /// Constituency or name when the entry has one
    pub label: String,
    pub error: PipelineError,
}

#[derive(Debug, Default)]
pub struct SnapshotLoad {
    pub legislators: Vec<Legislator>,
    pub rejected: Vec<RejectedRecord>,
}

fn record_label(index: usize, entry: &Value) -> String {
    ["constituency", "name"]
        .iter()
        .find_map(|field| entry.get(*field).and_then(Value::as_str))
        .filter(|text| !text.trim().is_empty())
        .map_or_else(|| format!("record {}", index), str::to_string)
}

fn load_record(entry: Value) -> Result<Legislator> {
    let record: SnapshotRecord = serde_json::from_value(entry)
        .map_err(|e| PipelineError::Validation(format!("malformed snapshot record: {}", e)))?;
    record.into_legislator()
}

/// Load every legislator from a snapshot file, setting aside bad records
pub fn load<P: AsRef<Path>>(path: P) -> Result<SnapshotLoad> {
    let content = fs::read_to_string(path.as_ref())?;
    let entries: Vec<Value> = serde_json::from_str(&content)?;

    let mut loaded = SnapshotLoad::default();
    for (index, entry) in entries.into_iter().enumerate() {
        let label = record_label(index, &entry);
        match load_record(entry) {
            Ok(legislator) => loaded.legislators.push(legislator),
            Err(error) => {
                warn!(index, record = %label, error = %error, "snapshot record skipped");
                loaded.rejected.push(RejectedRecord { index, label, error });
            }
        }
    }

    info!(
        path = %path.as_ref().display(),
        legislators = loaded.legislators.len(),
        rejected = loaded.rejected.len(),
        "snapshot loaded"
    );
    Ok(loaded)
}

pub fn save<P: AsRef<Path>>(path: P, legislators: &[Legislator]) -> Result<()> {
    let records: Vec<SnapshotRecord> = legislators.iter().map(SnapshotRecord::from_legislator).collect();
    fs::write(path.as_ref(), serde_json::to_string_pretty(&records)?)?;

    info!(
        path = %path.as_ref().display(),
        legislators = records.len(),
        "snapshot saved"
    );
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
