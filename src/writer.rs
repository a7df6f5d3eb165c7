// ✍️ Graph Upsert Writer
// Materializes one Legislator as nodes + edges. Every command is an
// independent idempotent upsert: replaying a legislator never duplicates,
// and a crash part-way is repaired by the next full run.

use crate::error::Result;
use crate::graph::{GraphStore, NodeRef, Properties, UpsertEvent};
use crate::legislator::Legislator;
use serde_json::{json, Value};
use tracing::debug;

pub const MP_LABEL: &str = "MP";
pub const PARTY_LABEL: &str = "Party";
pub const REGION_LABEL: &str = "Region";
pub const DATE_LABEL: &str = "Date";
pub const POLICY_LABEL: &str = "Policy";

pub const MEMBER_OF: &str = "IS_A_MEMBER_OF";
pub const REPRESENTS_REGION: &str = "REPRESENTS_REGION";
pub const JOINED_HOUSE_ON: &str = "JOINED_HOUSE_ON";

/// Commands issued for one legislator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub nodes: usize,
    pub edges: usize,
}

pub struct GraphWriter<'s, S: ?Sized> {
    store: &'s S,
    run_id: String,
}

impl<'s, S: GraphStore + ?Sized> GraphWriter<'s, S> {
    pub fn new(store: &'s S, run_id: &str) -> Self {
        GraphWriter {
            store,
            run_id: run_id.to_string(),
        }
    }

    pub fn upsert(&self, legislator: &Legislator) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();

        let mp = self.node(&mut summary, MP_LABEL, "name", legislator.name(), &legislator_properties(legislator))?;
        let party = self.node(&mut summary, PARTY_LABEL, "name", legislator.party(), &Properties::new())?;
        let region = self.node(&mut summary, REGION_LABEL, "name", legislator.region(), &Properties::new())?;
        let start_date = legislator.start_date().format("%Y-%m-%d").to_string();
        let joined = self.node(&mut summary, DATE_LABEL, "date", &start_date, &Properties::new())?;

        self.edge(&mut summary, &mp, MEMBER_OF, &party, Properties::new())?;
        self.edge(&mut summary, &mp, REPRESENTS_REGION, &region, Properties::new())?;
        self.edge(&mut summary, &mp, JOINED_HOUSE_ON, &joined, Properties::new())?;

        for vote in legislator.votes() {
            let policy = self.node(&mut summary, POLICY_LABEL, "name", &vote.policy_name, &Properties::new())?;
            let mut strength = Properties::new();
            strength.insert("strength".to_string(), json!(vote.strength));
            self.edge(&mut summary, &mp, vote.direction.edge_type(), &policy, strength)?;
        }

        self.store.record_upsert(&UpsertEvent::new(
            &self.run_id,
            legislator.name(),
            json!({
                "constituency": legislator.constituency().as_str(),
                "votes": legislator.votes().len(),
                "votes_complete": legislator.votes_complete(),
                "nodes": summary.nodes,
                "edges": summary.edges,
            }),
        ))?;

        debug!(
            name = legislator.name(),
            nodes = summary.nodes,
            edges = summary.edges,
            "legislator upserted"
        );
        Ok(summary)
    }

    fn node(
        &self,
        summary: &mut UpsertSummary,
        label: &str,
        key_property: &str,
        key_value: &str,
        properties: &Properties,
    ) -> Result<NodeRef> {
        let node = self.store.upsert_node(label, key_property, key_value, properties)?;
        summary.nodes += 1;
        Ok(node)
    }

    fn edge(
        &self,
        summary: &mut UpsertSummary,
        from: &NodeRef,
        edge_type: &str,
        to: &NodeRef,
        properties: Properties,
    ) -> Result<()> {
        self.store.upsert_edge(from, edge_type, to, &properties)?;
        summary.edges += 1;
        Ok(())
    }
}

/// Scalar properties of the MP node; unset values are written as null so
/// an overwrite clears them.
fn legislator_properties(legislator: &Legislator) -> Properties {
    let election = legislator.election();
    let optional_text = |value: Option<&str>| value.map_or(Value::Null, |text| json!(text));

    let mut properties = Properties::new();
    properties.insert("id".to_string(), json!(legislator.id()));
    properties.insert("secondary_id".to_string(), optional_text(legislator.secondary_id()));
    properties.insert("party".to_string(), json!(legislator.party()));
    properties.insert("constituency".to_string(), json!(legislator.constituency().as_str()));
    properties.insert("region".to_string(), json!(legislator.region()));
    properties.insert("gender".to_string(), optional_text(legislator.gender()));
    properties.insert(
        "start_date".to_string(),
        json!(legislator.start_date().format("%Y-%m-%d").to_string()),
    );
    properties.insert("electorate".to_string(), json!(election.electorate));
    properties.insert("turnout".to_string(), json!(election.turnout));
    properties.insert("majority".to_string(), json!(election.majority));
    properties.insert("government_post".to_string(), optional_text(legislator.government_post()));
    properties.insert("votes_complete".to_string(), json!(legislator.votes_complete()));
    properties
}

// ============================================================================
// TESTS
// ============================================================================
