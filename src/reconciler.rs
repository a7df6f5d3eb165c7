// ⚖️ Reconciler - joins connector outputs into complete Legislators
//
// Steps run in a fixed order and each one can fail on its own:
//   region → secondary identity → government post → election stats → votes
// A failure affects only the legislator being reconciled.

use crate::connectors::{ElectionStatsSource, VoteSource};
use crate::error::{PipelineError, Result};
use crate::legislator::{Legislator, LegislatorBuilder, MemberFragment};
use crate::mappings::{ConstituencyKey, GovernmentPosts, RegionMap, SecondaryIdentityMap};
use tracing::{debug, warn};

/// Read-only lookups built once per run, before reconciliation starts
#[derive(Debug, Clone, Default)]
pub struct SourceMaps {
    pub regions: RegionMap,
    pub identities: SecondaryIdentityMap,
    pub posts: GovernmentPosts,
}

/// What happens when a member's vote page cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteFailurePolicy {
    /// Keep the legislator, flagged as having an incomplete vote record
    #[default]
    FlagIncomplete,
    /// Fail the legislator
    Reject,
}

pub struct Reconciler<'a> {
    maps: &'a SourceMaps,
    votes: &'a dyn VoteSource,
    election: Option<&'a dyn ElectionStatsSource>,
    vote_failures: VoteFailurePolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(maps: &'a SourceMaps, votes: &'a dyn VoteSource) -> Self {
        Reconciler {
            maps,
            votes,
            election: None,
            vote_failures: VoteFailurePolicy::default(),
        }
    }

    pub fn with_election_source(mut self, election: &'a dyn ElectionStatsSource) -> Self {
        self.election = Some(election);
        self
    }

    pub fn with_vote_failure_policy(mut self, policy: VoteFailurePolicy) -> Self {
        self.vote_failures = policy;
        self
    }

    /// Build one complete legislator from its members-source fragment
    pub fn reconcile(&self, fragment: &MemberFragment) -> Result<Legislator> {
        let key = &fragment.constituency;
        let builder = LegislatorBuilder::from_fragment(fragment);

        let builder = self.attach_region(builder, key)?;
        let builder = self.attach_identity(builder, key)?;
        let builder = self.attach_post(builder, &fragment.id);
        let builder = self.attach_election_stats(builder, &fragment.id)?;
        let builder = self.attach_votes(builder, key)?;

        builder.build()
    }

    pub fn attach_region(&self, builder: LegislatorBuilder, key: &ConstituencyKey) -> Result<LegislatorBuilder> {
        let region = self.maps.regions.lookup(key)?;
        Ok(builder.with_region(region))
    }

    /// Critical: every persisted legislator carries the secondary display name
    pub fn attach_identity(&self, builder: LegislatorBuilder, key: &ConstituencyKey) -> Result<LegislatorBuilder> {
        let identity = self.maps.identities.lookup(key)?;
        Ok(builder.with_secondary_identity(identity))
    }

    pub fn attach_post(&self, builder: LegislatorBuilder, member_id: &str) -> LegislatorBuilder {
        match self.maps.posts.get(member_id) {
            Some(post) => {
                debug!(member_id, post, "government post attached");
                builder.with_government_post(post)
            }
            None => builder,
        }
    }

    /// A missing payload leaves the stats unset; an error status fails the legislator
    pub fn attach_election_stats(&self, builder: LegislatorBuilder, member_id: &str) -> Result<LegislatorBuilder> {
        match self.election {
            Some(source) => Ok(builder.with_election(source.election_stats(member_id)?)),
            None => Ok(builder),
        }
    }

    pub fn attach_votes(&self, builder: LegislatorBuilder, key: &ConstituencyKey) -> Result<LegislatorBuilder> {
        let secondary_id = builder
            .secondary_id()
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::Validation(format!("'{}' has no secondary id to fetch votes with", key))
            })?;

        match self.votes.votes(&secondary_id) {
            Ok(votes) => Ok(builder.with_votes(votes)),
            Err(err) if self.vote_failures == VoteFailurePolicy::FlagIncomplete && !err.is_fatal() => {
                warn!(
                    constituency = %key,
                    secondary_id = %secondary_id,
                    error = %err,
                    "vote record unavailable, legislator flagged incomplete"
                );
                Ok(builder.with_votes_unavailable(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legislator::{ElectionStats, VotesStatus};
    use crate::votes::{VoteDirection, VoteRecord};
    use chrono::NaiveDate;
    use std::collections::HashMap;

    /// Vote pages keyed by secondary id; unknown ids answer HTTP 404
    struct FakeVotes(HashMap<String, Vec<VoteRecord>>);

    impl VoteSource for FakeVotes {
        fn votes(&self, secondary_id: &str) -> Result<Vec<VoteRecord>> {
            self.0
                .get(secondary_id)
                .cloned()
                .ok_or_else(|| PipelineError::TransientSource {
                    url: format!("https://votes.example/mp/{}/votes", secondary_id),
                    status: 404,
                })
        }
    }

    /// Election stats keyed by member id; unknown ids answer HTTP 500
    struct FakeElections(HashMap<String, ElectionStats>);

    impl ElectionStatsSource for FakeElections {
        fn election_stats(&self, member_id: &str) -> Result<ElectionStats> {
            self.0
                .get(member_id)
                .copied()
                .ok_or_else(|| PipelineError::TransientSource {
                    url: format!("https://members.example/{}/LatestElectionResult", member_id),
                    status: 500,
                })
        }
    }

    fn key(raw: &str) -> ConstituencyKey {
        ConstituencyKey::new(raw).unwrap()
    }

    fn fragment(id: &str, constituency: &str) -> MemberFragment {
        MemberFragment {
            id: id.to_string(),
            name: format!("Member {}", id),
            party: "Labour".to_string(),
            constituency: key(constituency),
            gender: Some("F".to_string()),
            start_date: NaiveDate::from_ymd_opt(2017, 6, 8).unwrap(),
        }
    }

    fn maps() -> SourceMaps {
        let mut maps = SourceMaps::default();
        maps.regions.insert(key("Bath"), "South West").unwrap();
        maps.regions.insert(key("Wells"), "South West").unwrap();
        maps.identities.insert(key("Bath"), "Wera Hobhouse", "25690").unwrap();
        maps.posts.insert("1", "Minister for Bath").unwrap();
        maps
    }

    fn votes() -> FakeVotes {
        FakeVotes(HashMap::from([(
            "25690".to_string(),
            vec![VoteRecord::new("Policy 1", VoteDirection::VotedFor, 0.6).unwrap()],
        )]))
    }

    #[test]
    fn test_full_reconciliation() {
        let maps = maps();
        let votes = votes();
        let elections = FakeElections(HashMap::from([(
            "1".to_string(),
            ElectionStats {
                electorate: Some(70_000),
                turnout: Some(50_000),
                majority: Some(12_000),
            },
        )]));

        let legislator = Reconciler::new(&maps, &votes)
            .with_election_source(&elections)
            .reconcile(&fragment("1", "Bath"))
            .unwrap();

        assert_eq!(legislator.name(), "Wera Hobhouse");
        assert_eq!(legislator.secondary_id(), Some("25690"));
        assert_eq!(legislator.region(), "South West");
        assert_eq!(legislator.government_post(), Some("Minister for Bath"));
        assert_eq!(legislator.election().turnout, Some(50_000));
        assert_eq!(legislator.votes().len(), 1);
        assert!(legislator.votes_complete());
    }

    #[test]
    fn test_missing_region_is_mapping_error() {
        let maps = maps();
        let votes = votes();

        let err = Reconciler::new(&maps, &votes)
            .reconcile(&fragment("2", "Atlantis"))
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::MissingMapping {
                mapping: crate::error::MappingKind::Region,
                ..
            }
        ));
        assert!(!err.is_critical());
    }

    #[test]
    fn test_missing_identity_is_critical() {
        let maps = maps();
        let votes = votes();

        let err = Reconciler::new(&maps, &votes)
            .reconcile(&fragment("3", "Wells"))
            .unwrap_err();

        assert!(err.is_critical());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_election_error_status_fails_the_legislator() {
        let maps = maps();
        let votes = votes();
        let elections = FakeElections(HashMap::new());

        let err = Reconciler::new(&maps, &votes)
            .with_election_source(&elections)
            .reconcile(&fragment("1", "Bath"))
            .unwrap_err();

        assert!(matches!(err, PipelineError::TransientSource { status: 500, .. }));
    }

    #[test]
    fn test_unreadable_votes_are_flagged_by_default() {
        let maps = maps();
        let votes = FakeVotes(HashMap::new());

        let legislator = Reconciler::new(&maps, &votes)
            .reconcile(&fragment("1", "Bath"))
            .unwrap();

        assert!(!legislator.votes_complete());
        match legislator.votes_status() {
            VotesStatus::Unavailable { reason } => assert!(reason.contains("404")),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn test_unreadable_votes_rejected_when_strict() {
        let maps = maps();
        let votes = FakeVotes(HashMap::new());

        let err = Reconciler::new(&maps, &votes)
            .with_vote_failure_policy(VoteFailurePolicy::Reject)
            .reconcile(&fragment("1", "Bath"))
            .unwrap_err();

        assert_eq!(err.code(), "E100");
    }

    #[test]
    fn test_steps_fail_independently() {
        let maps = maps();
        let votes = votes();
        let reconciler = Reconciler::new(&maps, &votes);

        // Region succeeds even though identity would fail for this seat
        let builder = LegislatorBuilder::from_fragment(&fragment("3", "Wells"));
        let builder = reconciler.attach_region(builder, &key("Wells")).unwrap();
        assert!(reconciler.attach_identity(builder.clone(), &key("Wells")).is_err());

        // Without an identity there is nothing to fetch votes with
        let err = reconciler.attach_votes(builder, &key("Wells")).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}
