// 🗳️ Vote-Text Parser
// Turns "300 votes for, 200 votes against" into a direction + strength.
//
// Strength is the winning side's share of the votes, rounded to 5 decimal
// places with round-half-away-from-zero (f64::round).

use crate::error::{PipelineError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static VOTES_FOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) votes? for").expect("static vote pattern compiles")
});

static VOTES_AGAINST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) votes? against").expect("static vote pattern compiles")
});

const STRENGTH_SCALE: f64 = 100_000.0;

// ============================================================================
// VOTE DIRECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteDirection {
    #[serde(rename = "voted_for")]
    VotedFor,
    #[serde(rename = "voted_against")]
    VotedAgainst,
    #[serde(rename = "vote_split")]
    Split,
}

impl VoteDirection {
    /// Name used in snapshot files
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::VotedFor => "voted_for",
            VoteDirection::VotedAgainst => "voted_against",
            VoteDirection::Split => "vote_split",
        }
    }

    /// Relationship type written to the graph
    pub fn edge_type(&self) -> &'static str {
        match self {
            VoteDirection::VotedFor => "VOTED_FOR",
            VoteDirection::VotedAgainst => "VOTED_AGAINST",
            VoteDirection::Split => "VOTE_SPLIT",
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// VOTE RECORD
// ============================================================================

/// One policy stance of a legislator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub policy_name: String,
    pub direction: VoteDirection,
    /// Share of the winning side, in [0, 1]
    pub strength: f64,
}

impl VoteRecord {
    pub fn new(policy_name: impl Into<String>, direction: VoteDirection, strength: f64) -> Result<Self> {
        let policy_name = policy_name.into();
        if policy_name.trim().is_empty() {
            return Err(PipelineError::Validation("vote record has an empty policy name".to_string()));
        }
        if !(0.0..=1.0).contains(&strength) {
            return Err(PipelineError::Validation(format!(
                "strength {} for policy '{}' is outside [0, 1]",
                strength, policy_name
            )));
        }

        Ok(VoteRecord {
            policy_name,
            direction,
            strength: round_strength(strength),
        })
    }

    /// Build a record from the free-text vote evidence of one policy
    pub fn from_evidence(policy_name: impl Into<String>, evidence: &str) -> Result<Self> {
        let (direction, strength) = parse_vote_text(evidence)?;
        VoteRecord::new(policy_name, direction, strength)
    }
}

// ============================================================================
// VOTE TALLY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    pub votes_for: u64,
    pub votes_against: u64,
}

impl VoteTally {
    /// Extract both counts; order in the text does not matter
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(VoteTally {
            votes_for: capture_count(&VOTES_FOR, text, "for")?,
            votes_against: capture_count(&VOTES_AGAINST, text, "against")?,
        })
    }

    /// Direction is decided by comparing counts; 0/0 and ties are a split
    pub fn assess(&self) -> (VoteDirection, f64) {
        // Two u64 counts can overflow u64 when summed
        let total = u128::from(self.votes_for) + u128::from(self.votes_against);
        if total == 0 {
            return (VoteDirection::Split, 0.5);
        }

        let (direction, winning) = if self.votes_for > self.votes_against {
            (VoteDirection::VotedFor, self.votes_for)
        } else if self.votes_against > self.votes_for {
            (VoteDirection::VotedAgainst, self.votes_against)
        } else {
            return (VoteDirection::Split, 0.5);
        };

        (direction, round_strength(winning as f64 / total as f64))
    }
}

/// Parse one vote description into `(direction, strength)`
pub fn parse_vote_text(text: &str) -> Result<(VoteDirection, f64)> {
    Ok(VoteTally::from_text(text)?.assess())
}

/// Round to 5 decimal places, halves away from zero
pub fn round_strength(value: f64) -> f64 {
    (value * STRENGTH_SCALE).round() / STRENGTH_SCALE
}

fn capture_count(pattern: &Regex, text: &str, side: &str) -> Result<u64> {
    let captures = pattern.captures(text).ok_or_else(|| {
        PipelineError::Parse(format!("no 'votes {}' count in \"{}\"", side, text))
    })?;

    captures[1].parse::<u64>().map_err(|e| {
        PipelineError::Parse(format!("bad 'votes {}' count in \"{}\": {}", side, text, e))
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_majority_for() {
        let (direction, strength) = parse_vote_text("300 votes for, 200 votes against").unwrap();
        assert_eq!(direction, VoteDirection::VotedFor);
        assert_eq!(strength, 0.6);
    }

    #[test]
    fn test_majority_against_rounds_to_five_places() {
        let (direction, strength) = parse_vote_text("100 votes for, 200 votes against").unwrap();
        assert_eq!(direction, VoteDirection::VotedAgainst);
        assert_eq!(strength, 0.66667);
    }

    #[test]
    fn test_tie_is_split() {
        let (direction, strength) = parse_vote_text("150 votes for, 150 votes against").unwrap();
        assert_eq!(direction, VoteDirection::Split);
        assert_eq!(strength, 0.5);
    }

    #[test]
    fn test_zero_zero_is_split_without_dividing() {
        let (direction, strength) = parse_vote_text("0 votes for, 0 votes against").unwrap();
        assert_eq!(direction, VoteDirection::Split);
        assert_eq!(strength, 0.5);
    }

    #[test]
    fn test_singular_and_reversed_order() {
        let (direction, strength) =
            parse_vote_text("Voted 3 votes against, 1 vote for the motion").unwrap();
        assert_eq!(direction, VoteDirection::VotedAgainst);
        assert_eq!(strength, 0.75);

        let (direction, strength) = parse_vote_text("1 vote for, 0 votes against").unwrap();
        assert_eq!(direction, VoteDirection::VotedFor);
        assert_eq!(strength, 1.0);
    }

    #[test]
    fn test_counts_at_u64_limit_do_not_overflow() {
        let (direction, strength) = parse_vote_text("18446744073709551615 votes for, 1 vote against").unwrap();
        assert_eq!(direction, VoteDirection::VotedFor);
        assert_eq!(strength, 1.0);

        let text = format!("{max} votes for, {max} votes against", max = u64::MAX);
        assert_eq!(parse_vote_text(&text).unwrap(), (VoteDirection::Split, 0.5));

        // One past the limit does not fit the count itself
        let err = parse_vote_text("18446744073709551616 votes for, 1 vote against").unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_missing_count_is_parse_error() {
        let err = parse_vote_text("12 votes for, absent otherwise").unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));

        let err = parse_vote_text("no numbers at all").unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_strength_always_in_range_with_five_places() {
        for votes_for in [0u64, 1, 2, 7, 13, 99, 250, 1001] {
            for votes_against in [0u64, 1, 3, 8, 42, 333, 1000] {
                let text = format!("{} votes for, {} votes against", votes_for, votes_against);
                let (_, strength) = parse_vote_text(&text).unwrap();

                assert!((0.0..=1.0).contains(&strength), "{} out of range", strength);
                assert!(strength >= 0.5, "winning share below half: {}", strength);
                let scaled = strength * STRENGTH_SCALE;
                assert!((scaled - scaled.round()).abs() < 1e-6, "{} not 5dp", strength);
            }
        }
    }

    #[test]
    fn test_vote_record_validation() {
        let record = VoteRecord::from_evidence("Policy 1", "2 votes for, 1 vote against").unwrap();
        assert_eq!(record.direction, VoteDirection::VotedFor);
        assert_eq!(record.strength, 0.66667);

        assert!(VoteRecord::new("", VoteDirection::Split, 0.5).is_err());
        assert!(VoteRecord::new("Policy", VoteDirection::VotedFor, 1.5).is_err());
    }

    #[test]
    fn test_direction_names() {
        assert_eq!(VoteDirection::Split.as_str(), "vote_split");
        assert_eq!(VoteDirection::VotedAgainst.edge_type(), "VOTED_AGAINST");
        assert_eq!(
            serde_json::to_string(&VoteDirection::VotedFor).unwrap(),
            "\"voted_for\""
        );
    }
}
