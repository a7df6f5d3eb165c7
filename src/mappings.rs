// 🗺️ Keyed mappings built once per run, read-only afterwards
//
// Every source is joined on the constituency name, so the key type does the
// normalization: trimmed and lower-cased at construction.

use crate::error::{MappingKind, PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// CONSTITUENCY KEY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConstituencyKey(String);

impl ConstituencyKey {
    pub fn new(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(PipelineError::Validation("empty constituency name".to_string()));
        }
        Ok(ConstituencyKey(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ConstituencyKey {
    type Error = PipelineError;

    fn try_from(raw: String) -> Result<Self> {
        ConstituencyKey::new(&raw)
    }
}

impl From<ConstituencyKey> for String {
    fn from(key: ConstituencyKey) -> Self {
        key.0
    }
}

impl fmt::Display for ConstituencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn require_text(value: &str, what: &str, key: &ConstituencyKey) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Validation(format!("empty {} for '{}'", what, key)));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// REGION MAP
// ============================================================================

/// constituency → region name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionMap {
    regions: BTreeMap<ConstituencyKey, String>,
}

impl RegionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later inserts for the same constituency win
    pub fn insert(&mut self, key: ConstituencyKey, region: &str) -> Result<()> {
        let region = require_text(region, "region", &key)?;
        self.regions.insert(key, region);
        Ok(())
    }

    pub fn extend(&mut self, other: RegionMap) {
        self.regions.extend(other.regions);
    }

    pub fn lookup(&self, key: &ConstituencyKey) -> Result<&str> {
        self.regions
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::MissingMapping {
                mapping: MappingKind::Region,
                key: key.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

// ============================================================================
// SECONDARY IDENTITY MAP
// ============================================================================

/// Display name and id assigned by the third-party source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIdentity {
    pub display_name: String,
    pub secondary_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecondaryIdentityMap {
    identities: HashMap<ConstituencyKey, SecondaryIdentity>,
}

impl SecondaryIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ConstituencyKey, display_name: &str, secondary_id: &str) -> Result<()> {
        let identity = SecondaryIdentity {
            display_name: require_text(display_name, "display name", &key)?,
            secondary_id: require_text(secondary_id, "secondary id", &key)?,
        };
        self.identities.insert(key, identity);
        Ok(())
    }

    pub fn lookup(&self, key: &ConstituencyKey) -> Result<&SecondaryIdentity> {
        self.identities
            .get(key)
            .ok_or_else(|| PipelineError::MissingMapping {
                mapping: MappingKind::SecondaryIdentity,
                key: key.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

// ============================================================================
// GOVERNMENT POSTS
// ============================================================================

/// member id → government post name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GovernmentPosts {
    posts: HashMap<String, String>,
}

impl GovernmentPosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, member_id: &str, post_name: &str) -> Result<()> {
        let member_id = member_id.trim();
        let post_name = post_name.trim();
        if member_id.is_empty() || post_name.is_empty() {
            return Err(PipelineError::Validation(format!(
                "government post entry needs both a member id and a name (got '{}' / '{}')",
                member_id, post_name
            )));
        }
        self.posts.insert(member_id.to_string(), post_name.to_string());
        Ok(())
    }

    /// Absence is normal: most members hold no post
    pub fn get(&self, member_id: &str) -> Option<&str> {
        self.posts.get(member_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> ConstituencyKey {
        ConstituencyKey::new(raw).unwrap()
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(key("  Bath ").as_str(), "bath");
        assert_eq!(key("Ynys Môn"), key("ynys môn"));
        assert!(ConstituencyKey::new("   ").is_err());
    }

    #[test]
    fn test_key_deserializes_normalized() {
        let parsed: ConstituencyKey = serde_json::from_str("\" Holborn and St Pancras\"").unwrap();
        assert_eq!(parsed.as_str(), "holborn and st pancras");
        assert!(serde_json::from_str::<ConstituencyKey>("\"\"").is_err());
    }

    #[test]
    fn test_region_lookup_missing_is_mapping_error() {
        let mut regions = RegionMap::new();
        regions.insert(key("Bath"), "South West").unwrap();

        assert_eq!(regions.lookup(&key("BATH")).unwrap(), "South West");

        let err = regions.lookup(&key("Atlantis")).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingMapping {
                mapping: MappingKind::Region,
                ..
            }
        ));
        assert!(!err.is_critical());
    }

    #[test]
    fn test_region_rejects_empty_value() {
        let mut regions = RegionMap::new();
        assert!(regions.insert(key("Bath"), "  ").is_err());
        assert!(regions.is_empty());
    }

    #[test]
    fn test_secondary_identity_missing_is_critical() {
        let mut identities = SecondaryIdentityMap::new();
        identities.insert(key("Bath"), "Wera Hobhouse", "25690").unwrap();

        let found = identities.lookup(&key("bath")).unwrap();
        assert_eq!(found.display_name, "Wera Hobhouse");
        assert_eq!(found.secondary_id, "25690");

        let err = identities.lookup(&key("Atlantis")).unwrap_err();
        assert!(err.is_critical());
        assert!(identities.insert(key("Wells"), "Someone", "").is_err());
    }

    #[test]
    fn test_government_posts() {
        let mut posts = GovernmentPosts::new();
        posts.insert("4514", "Prime Minister").unwrap();

        assert_eq!(posts.get("4514"), Some("Prime Minister"));
        assert_eq!(posts.get("1"), None);
        assert!(posts.insert("", "Chancellor").is_err());
    }
}
