// 🏷️ Party aliases - alias → canonical party name, as data
// Injected into the members connector; loadable from a JSON object file.

use anyhow::{Context as AnyhowContext, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyAliases {
    aliases: HashMap<String, String>,
}

impl PartyAliases {
    /// No aliasing at all
    pub fn empty() -> Self {
        PartyAliases {
            aliases: HashMap::new(),
        }
    }

    /// Load aliases from a JSON object: `{"Labour (Co-op)": "Labour"}`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read party alias file: {:?}", path.as_ref()))?;

        let aliases: HashMap<String, String> =
            serde_json::from_str(&content).context("Failed to parse party alias JSON")?;

        let mut table = PartyAliases::empty();
        for (alias, canonical) in aliases {
            table.add_alias(&alias, &canonical);
        }
        Ok(table)
    }

    /// Add or replace an alias; blank entries are ignored
    pub fn add_alias(&mut self, alias: &str, canonical: &str) {
        let alias = alias.trim();
        let canonical = canonical.trim();
        if alias.is_empty() || canonical.is_empty() || alias == canonical {
            return;
        }
        self.aliases.insert(alias.to_string(), canonical.to_string());
    }

    /// Canonical party name; unknown names pass through trimmed
    pub fn canonical(&self, party: &str) -> String {
        let party = party.trim();
        self.aliases
            .get(party)
            .cloned()
            .unwrap_or_else(|| party.to_string())
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl Default for PartyAliases {
    fn default() -> Self {
        let mut table = PartyAliases::empty();
        table.add_alias("Labour (Co-op)", "Labour");
        table
    }
}

// ============================================================================
// TESTS
// ============================================================================
