//! Roster ingestion.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Directory-unique account identifier, usually the primary email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Trimmed identifier, or `None` for a blank entry.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One identifier per line.
pub fn parse_lines(content: &str) -> Vec<AccountId> {
    content.lines().filter_map(AccountId::parse).collect()
}

/// Comma-separated identifiers.
pub fn parse_delimited(value: &str) -> Vec<AccountId> {
    value.split(',').filter_map(AccountId::parse).collect()
}

/// Build the roster for a run.
///
/// An existing `file` wins over `inline`; with neither, the roster is empty.
pub fn load_roster(file: Option<&Path>, inline: Option<&str>) -> Result<Vec<AccountId>> {
    if let Some(path) = file {
        if path.is_file() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read roster file {}", path.display()))?;
            let roster = parse_lines(&content);
            info!(path = %path.display(), accounts = roster.len(), "Loaded roster file");
            return Ok(roster);
        }
        debug!(path = %path.display(), "Roster file not found, using inline list");
    }

    Ok(inline.map(parse_delimited).unwrap_or_default())
}
