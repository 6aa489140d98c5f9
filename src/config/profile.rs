//! Profile-scoped grouping configuration
//!
//! Every field here lives under one profile's namespace in the key-value
//! store. Switching profiles replaces the whole struct; nothing is merged.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::constants::defaults;

/// How a flat prompt list is partitioned into groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoldingMode {
    /// A header absorbs every following entry up to the next header
    #[default]
    Standard,
    /// A header opens a group closed by the next entry with the same name
    Sandwich,
    /// Headers are designated by identifier instead of by divider prefix
    Manual,
}

impl FoldingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FoldingMode::Standard => "standard",
            FoldingMode::Sandwich => "sandwich",
            FoldingMode::Manual => "manual",
        }
    }

    /// Human-readable label used in notifications
    pub fn label(&self) -> &'static str {
        match self {
            FoldingMode::Standard => "Standard mode",
            FoldingMode::Sandwich => "Sandwich mode",
            FoldingMode::Manual => "Manual mode",
        }
    }
}

impl fmt::Display for FoldingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown folding mode '{0}' (expected standard, sandwich or manual)")]
pub struct UnknownMode(pub String);

impl FromStr for FoldingMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(FoldingMode::Standard),
            "sandwich" => Ok(FoldingMode::Sandwich),
            "manual" => Ok(FoldingMode::Manual),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

/// Grouping configuration for a single profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_dividers")]
    pub dividers: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub folding_mode: FoldingMode,

    /// Header identifiers chosen by hand (manual mode only)
    #[serde(default)]
    pub manual_headers: BTreeSet<String>,

    /// Group key → open flag; missing keys render open
    #[serde(default)]
    pub open_states: BTreeMap<String, bool>,

    /// Entry identifier → trimmed display name captured before any rewrite
    #[serde(default)]
    pub name_cache: BTreeMap<String, String>,

    #[serde(default = "default_feature_enabled")]
    pub feature_enabled: bool,
    #[serde(default)]
    pub debug: bool,
}

pub(crate) fn default_dividers() -> Vec<String> {
    defaults::DIVIDERS.iter().map(|d| d.to_string()).collect()
}

fn default_feature_enabled() -> bool {
    true
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            dividers: default_dividers(),
            case_sensitive: false,
            folding_mode: FoldingMode::default(),
            manual_headers: BTreeSet::new(),
            open_states: BTreeMap::new(),
            name_cache: BTreeMap::new(),
            feature_enabled: default_feature_enabled(),
            debug: false,
        }
    }
}

impl ProfileConfig {
    /// Restore divider, case and mode settings to their defaults.
    /// Open states, the name cache and manual headers are kept.
    pub fn reset_settings(&mut self) {
        self.dividers = default_dividers();
        self.case_sensitive = false;
        self.folding_mode = FoldingMode::default();
    }

    /// Divider list as shown in the settings text area
    pub fn dividers_text(&self) -> String {
        self.dividers.join("\n")
    }
}

/// Split newline-separated divider text into trimmed, non-empty patterns
pub fn parse_dividers(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
