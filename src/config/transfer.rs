//! Copying one profile's grouping setup onto another
//!
//! Manual headers are identified by entry identifiers, which are only stable
//! within a profile. Exports therefore carry each header's cached name too,
//! and imports prefer the name when resolving against the target's entries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::profile::FoldingMode;
use super::store::{KeyValueStore, ProfileStore};

/// One manual header as seen by the profile it was exported from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderIdentity {
    pub identifier: String,
    /// Cached original name, empty if the source never cached one
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub source_profile: String,
    pub folding_mode: FoldingMode,
    pub dividers: Vec<String>,
    pub headers: Vec<HeaderIdentity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedHeader {
    pub identifier: String,
    pub name: String,
}

/// Outcome of resolving a snapshot's headers against the current entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub matched_by_name: usize,
    pub matched_by_identifier: usize,
    pub unmatched: Vec<UnmatchedHeader>,
    /// Resolved identifiers to use as the new manual header set
    pub headers: BTreeSet<String>,
}

impl MatchReport {
    pub fn matched(&self) -> usize {
        self.matched_by_name + self.matched_by_identifier
    }
}

/// Read `profile` from storage and pair every manual header with its cached name
pub fn export_config<S: KeyValueStore>(store: &ProfileStore<S>, profile: &str) -> ConfigSnapshot {
    let config = store.load(profile);
    let headers = config
        .manual_headers
        .iter()
        .map(|identifier| HeaderIdentity {
            identifier: identifier.clone(),
            name: config.name_cache.get(identifier).cloned().unwrap_or_default(),
        })
        .collect::<Vec<_>>();

    debug!(profile = %profile, headers = headers.len(), "Exported profile configuration");
    ConfigSnapshot {
        source_profile: profile.to_string(),
        folding_mode: config.folding_mode,
        dividers: config.dividers,
        headers,
    }
}

/// Resolve snapshot headers against `current` entries (identifier plus the
/// target profile's original name for it).
///
/// Priority per header: exact name match, then identical identifier, then
/// unmatched. Identifier matches are best-effort only; two profiles can share
/// an identifier for unrelated content.
pub fn match_headers(snapshot: &ConfigSnapshot, current: &[HeaderIdentity]) -> MatchReport {
    let mut report = MatchReport::default();

    for header in &snapshot.headers {
        let by_name = (!header.name.is_empty())
            .then(|| current.iter().find(|entry| entry.name == header.name))
            .flatten();

        if let Some(entry) = by_name {
            report.matched_by_name += 1;
            report.headers.insert(entry.identifier.clone());
        } else if current.iter().any(|entry| entry.identifier == header.identifier) {
            report.matched_by_identifier += 1;
            report.headers.insert(header.identifier.clone());
        } else {
            report.unmatched.push(UnmatchedHeader {
                identifier: header.identifier.clone(),
                name: header.name.clone(),
            });
        }
    }

    info!(
        source = %snapshot.source_profile,
        by_name = report.matched_by_name,
        by_identifier = report.matched_by_identifier,
        unmatched = report.unmatched.len(),
        "Matched imported headers"
    );
    report
}
