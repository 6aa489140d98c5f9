//! Grouping engine: turns the host's flat prompt list into collapsible groups
//!
//! A rebuild always starts from scratch. Every entry is pulled out of the
//! container (including out of wrappers left by the previous pass), its
//! display name is restored from the name cache, and the list is partitioned
//! again under the active [`FoldingMode`]. Group membership is never patched
//! incrementally.

use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;
use tracing::{debug, error, info, warn};

use crate::config::transfer::match_headers;
use crate::config::{
    ConfigSnapshot, FoldingMode, HeaderIdentity, KeyValueStore, MatchReport, ProfileConfig, ProfileStore,
};
use crate::divider::DividerMatcher;
use crate::error::FoldError;
use crate::group_state::{GroupRegistry, ProcessingFlag, SharedGroups};
use crate::host::{ClickTarget, GroupNode, ListNode, PromptEntry, PromptList};

/// One slot of the planned layout; indices point into the flattened entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Entry outside any group
    Loose(usize),
    /// Header candidate that found no closing partner (sandwich only)
    Orphan(usize),
    Group { header: usize, children: Vec<usize> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildSummary {
    pub mode: FoldingMode,
    pub feature_enabled: bool,
    pub groups: usize,
    pub loose: usize,
    pub orphans: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Another rebuild held the processing flag
    Skipped,
    Rebuilt(RebuildSummary),
    /// The pass failed; the error was logged and the list left best-effort
    Failed,
}

/// Header runs to the next header. Entries before the first header stay loose.
pub fn partition_standard(is_header: &[bool]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current: Option<(usize, Vec<usize>)> = None;

    for (index, &header) in is_header.iter().enumerate() {
        if header {
            if let Some((header, children)) = current.take() {
                segments.push(Segment::Group { header, children });
            }
            current = Some((index, Vec::new()));
        } else if let Some((_, children)) = current.as_mut() {
            children.push(index);
        } else {
            segments.push(Segment::Loose(index));
        }
    }

    if let Some((header, children)) = current {
        segments.push(Segment::Group { header, children });
    }
    segments
}

/// A header opens a group closed by the next header with the exact same
/// name; the closing entry is the group's last child.
pub fn partition_sandwich(names: &[&str], is_header: &[bool]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut index = 0;

    while index < names.len() {
        if !is_header[index] {
            segments.push(Segment::Loose(index));
            index += 1;
            continue;
        }

        let closing = (index + 1..names.len()).find(|&j| is_header[j] && names[j] == names[index]);
        match closing {
            Some(close) => {
                segments.push(Segment::Group {
                    header: index,
                    children: (index + 1..=close).collect(),
                });
                index = close + 1;
            }
            None => {
                segments.push(Segment::Orphan(index));
                index += 1;
            }
        }
    }
    segments
}

/// Rebuilds prompt lists for the active profile and keeps its state persisted
#[derive(Debug)]
pub struct FoldingEngine<S> {
    store: ProfileStore<S>,
    profile: String,
    config: ProfileConfig,
    matcher: DividerMatcher,
    groups: SharedGroups,
    processing: ProcessingFlag,
}

impl<S: KeyValueStore> FoldingEngine<S> {
    pub fn new(store: ProfileStore<S>, profile: &str) -> Self {
        let config = store.load(profile);
        let matcher = compile_matcher(&config);
        let groups = GroupRegistry::shared(config.feature_enabled);
        Self {
            store,
            profile: profile.to_string(),
            config,
            matcher,
            groups,
            processing: ProcessingFlag::new(),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    pub fn matcher(&self) -> &DividerMatcher {
        &self.matcher
    }

    pub fn store(&self) -> &ProfileStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ProfileStore<S> {
        &mut self.store
    }

    /// Handle to the derived group structure (shared with the filter hook)
    pub fn groups(&self) -> SharedGroups {
        Rc::clone(&self.groups)
    }

    pub fn processing_flag(&self) -> &ProcessingFlag {
        &self.processing
    }

    pub fn is_processing(&self) -> bool {
        self.processing.is_set()
    }

    /// Switch to another profile. Every field is reloaded from that profile's
    /// namespace and derived group state is dropped.
    pub fn activate_profile(&mut self, profile: &str) {
        info!(from = %self.profile, to = %profile, "Switching active profile");
        self.profile = profile.to_string();
        self.reload();
    }

    /// Re-read the active profile from storage
    pub fn reload(&mut self) {
        self.config = self.store.load(&self.profile);
        self.matcher = compile_matcher(&self.config);
        match self.groups.try_borrow_mut() {
            Ok(mut groups) => groups.reset(self.config.feature_enabled),
            Err(_) => warn!("Group state busy during reload, keeping previous groups"),
        }
    }

    /// Regroup the container. No-ops while another rebuild is running;
    /// failures are logged and never propagate.
    pub fn rebuild(&mut self, list: &mut PromptList) -> RebuildOutcome {
        let Some(_guard) = self.processing.try_enter() else {
            debug!(profile = %self.profile, "Rebuild already in progress, skipping");
            return RebuildOutcome::Skipped;
        };

        // Open states may have been written by another view of this profile
        self.config.open_states = self.store.load_open_states(&self.profile);

        match self.regroup(list) {
            Ok(summary) => {
                if self.config.debug {
                    info!(
                        profile = %self.profile,
                        mode = %summary.mode,
                        groups = summary.groups,
                        loose = summary.loose,
                        orphans = summary.orphans,
                        "Groups built successfully"
                    );
                }
                RebuildOutcome::Rebuilt(summary)
            }
            Err(e) => {
                error!(profile = %self.profile, error = %e, "Grouping pass failed");
                RebuildOutcome::Failed
            }
        }
    }

    fn regroup(&mut self, list: &mut PromptList) -> Result<RebuildSummary, FoldError> {
        // 1. Flatten and restore
        let mut entries = list.take_entries();
        let cache_changed = self.restore_entries(&mut entries);

        let shared = Rc::clone(&self.groups);
        let Ok(mut groups) = shared.try_borrow_mut() else {
            list.replace_nodes(flat_nodes(entries));
            return Err(FoldError::GroupStateBusy);
        };
        groups.reset(self.config.feature_enabled);

        // 2 + 3. Classify and partition
        let segments = if self.config.feature_enabled {
            self.plan(&entries)
        } else {
            (0..entries.len()).map(Segment::Loose).collect()
        };

        if let Some(key) = duplicate_group_key(&segments, &entries) {
            list.replace_nodes(flat_nodes(entries));
            return Err(FoldError::DuplicateGroupKey(key));
        }

        // 4. Materialize
        let mut summary = RebuildSummary {
            mode: self.config.folding_mode,
            feature_enabled: self.config.feature_enabled,
            groups: 0,
            loose: 0,
            orphans: 0,
        };
        let mut slots: Vec<Option<PromptEntry>> = entries.into_iter().map(Some).collect();
        let mut nodes = Vec::with_capacity(segments.len());

        for segment in segments {
            match segment {
                Segment::Loose(index) => {
                    summary.loose += 1;
                    nodes.extend(slots[index].take().map(ListNode::Entry));
                }
                Segment::Orphan(index) => {
                    summary.orphans += 1;
                    nodes.extend(slots[index].take().map(ListNode::Entry));
                }
                Segment::Group { header, children } => {
                    let Some(mut header) = slots[header].take() else {
                        continue;
                    };
                    let content: Vec<PromptEntry> =
                        children.iter().filter_map(|&child| slots[child].take()).collect();

                    let key = header.identifier.clone();
                    header.is_group_header = true;
                    header.rendered_name = Some(header.name.clone());

                    let child_ids = content
                        .iter()
                        .filter(|e| !e.identifier.is_empty())
                        .map(|e| e.identifier.clone())
                        .collect();
                    groups.record_group(&key, child_ids, header.enabled);

                    let open = self.config.open_states.get(&key).copied().unwrap_or(true);
                    nodes.push(ListNode::Group(GroupNode {
                        key,
                        open,
                        header,
                        content,
                    }));
                    summary.groups += 1;
                }
            }
        }

        // 5. Disabled-style pass
        for node in &mut nodes {
            if let ListNode::Group(group) = node {
                let disabled = groups.header_enabled(&group.key) == Some(false);
                for child in &mut group.content {
                    child.controlled_by_disabled_group = disabled;
                }
            }
        }
        drop(groups);

        list.replace_nodes(nodes);

        if cache_changed {
            self.store.save_name_cache(&self.profile, &self.config.name_cache)?;
        }
        Ok(summary)
    }

    /// Restore cached names and strip markers from a previous pass.
    /// Returns whether the name cache changed.
    fn restore_entries(&mut self, entries: &mut [PromptEntry]) -> bool {
        let mut changed = false;

        for entry in entries.iter_mut() {
            let current = entry.name.trim().to_string();

            if entry.identifier.is_empty() {
                entry.name = current;
            } else {
                let written_by_us = entry.rendered_name.as_deref() == Some(entry.name.as_str());
                let cached = self.config.name_cache.get(&entry.identifier);
                let needs_capture = match cached {
                    None => true,
                    // Text differs from the cache and we did not write it: the host renamed it
                    Some(cached) => *cached != current && !written_by_us,
                };
                if needs_capture {
                    if let Some(previous) = cached.filter(|_| self.config.debug) {
                        info!(identifier = %entry.identifier, old = %previous, new = %current, "Host renamed entry");
                    }
                    self.config
                        .name_cache
                        .insert(entry.identifier.clone(), current.clone());
                    changed = true;
                }
                entry.name = self
                    .config
                    .name_cache
                    .get(&entry.identifier)
                    .cloned()
                    .unwrap_or(current);
            }

            entry.is_group_header = false;
            entry.controlled_by_disabled_group = false;
            entry.rendered_name = None;
        }
        changed
    }

    fn plan(&self, entries: &[PromptEntry]) -> Vec<Segment> {
        match self.config.folding_mode {
            FoldingMode::Standard => {
                let flags: Vec<bool> = entries.iter().map(|e| self.matcher.matches(&e.name)).collect();
                partition_standard(&flags)
            }
            FoldingMode::Sandwich => {
                let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
                let flags: Vec<bool> = names.iter().map(|name| self.matcher.matches(name)).collect();
                partition_sandwich(&names, &flags)
            }
            FoldingMode::Manual => {
                let flags: Vec<bool> = entries
                    .iter()
                    .map(|e| self.config.manual_headers.contains(&e.identifier))
                    .collect();
                partition_standard(&flags)
            }
        }
    }

    /// Open or close every group currently in the list
    pub fn toggle_all(&mut self, list: &mut PromptList, open: bool) -> usize {
        let mut count = 0;
        for group in list.groups_mut() {
            group.open = open;
            self.config.open_states.insert(group.key.clone(), open);
            count += 1;
        }
        if count == 0 {
            return 0;
        }

        if let Err(e) = self.store.save_open_states(&self.profile, &self.config.open_states) {
            warn!(error = %e, "Failed to persist open states");
        }
        if self.config.debug {
            info!(groups = count, open, "All groups {}", if open { "expanded" } else { "collapsed" });
        }
        count
    }

    /// Click on a header row. Only the header's text flips the group.
    pub fn handle_click(&mut self, list: &mut PromptList, identifier: &str, target: ClickTarget) -> bool {
        if target != ClickTarget::HeaderText {
            return false;
        }
        let Some(group) = list.groups_mut().find(|g| g.header.identifier == identifier) else {
            return false;
        };
        group.open = !group.open;
        let (key, open) = (group.key.clone(), group.open);

        self.config.open_states.insert(key.clone(), open);
        if let Err(e) = self.store.save_open_states(&self.profile, &self.config.open_states) {
            warn!(group = %key, error = %e, "Failed to persist group open state");
        }
        true
    }

    /// Replace divider list, case sensitivity and mode; persisted at once
    pub fn apply_settings(
        &mut self,
        dividers: Vec<String>,
        case_sensitive: bool,
        mode: FoldingMode,
    ) -> Result<(), FoldError> {
        self.config.dividers = dividers;
        self.config.case_sensitive = case_sensitive;
        self.config.folding_mode = mode;
        self.save_settings()
    }

    pub fn set_folding_mode(&mut self, mode: FoldingMode) -> Result<(), FoldError> {
        self.config.folding_mode = mode;
        self.save_settings()
    }

    /// Restore default dividers, case sensitivity and mode
    pub fn reset_settings(&mut self) -> Result<(), FoldError> {
        self.config.reset_settings();
        self.matcher = compile_matcher(&self.config);
        self.store.reset_profile(&self.profile)
    }

    /// Adopt another profile's mode, dividers and (re-resolved) manual headers.
    /// Open states and header enabled flags are left alone.
    pub fn import_snapshot(&mut self, snapshot: &ConfigSnapshot, list: &PromptList) -> Result<MatchReport, FoldError> {
        let report = match_headers(snapshot, &self.identities(list));

        self.config.folding_mode = snapshot.folding_mode;
        self.config.dividers = snapshot.dividers.clone();
        self.config.manual_headers = report.headers.clone();
        self.save_settings()?;
        self.store
            .save_manual_headers(&self.profile, &self.config.manual_headers)?;
        Ok(report)
    }

    /// Every entry with the original name this profile knows it by
    fn identities(&self, list: &PromptList) -> Vec<HeaderIdentity> {
        list.entries()
            .map(|entry| HeaderIdentity {
                identifier: entry.identifier.clone(),
                name: self
                    .config
                    .name_cache
                    .get(&entry.identifier)
                    .cloned()
                    .unwrap_or_else(|| entry.name.trim().to_string()),
            })
            .collect()
    }

    pub fn set_feature_enabled(&mut self, enabled: bool) -> Result<(), FoldError> {
        self.config.feature_enabled = enabled;
        if let Ok(mut groups) = self.groups.try_borrow_mut() {
            groups.set_feature_enabled(enabled);
        }
        self.store.save_feature_enabled(&self.profile, enabled)
    }

    pub fn set_debug(&mut self, debug: bool) -> Result<(), FoldError> {
        self.config.debug = debug;
        self.store.save_debug(&self.profile, debug)
    }

    pub fn set_manual_headers(&mut self, headers: BTreeSet<String>) -> Result<(), FoldError> {
        self.config.manual_headers = headers;
        self.store.save_manual_headers(&self.profile, &self.config.manual_headers)
    }

    fn save_settings(&mut self) -> Result<(), FoldError> {
        // Recompile before persisting so no stale matcher survives a failed write
        self.matcher = compile_matcher(&self.config);
        self.store.save_settings(&self.profile, &self.config)
    }
}

fn compile_matcher(config: &ProfileConfig) -> DividerMatcher {
    DividerMatcher::compile(config.dividers.as_slice(), config.case_sensitive).unwrap_or_else(|e| {
        warn!(error = %e, "Divider patterns failed to compile, no entry will match");
        DividerMatcher::empty()
    })
}

fn flat_nodes(entries: Vec<PromptEntry>) -> Vec<ListNode> {
    entries.into_iter().map(ListNode::Entry).collect()
}

fn duplicate_group_key(segments: &[Segment], entries: &[PromptEntry]) -> Option<String> {
    let mut seen = HashSet::new();
    segments.iter().find_map(|segment| match segment {
        Segment::Group { header, .. } => {
            let key = entries[*header].identifier.as_str();
            (!seen.insert(key)).then(|| key.to_string())
        }
        _ => None,
    })
}
