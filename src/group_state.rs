//! Derived group structure shared between the engine and the filter hook
//!
//! Nothing here is persisted. Every rebuild wipes the registry and records
//! each group again from scratch.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GroupRegistry {
    feature_enabled: bool,
    /// Group key → child identifiers, in list order
    hierarchy: BTreeMap<String, Vec<String>>,
    /// Group key → header enabled flag
    header_enabled: BTreeMap<String, bool>,
}

pub type SharedGroups = Rc<RefCell<GroupRegistry>>;

impl GroupRegistry {
    pub fn new(feature_enabled: bool) -> Self {
        Self {
            feature_enabled,
            ..Self::default()
        }
    }

    pub fn shared(feature_enabled: bool) -> SharedGroups {
        Rc::new(RefCell::new(Self::new(feature_enabled)))
    }

    /// Forget every group
    pub fn reset(&mut self, feature_enabled: bool) {
        self.feature_enabled = feature_enabled;
        self.hierarchy.clear();
        self.header_enabled.clear();
    }

    pub fn is_feature_enabled(&self) -> bool {
        self.feature_enabled
    }

    pub fn set_feature_enabled(&mut self, enabled: bool) {
        self.feature_enabled = enabled;
    }

    /// Record a group, replacing anything previously known under its key
    pub fn record_group(&mut self, key: &str, children: Vec<String>, header_enabled: bool) {
        self.hierarchy.insert(key.to_string(), children);
        self.header_enabled.insert(key.to_string(), header_enabled);
    }

    pub fn set_header_enabled(&mut self, key: &str, enabled: bool) {
        if self.hierarchy.contains_key(key) {
            self.header_enabled.insert(key.to_string(), enabled);
        }
    }

    pub fn header_enabled(&self, key: &str) -> Option<bool> {
        self.header_enabled.get(key).copied()
    }

    pub fn children(&self, key: &str) -> Option<&[String]> {
        self.hierarchy.get(key).map(Vec::as_slice)
    }

    pub fn group_keys(&self) -> impl Iterator<Item = &str> {
        self.hierarchy.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hierarchy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hierarchy.is_empty()
    }

    /// Union of children of every group whose header is disabled
    pub fn disabled_children(&self) -> HashSet<&str> {
        self.hierarchy
            .iter()
            .filter(|(key, _)| self.header_enabled.get(*key) == Some(&false))
            .flat_map(|(_, children)| children.iter().map(String::as_str))
            .collect()
    }
}

/// Process-wide "rebuild in progress" flag.
///
/// This is a single coarse critical section for the engine instance, not a
/// per-container lock: a rebuild of any container blocks rebuilds of all
/// others until it finishes.
#[derive(Debug, Default, Clone)]
pub struct ProcessingFlag(Arc<AtomicBool>);

impl ProcessingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the critical section, or `None` if a rebuild already holds it
    pub fn try_enter(&self) -> Option<ProcessingGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProcessingGuard(Arc::clone(&self.0)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the processing flag when dropped, on every exit path
#[derive(Debug)]
pub struct ProcessingGuard(Arc<AtomicBool>);

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
