//! The prompt list container owned by the host
//!
//! The host creates, renames and destroys entries; this system only moves
//! them between the top level and group wrappers. Mutations made while an
//! observer is connected are queued as [`MutationRecord`]s, including the
//! ones this system causes itself.

use serde::{Deserialize, Serialize};

/// One host list item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEntry {
    pub identifier: String,
    /// Text of the entry's link element
    pub name: String,
    /// Host-owned; false when the host renders the entry as disabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(skip)]
    pub is_group_header: bool,
    #[serde(skip)]
    pub controlled_by_disabled_group: bool,
    /// Text this system last wrote into the link, if any
    #[serde(skip)]
    pub rendered_name: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl PromptEntry {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            enabled: true,
            is_group_header: false,
            controlled_by_disabled_group: false,
            rendered_name: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Collapsible wrapper around a header and its children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupNode {
    /// Header entry's identifier
    pub key: String,
    pub open: bool,
    pub header: PromptEntry,
    pub content: Vec<PromptEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListNode {
    Entry(PromptEntry),
    Group(GroupNode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// Entries inserted into or removed from the container subtree
    ChildList {
        added: Vec<String>,
        removed: Vec<String>,
    },
    /// An entry's link text changed
    Text { identifier: String },
}

impl MutationRecord {
    /// Whether this record reflects a change the grouping depends on
    pub fn affects_entries(&self) -> bool {
        match self {
            MutationRecord::ChildList { added, removed } => !added.is_empty() || !removed.is_empty(),
            MutationRecord::Text { .. } => true,
        }
    }
}

#[derive(Debug, Default)]
struct Observation {
    connected: bool,
    records: Vec<MutationRecord>,
}

/// The container node holding the prompt entries
#[derive(Debug, Default)]
pub struct PromptList {
    nodes: Vec<ListNode>,
    observation: Observation,
}

impl PromptList {
    pub fn new(entries: Vec<PromptEntry>) -> Self {
        Self {
            nodes: entries.into_iter().map(ListNode::Entry).collect(),
            observation: Observation::default(),
        }
    }

    pub fn nodes(&self) -> &[ListNode] {
        &self.nodes
    }

    /// All entries in document order, descending into groups
    pub fn entries(&self) -> impl Iterator<Item = &PromptEntry> {
        self.nodes.iter().flat_map(|node| {
            let (head, rest): (&PromptEntry, &[PromptEntry]) = match node {
                ListNode::Entry(entry) => (entry, &[][..]),
                ListNode::Group(group) => (&group.header, group.content.as_slice()),
            };
            std::iter::once(head).chain(rest.iter())
        })
    }

    pub fn entry(&self, identifier: &str) -> Option<&PromptEntry> {
        self.entries().find(|entry| entry.identifier == identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entry(identifier).is_some()
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupNode> {
        self.nodes.iter().filter_map(|node| match node {
            ListNode::Group(group) => Some(group),
            ListNode::Entry(_) => None,
        })
    }

    pub(crate) fn groups_mut(&mut self) -> impl Iterator<Item = &mut GroupNode> {
        self.nodes.iter_mut().filter_map(|node| match node {
            ListNode::Group(group) => Some(group),
            ListNode::Entry(_) => None,
        })
    }

    pub fn group(&self, key: &str) -> Option<&GroupNode> {
        self.groups().find(|group| group.key == key)
    }

    // ---- host-side mutations ----

    pub fn append_entry(&mut self, entry: PromptEntry) {
        let id = entry.identifier.clone();
        self.nodes.push(ListNode::Entry(entry));
        self.record(MutationRecord::ChildList {
            added: vec![id],
            removed: Vec::new(),
        });
    }

    /// Remove an entry wherever it sits, including inside a group
    pub fn remove_entry(&mut self, identifier: &str) -> Option<PromptEntry> {
        let removed = self.detach(identifier)?;
        self.record(MutationRecord::ChildList {
            added: Vec::new(),
            removed: vec![removed.identifier.clone()],
        });
        Some(removed)
    }

    /// Drag-and-drop reorder: move an entry to a top-level position
    pub fn move_entry(&mut self, identifier: &str, index: usize) -> bool {
        let Some(entry) = self.detach(identifier) else {
            return false;
        };
        let index = index.min(self.nodes.len());
        self.nodes.insert(index, ListNode::Entry(entry));
        self.record(MutationRecord::ChildList {
            added: vec![identifier.to_string()],
            removed: vec![identifier.to_string()],
        });
        true
    }

    pub fn rename_entry(&mut self, identifier: &str, name: &str) -> bool {
        let Some(entry) = self.entry_mut(identifier) else {
            return false;
        };
        entry.name = name.to_string();
        self.record(MutationRecord::Text {
            identifier: identifier.to_string(),
        });
        true
    }

    /// Flip the host's enabled class; attribute changes are not observed
    pub fn set_entry_enabled(&mut self, identifier: &str, enabled: bool) -> bool {
        match self.entry_mut(identifier) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    // ---- rebuild-side mutations ----

    /// Empty the container, returning every entry in document order
    pub(crate) fn take_entries(&mut self) -> Vec<PromptEntry> {
        let mut entries = Vec::new();
        for node in std::mem::take(&mut self.nodes) {
            match node {
                ListNode::Entry(entry) => entries.push(entry),
                ListNode::Group(group) => {
                    entries.push(group.header);
                    entries.extend(group.content);
                }
            }
        }
        if !entries.is_empty() {
            self.record(MutationRecord::ChildList {
                added: Vec::new(),
                removed: entries.iter().map(|e| e.identifier.clone()).collect(),
            });
        }
        entries
    }

    pub(crate) fn replace_nodes(&mut self, nodes: Vec<ListNode>) {
        self.nodes = nodes;
        let added: Vec<String> = self.entries().map(|e| e.identifier.clone()).collect();
        if !added.is_empty() {
            self.record(MutationRecord::ChildList {
                added,
                removed: Vec::new(),
            });
        }
    }

    // ---- observation ----

    pub fn observe(&mut self) {
        self.observation.connected = true;
    }

    /// Stop observing; records not yet taken are discarded
    pub fn disconnect(&mut self) {
        self.observation.connected = false;
        self.observation.records.clear();
    }

    pub fn is_observed(&self) -> bool {
        self.observation.connected
    }

    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.observation.records)
    }

    fn record(&mut self, record: MutationRecord) {
        if self.observation.connected {
            self.observation.records.push(record);
        }
    }

    fn entry_mut(&mut self, identifier: &str) -> Option<&mut PromptEntry> {
        self.nodes.iter_mut().find_map(|node| match node {
            ListNode::Entry(entry) => (entry.identifier == identifier).then_some(entry),
            ListNode::Group(group) => {
                if group.header.identifier == identifier {
                    Some(&mut group.header)
                } else {
                    group.content.iter_mut().find(|e| e.identifier == identifier)
                }
            }
        })
    }

    /// Pull an entry out of the tree without recording anything.
    /// Removing a group header unwraps the group: its children stay in place.
    fn detach(&mut self, identifier: &str) -> Option<PromptEntry> {
        let mut found: Option<(usize, Option<usize>)> = None;
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                ListNode::Entry(entry) if entry.identifier == identifier => {
                    found = Some((index, None));
                }
                ListNode::Group(group) if group.header.identifier == identifier => {
                    found = Some((index, None));
                }
                ListNode::Group(group) => {
                    if let Some(child) = group.content.iter().position(|e| e.identifier == identifier) {
                        found = Some((index, Some(child)));
                    }
                }
                ListNode::Entry(_) => {}
            }
            if found.is_some() {
                break;
            }
        }

        match found? {
            (index, Some(child)) => match &mut self.nodes[index] {
                ListNode::Group(group) => Some(group.content.remove(child)),
                ListNode::Entry(_) => None,
            },
            (index, None) => match self.nodes.remove(index) {
                ListNode::Entry(entry) => Some(entry),
                ListNode::Group(group) => {
                    let children = group.content.into_iter().map(ListNode::Entry);
                    self.nodes.splice(index..index, children);
                    Some(group.header)
                }
            },
        }
    }
}
