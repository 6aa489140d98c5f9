//! Model of the host page this system decorates
//!
//! The host owns everything here. It may throw the whole prompt manager
//! panel away and draw a new one at any time; the page records every node
//! it adds so an always-on watcher can notice fresh panels.

pub mod list;
pub mod manager;

use std::collections::VecDeque;

pub use list::{GroupNode, ListNode, MutationRecord, PromptEntry, PromptList};
pub use manager::{
    CollectionAccessor, OrderSource, PollConfig, Prompt, PromptCollection, PromptManagerHost,
    PromptOrderEntry, StaticPromptManager, wait_until_ready,
};

use crate::settings::SettingsPanel;

/// Expand/collapse/toggle/settings buttons injected into the panel header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBar {
    pub feature_enabled: bool,
    pub settings_active: bool,
}

impl ControlBar {
    /// Label of the on/off button
    pub fn toggle_label(&self) -> &'static str {
        if self.feature_enabled { "🟢" } else { "🔴" }
    }

    pub fn toggle_title(&self) -> &'static str {
        if self.feature_enabled { "Click to disable" } else { "Click to enable" }
    }
}

#[derive(Debug, Default)]
pub struct PanelHeader {
    pub controls: Option<ControlBar>,
}

/// The host's prompt manager panel
#[derive(Debug, Default)]
pub struct PromptManagerPanel {
    pub header: Option<PanelHeader>,
    pub settings: Option<SettingsPanel>,
    pub list: Option<PromptList>,
}

impl PromptManagerPanel {
    /// A freshly drawn panel with a header and the given entries
    pub fn with_entries(entries: Vec<PromptEntry>) -> Self {
        Self {
            header: Some(PanelHeader::default()),
            settings: None,
            list: Some(PromptList::new(entries)),
        }
    }
}

/// Node shapes the host can insert under the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddedNode {
    /// A whole prompt manager panel
    Panel { has_list: bool },
    /// A bare prompt list container
    List,
    /// Anything else the host renders
    Other(String),
}

impl AddedNode {
    /// Whether a prompt list matches this node or sits anywhere below it
    pub fn contains_prompt_list(&self) -> bool {
        match self {
            AddedNode::Panel { has_list } => *has_list,
            AddedNode::List => true,
            AddedNode::Other(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMutation {
    NodeAdded(AddedNode),
}

/// What part of a header row a click landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    /// The header's name text
    HeaderText,
    /// Anywhere else on the row (toggles, edit buttons, padding)
    Row,
}

/// Buttons of the injected control bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    ExpandAll,
    CollapseAll,
    ToggleFeature,
    ToggleSettings,
}

/// User gestures the host forwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    DragStart { identifier: String },
    DragEnd,
    Click { identifier: String, target: ClickTarget },
    Control(Control),
}

/// The stable ancestor node (document body)
#[derive(Debug, Default)]
pub struct HostPage {
    panel: Option<PromptManagerPanel>,
    mutations: VecDeque<PageMutation>,
    events: VecDeque<UiEvent>,
}

impl HostPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page that already shows a panel at startup (nothing recorded)
    pub fn with_panel(panel: PromptManagerPanel) -> Self {
        Self {
            panel: Some(panel),
            ..Self::default()
        }
    }

    pub fn panel(&self) -> Option<&PromptManagerPanel> {
        self.panel.as_ref()
    }

    pub fn panel_mut(&mut self) -> Option<&mut PromptManagerPanel> {
        self.panel.as_mut()
    }

    pub fn list(&self) -> Option<&PromptList> {
        self.panel.as_ref().and_then(|p| p.list.as_ref())
    }

    pub fn list_mut(&mut self) -> Option<&mut PromptList> {
        self.panel.as_mut().and_then(|p| p.list.as_mut())
    }

    /// Host tears down the current panel and draws a new one
    pub fn render_panel(&mut self, panel: PromptManagerPanel) {
        let has_list = panel.list.is_some();
        self.panel = Some(panel);
        self.mutations
            .push_back(PageMutation::NodeAdded(AddedNode::Panel { has_list }));
    }

    /// Host swaps only the list container inside the current panel
    pub fn render_list(&mut self, list: PromptList) {
        if let Some(panel) = self.panel.as_mut() {
            panel.list = Some(list);
            self.mutations.push_back(PageMutation::NodeAdded(AddedNode::List));
        }
    }

    /// Host inserts something unrelated somewhere on the page
    pub fn render_other(&mut self, selector: &str) {
        self.mutations
            .push_back(PageMutation::NodeAdded(AddedNode::Other(selector.to_string())));
    }

    pub fn dispatch(&mut self, event: UiEvent) {
        self.events.push_back(event);
    }

    pub fn take_mutations(&mut self) -> Vec<PageMutation> {
        self.mutations.drain(..).collect()
    }

    pub fn take_events(&mut self) -> Vec<UiEvent> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_panel_records_added_node() {
        let mut page = HostPage::new();
        page.render_panel(PromptManagerPanel::with_entries(vec![PromptEntry::new("a", "A")]));
        assert_eq!(
            page.take_mutations(),
            vec![PageMutation::NodeAdded(AddedNode::Panel { has_list: true })]
        );
        assert!(page.take_mutations().is_empty());
        assert_eq!(page.list().unwrap().entries().count(), 1);
    }

    #[test]
    fn test_render_list_without_panel_is_ignored() {
        let mut page = HostPage::new();
        page.render_list(PromptList::default());
        assert!(page.take_mutations().is_empty());
        assert!(page.list().is_none());
    }

    #[test]
    fn test_added_node_shapes() {
        assert!(AddedNode::List.contains_prompt_list());
        assert!(AddedNode::Panel { has_list: true }.contains_prompt_list());
        assert!(!AddedNode::Panel { has_list: false }.contains_prompt_list());
        assert!(!AddedNode::Other("#chat".to_string()).contains_prompt_list());
    }

    #[test]
    fn test_control_bar_labels() {
        let bar = ControlBar {
            feature_enabled: false,
            settings_active: false,
        };
        assert_eq!(bar.toggle_label(), "🔴");
        assert_eq!(bar.toggle_title(), "Click to enable");
    }
}
