//! Mutation resynchronizer
//!
//! Two watchers feed the engine. The outer one sees every node the host adds
//! to the page and reinitializes when a fresh prompt list shows up. The inner
//! one observes the list itself; it is always disconnected before a rebuild
//! and only reconnected on a timer, so our own rewrites never come back as
//! host changes.
//!
//! Time is injected: the driver calls [`Resynchronizer::pump`] with the
//! current instant and due timers fire there.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::KeyValueStore;
use crate::constants::{host, timing};
use crate::folding::{FoldingEngine, RebuildOutcome};
use crate::host::{Control, HostPage, MutationRecord, PageMutation, PromptList, UiEvent};
use crate::settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Resume observing the list after our own rebuild
    ReconnectObserver,
    /// Regroup once a drag gesture has settled
    RebuildAfterDrop,
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    due: Instant,
    action: TimerAction,
}

/// What a single pump did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub initializations: usize,
    pub rebuilds: usize,
    pub reconnects: usize,
    pub clicks_handled: usize,
}

impl PumpReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug)]
pub struct Resynchronizer {
    timers: Vec<PendingTimer>,
    dragging: Option<String>,
    reconnect_delay: Duration,
    drop_delay: Duration,
}

impl Default for Resynchronizer {
    fn default() -> Self {
        Self::with_delays(timing::RECONNECT_DELAY, timing::DRAG_REBUILD_DELAY)
    }
}

impl Resynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delays(reconnect_delay: Duration, drop_delay: Duration) -> Self {
        Self {
            timers: Vec::new(),
            dragging: None,
            reconnect_delay,
            drop_delay,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.is_some()
    }

    pub fn pending(&self, action: TimerAction) -> Option<Instant> {
        self.timers.iter().find(|t| t.action == action).map(|t| t.due)
    }

    /// Drain page records, list records, UI events and due timers, in that order
    pub fn pump<S: KeyValueStore>(
        &mut self,
        engine: &mut FoldingEngine<S>,
        page: &mut HostPage,
        now: Instant,
    ) -> PumpReport {
        let mut report = PumpReport::default();

        // Outer watcher
        let replaced = page.take_mutations().iter().any(|mutation| match mutation {
            PageMutation::NodeAdded(node) => node.contains_prompt_list(),
        });
        if replaced {
            info!(container = host::PROMPT_LIST, "Prompt list container appeared, reinitializing");
            engine.reload();
            if self.initialize(engine, page) {
                report.initializations += 1;
            }
        }

        // Inner watcher
        if let Some(list) = page.list_mut() {
            let records = list.take_records();
            if records.iter().any(MutationRecord::affects_entries) {
                if engine.is_processing() {
                    debug!("Ignoring list mutations during rebuild");
                } else {
                    debug!(records = records.len(), "Host changed prompt list");
                    self.rebuild_now(engine, list, now);
                    report.rebuilds += 1;
                }
            }
        }

        for event in page.take_events() {
            self.handle_event(engine, page, event, now, &mut report);
        }

        self.fire_due(engine, page, now, &mut report);
        report
    }

    /// Attach to the page's current panel: settings, control bar, rebuild,
    /// then observe. Settings and controls are optional; returns `false`
    /// only when there is no prompt list to group.
    pub fn initialize<S: KeyValueStore>(&mut self, engine: &mut FoldingEngine<S>, page: &mut HostPage) -> bool {
        let Some(panel) = page.panel_mut() else {
            warn!(panel = host::PROMPT_MANAGER, "No prompt manager panel on the page");
            return false;
        };
        if let Err(e) = settings::mount(panel, engine.config()) {
            warn!(mount = host::SETTINGS_PANEL, error = %e, "Cannot mount settings, continuing without them");
        }
        if let Err(e) = settings::install_controls(panel, engine.config().feature_enabled) {
            warn!(error = %e, "Cannot install control bar");
        }
        let Some(list) = panel.list.as_mut() else {
            warn!(container = host::PROMPT_LIST, "Panel has no prompt list, nothing to group");
            return false;
        };

        self.timers.clear();
        self.dragging = None;

        list.disconnect();
        engine.rebuild(list);
        list.observe();
        true
    }

    /// Disconnect, rebuild, and schedule the reconnect
    pub fn rebuild_now<S: KeyValueStore>(
        &mut self,
        engine: &mut FoldingEngine<S>,
        list: &mut PromptList,
        now: Instant,
    ) -> RebuildOutcome {
        list.disconnect();
        let outcome = engine.rebuild(list);
        self.schedule(TimerAction::ReconnectObserver, now + self.reconnect_delay);
        outcome
    }

    fn handle_event<S: KeyValueStore>(
        &mut self,
        engine: &mut FoldingEngine<S>,
        page: &mut HostPage,
        event: UiEvent,
        now: Instant,
        report: &mut PumpReport,
    ) {
        match event {
            UiEvent::DragStart { identifier } => {
                debug!(identifier = %identifier, "Drag started, pausing observation");
                if let Some(list) = page.list_mut() {
                    list.disconnect();
                }
                self.dragging = Some(identifier);
            }
            UiEvent::DragEnd => {
                if self.dragging.take().is_some() {
                    self.schedule(TimerAction::RebuildAfterDrop, now + self.drop_delay);
                }
            }
            UiEvent::Click { identifier, target } => {
                let handled = page
                    .list_mut()
                    .is_some_and(|list| engine.handle_click(list, &identifier, target));
                if handled {
                    report.clicks_handled += 1;
                }
            }
            UiEvent::Control(control) => self.handle_control(engine, page, control, now, report),
        }
    }

    fn handle_control<S: KeyValueStore>(
        &mut self,
        engine: &mut FoldingEngine<S>,
        page: &mut HostPage,
        control: Control,
        now: Instant,
        report: &mut PumpReport,
    ) {
        let Some(panel) = page.panel_mut() else {
            return;
        };
        match control {
            Control::ExpandAll | Control::CollapseAll => {
                if let Some(list) = panel.list.as_mut() {
                    engine.toggle_all(list, control == Control::ExpandAll);
                }
            }
            Control::ToggleFeature => {
                let enabled = !engine.config().feature_enabled;
                if let Err(e) = engine.set_feature_enabled(enabled) {
                    warn!(error = %e, "Failed to persist feature toggle");
                }
                info!(enabled, "Prompt folding {}", if enabled { "enabled" } else { "disabled" });
                if let Err(e) = settings::install_controls(panel, enabled) {
                    warn!(error = %e, "Cannot refresh control bar");
                }
                if let Some(list) = panel.list.as_mut() {
                    self.rebuild_now(engine, list, now);
                    report.rebuilds += 1;
                }
            }
            Control::ToggleSettings => {
                if let Some(settings) = panel.settings.as_mut() {
                    settings.visible = !settings.visible;
                }
                if let Err(e) = settings::install_controls(panel, engine.config().feature_enabled) {
                    warn!(error = %e, "Cannot refresh control bar");
                }
            }
        }
    }

    fn fire_due<S: KeyValueStore>(
        &mut self,
        engine: &mut FoldingEngine<S>,
        page: &mut HostPage,
        now: Instant,
        report: &mut PumpReport,
    ) {
        let mut due: Vec<PendingTimer> = Vec::new();
        self.timers.retain(|timer| {
            if timer.due <= now {
                due.push(*timer);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|timer| timer.due);

        for timer in due {
            let Some(list) = page.list_mut() else {
                continue;
            };
            match timer.action {
                TimerAction::ReconnectObserver => {
                    if self.is_dragging() {
                        debug!("Drag in progress, leaving observer disconnected");
                        continue;
                    }
                    list.observe();
                    report.reconnects += 1;
                }
                TimerAction::RebuildAfterDrop => {
                    self.rebuild_now(engine, list, now);
                    report.rebuilds += 1;
                }
            }
        }
    }

    /// A newer timer of the same kind supersedes the pending one
    fn schedule(&mut self, action: TimerAction, due: Instant) {
        self.timers.retain(|timer| timer.action != action);
        self.timers.push(PendingTimer { due, action });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryStore, ProfileStore};
    use crate::host::{ClickTarget, PromptEntry, PromptManagerPanel};

    const MS: Duration = Duration::from_millis(1);

    fn engine() -> FoldingEngine<MemoryStore> {
        FoldingEngine::new(ProfileStore::new(MemoryStore::new()), "default")
    }

    fn entries(names: &[&str]) -> Vec<PromptEntry> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| PromptEntry::new(format!("p{i}"), *name))
            .collect()
    }

    fn started(names: &[&str]) -> (Resynchronizer, FoldingEngine<MemoryStore>, HostPage) {
        let mut resync = Resynchronizer::new();
        let mut engine = engine();
        let mut page = HostPage::with_panel(PromptManagerPanel::with_entries(entries(names)));
        assert!(resync.initialize(&mut engine, &mut page));
        (resync, engine, page)
    }

    #[test]
    fn test_initialize_groups_and_observes() {
        let (_, _, page) = started(&["=A", "a"]);
        let panel = page.panel().unwrap();
        assert!(panel.settings.is_some());
        assert!(panel.header.as_ref().unwrap().controls.is_some());
        let list = page.list().unwrap();
        assert!(list.is_observed());
        assert_eq!(list.groups().count(), 1);
    }

    #[test]
    fn test_initialize_without_list_does_nothing() {
        let mut resync = Resynchronizer::new();
        let mut engine = engine();
        let mut page = HostPage::with_panel(PromptManagerPanel::default());
        assert!(!resync.initialize(&mut engine, &mut page));
    }

    #[test]
    fn test_initialize_without_header_still_groups() {
        let mut resync = Resynchronizer::new();
        let mut engine = engine();
        let mut panel = PromptManagerPanel::with_entries(entries(&["=A", "a"]));
        panel.header = None;
        let mut page = HostPage::with_panel(panel);

        assert!(resync.initialize(&mut engine, &mut page));
        let list = page.list().unwrap();
        assert_eq!(list.groups().count(), 1);
        assert!(list.is_observed());
        assert!(page.panel().unwrap().settings.is_some());

        page.list_mut().unwrap().append_entry(PromptEntry::new("new", "b"));
        let report = resync.pump(&mut engine, &mut page, Instant::now());
        assert_eq!(report.rebuilds, 1);
        assert_eq!(page.list().unwrap().group("p0").unwrap().content.len(), 2);
    }

    #[test]
    fn test_rebuild_does_not_trigger_itself() {
        let (mut resync, mut engine, mut page) = started(&["=A", "a"]);
        let t0 = Instant::now();

        page.list_mut().unwrap().append_entry(PromptEntry::new("new", "b"));
        let report = resync.pump(&mut engine, &mut page, t0);
        assert_eq!(report.rebuilds, 1);
        assert!(!page.list().unwrap().is_observed());

        let report = resync.pump(&mut engine, &mut page, t0 + 100 * MS);
        assert_eq!(report.reconnects, 1);
        assert!(page.list().unwrap().is_observed());

        let report = resync.pump(&mut engine, &mut page, t0 + 200 * MS);
        assert!(report.is_idle());
        assert_eq!(page.list().unwrap().group("p0").unwrap().content.len(), 2);
    }

    #[test]
    fn test_reconnect_waits_for_delay() {
        let (mut resync, mut engine, mut page) = started(&["=A", "a"]);
        let t0 = Instant::now();

        page.list_mut().unwrap().remove_entry("p1");
        resync.pump(&mut engine, &mut page, t0);

        let report = resync.pump(&mut engine, &mut page, t0 + 50 * MS);
        assert_eq!(report.reconnects, 0);
        assert!(!page.list().unwrap().is_observed());
        assert_eq!(resync.pending(TimerAction::ReconnectObserver), Some(t0 + 100 * MS));
    }

    #[test]
    fn test_text_change_triggers_rebuild() {
        let (mut resync, mut engine, mut page) = started(&["=A", "a", "b"]);
        let t0 = Instant::now();

        page.list_mut().unwrap().rename_entry("p1", "=B");
        let report = resync.pump(&mut engine, &mut page, t0);

        assert_eq!(report.rebuilds, 1);
        assert_eq!(page.list().unwrap().groups().count(), 2);
    }

    #[test]
    fn test_enabled_flag_change_is_not_observed() {
        let (mut resync, mut engine, mut page) = started(&["=A", "a"]);
        page.list_mut().unwrap().set_entry_enabled("p0", false);
        assert!(resync.pump(&mut engine, &mut page, Instant::now()).is_idle());
    }

    #[test]
    fn test_container_replacement_reinitializes() {
        let (mut resync, mut engine, mut page) = started(&["=A", "a"]);

        page.render_panel(PromptManagerPanel::with_entries(entries(&["=X", "x", "=Y", "y"])));
        let report = resync.pump(&mut engine, &mut page, Instant::now());

        assert_eq!(report.initializations, 1);
        let panel = page.panel().unwrap();
        assert!(panel.settings.is_some());
        assert!(panel.header.as_ref().unwrap().controls.is_some());
        assert_eq!(page.list().unwrap().groups().count(), 2);
        assert!(page.list().unwrap().is_observed());
    }

    #[test]
    fn test_list_replacement_reinitializes() {
        let (mut resync, mut engine, mut page) = started(&["=A", "a"]);

        page.render_list(PromptList::new(entries(&["=X", "x", "y", "=Y"])));
        let report = resync.pump(&mut engine, &mut page, Instant::now());

        assert_eq!(report.initializations, 1);
        let list = page.list().unwrap();
        assert_eq!(list.groups().count(), 2);
        assert_eq!(list.group("p0").unwrap().content.len(), 2);
        assert!(list.is_observed());
        assert!(page.panel().unwrap().settings.is_some());
    }

    #[test]
    fn test_unrelated_page_nodes_are_ignored() {
        let (mut resync, mut engine, mut page) = started(&["=A", "a"]);
        page.render_other("#chat");
        assert!(resync.pump(&mut engine, &mut page, Instant::now()).is_idle());
    }

    #[test]
    fn test_drag_suspends_and_resumes() {
        let (mut resync, mut engine, mut page) = started(&["=A", "a", "=B", "b"]);
        let t0 = Instant::now();

        page.dispatch(UiEvent::DragStart {
            identifier: "p1".to_string(),
        });
        resync.pump(&mut engine, &mut page, t0);
        assert!(resync.is_dragging());
        assert!(!page.list().unwrap().is_observed());

        // Host moves the row while the drag is live; nothing is rebuilt
        page.list_mut().unwrap().move_entry("p1", 4);
        assert_eq!(resync.pump(&mut engine, &mut page, t0 + 10 * MS).rebuilds, 0);

        page.dispatch(UiEvent::DragEnd);
        resync.pump(&mut engine, &mut page, t0 + 20 * MS);
        assert_eq!(resync.pending(TimerAction::RebuildAfterDrop), Some(t0 + 170 * MS));

        let report = resync.pump(&mut engine, &mut page, t0 + 170 * MS);
        assert_eq!(report.rebuilds, 1);
        assert_eq!(page.list().unwrap().group("p2").unwrap().content.len(), 2);

        let report = resync.pump(&mut engine, &mut page, t0 + 270 * MS);
        assert_eq!(report.reconnects, 1);
        assert!(page.list().unwrap().is_observed());
    }

    #[test]
    fn test_header_text_click_toggles_group() {
        let (mut resync, mut engine, mut page) = started(&["=A", "a"]);

        page.dispatch(UiEvent::Click {
            identifier: "p0".to_string(),
            target: ClickTarget::Row,
        });
        page.dispatch(UiEvent::Click {
            identifier: "p0".to_string(),
            target: ClickTarget::HeaderText,
        });
        let report = resync.pump(&mut engine, &mut page, Instant::now());

        assert_eq!(report.clicks_handled, 1);
        assert!(!page.list().unwrap().group("p0").unwrap().open);
    }

    #[test]
    fn test_controls_toggle_feature_and_settings() {
        let (mut resync, mut engine, mut page) = started(&["=A", "a"]);
        let t0 = Instant::now();

        page.dispatch(UiEvent::Control(Control::ToggleFeature));
        page.dispatch(UiEvent::Control(Control::ToggleSettings));
        resync.pump(&mut engine, &mut page, t0);

        assert!(!engine.config().feature_enabled);
        assert_eq!(page.list().unwrap().groups().count(), 0);
        let panel = page.panel().unwrap();
        let bar = panel.header.as_ref().unwrap().controls.as_ref().unwrap();
        assert!(!bar.feature_enabled);
        assert!(bar.settings_active);
        assert!(panel.settings.as_ref().unwrap().visible);
    }

    #[test]
    fn test_collapse_all_control() {
        let (mut resync, mut engine, mut page) = started(&["=A", "a", "=B", "b"]);
        page.dispatch(UiEvent::Control(Control::CollapseAll));
        resync.pump(&mut engine, &mut page, Instant::now());
        assert!(page.list().unwrap().groups().all(|g| !g.open));
    }
}
