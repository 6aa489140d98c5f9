//! One folding session over a host page
//!
//! Owns the engine and the resynchronizer, attaches the downstream filter to
//! the host's prompt manager and carries out settings-panel actions.

use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::transfer::export_config;
use crate::config::{FoldingMode, KeyValueStore, MatchReport, parse_dividers};
use crate::error::FoldError;
use crate::filter_hook::{self, HookGuard};
use crate::folding::FoldingEngine;
use crate::host::{HostPage, PollConfig, PromptManagerHost};
use crate::resync::{PumpReport, Resynchronizer};
use crate::settings::{Confirm, Notifier, SettingsPanel};

pub struct FoldingSession<S> {
    engine: FoldingEngine<S>,
    resync: Resynchronizer,
    manager: Option<Box<dyn PromptManagerHost>>,
    hook: HookGuard,
}

impl<S: KeyValueStore> FoldingSession<S> {
    pub fn new(engine: FoldingEngine<S>) -> Self {
        Self::with_resynchronizer(engine, Resynchronizer::new())
    }

    pub fn with_resynchronizer(engine: FoldingEngine<S>, resync: Resynchronizer) -> Self {
        Self {
            engine,
            resync,
            manager: None,
            hook: HookGuard::new(),
        }
    }

    pub fn engine(&self) -> &FoldingEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut FoldingEngine<S> {
        &mut self.engine
    }

    pub fn resynchronizer(&self) -> &Resynchronizer {
        &self.resync
    }

    /// The attached host manager, with its accessor already wrapped
    pub fn manager(&self) -> Option<&dyn PromptManagerHost> {
        self.manager.as_deref()
    }

    /// Attach to the panel already on the page
    pub fn start(&mut self, page: &mut HostPage) -> bool {
        self.resync.initialize(&mut self.engine, page)
    }

    pub fn pump(&mut self, page: &mut HostPage, now: Instant) -> PumpReport {
        let report = self.resync.pump(&mut self.engine, page, now);
        if report.initializations > 0 {
            self.ensure_hook();
        }
        report
    }

    /// Wait for the host's prompt manager, then wrap its collection accessor
    pub async fn attach_manager(
        &mut self,
        mut manager: Box<dyn PromptManagerHost>,
        poll: PollConfig,
    ) -> Result<(), FoldError> {
        // A different manager object needs its own wrapper
        let mut hook = HookGuard::new();
        filter_hook::install_when_ready(manager.as_mut(), self.engine.groups(), &mut hook, poll).await?;
        self.hook = hook;
        self.manager = Some(manager);
        Ok(())
    }

    fn ensure_hook(&mut self) {
        if let Some(manager) = self.manager.as_mut() {
            filter_hook::install(manager.as_mut(), self.engine.groups(), &mut self.hook);
        }
    }

    /// Regroup the current list outside the watcher path
    fn regroup(&mut self, page: &mut HostPage, now: Instant) {
        if let Some(list) = page.list_mut() {
            self.resync.rebuild_now(&mut self.engine, list, now);
        }
    }

    fn sync_settings(&self, page: &mut HostPage) {
        if let Some(settings) = settings_mut(page) {
            settings.sync(self.engine.config());
        }
    }

    /// Save divider text, case sensitivity and mode, then regroup.
    /// An empty divider list is rejected and nothing is saved.
    pub fn apply_settings(
        &mut self,
        page: &mut HostPage,
        dividers_text: &str,
        case_sensitive: bool,
        mode: FoldingMode,
        notifier: &mut dyn Notifier,
        now: Instant,
    ) -> bool {
        let dividers = parse_dividers(dividers_text);
        if dividers.is_empty() {
            notifier.warning("Enter at least one divider pattern");
            return false;
        }

        if let Err(e) = self.engine.apply_settings(dividers, case_sensitive, mode) {
            warn!(error = %e, "Failed to save settings");
            notifier.error("Failed to save settings");
            return false;
        }
        self.regroup(page, now);
        self.sync_settings(page);
        if let Some(settings) = settings_mut(page) {
            settings.visible = false;
        }
        notifier.success("Settings applied and prompts regrouped");
        true
    }

    pub fn change_mode(&mut self, page: &mut HostPage, mode: FoldingMode, notifier: &mut dyn Notifier, now: Instant) {
        if let Err(e) = self.engine.set_folding_mode(mode) {
            warn!(error = %e, "Failed to save folding mode");
            notifier.error("Failed to save folding mode");
            return;
        }
        self.regroup(page, now);
        self.sync_settings(page);
        notifier.success(&format!("Switched to {}", mode.label()));
    }

    pub fn toggle_debug(&mut self, page: &mut HostPage, notifier: &mut dyn Notifier) -> bool {
        let debug = !self.engine.config().debug;
        if let Err(e) = self.engine.set_debug(debug) {
            warn!(error = %e, "Failed to save debug flag");
        }
        self.sync_settings(page);
        notifier.info(if debug { "Debug logging on" } else { "Debug logging off" });
        debug
    }

    /// Start picking manual headers; the current set is pre-checked
    pub fn enter_manual_selection(&mut self, page: &mut HostPage) -> bool {
        let current = self.engine.config().manual_headers.clone();
        match settings_mut(page) {
            Some(settings) => {
                settings.manual_selection = Some(current);
                true
            }
            None => {
                warn!("Settings panel not mounted, cannot select headers");
                false
            }
        }
    }

    /// Flip one entry's checkbox. Returns the new checked state.
    pub fn toggle_manual_selection(&mut self, page: &mut HostPage, identifier: &str) -> Option<bool> {
        if !page.list().is_some_and(|list| list.contains(identifier)) {
            return None;
        }
        let selection = settings_mut(page)?.manual_selection.as_mut()?;
        if selection.remove(identifier) {
            Some(false)
        } else {
            selection.insert(identifier.to_string());
            Some(true)
        }
    }

    /// Leave selection mode, saving the checked entries when `apply` is set
    pub fn exit_manual_selection(
        &mut self,
        page: &mut HostPage,
        apply: bool,
        notifier: &mut dyn Notifier,
        now: Instant,
    ) -> bool {
        let Some(selection) = settings_mut(page).and_then(|s| s.manual_selection.take()) else {
            return false;
        };
        if !apply {
            return true;
        }

        let count = selection.len();
        if let Err(e) = self.engine.set_manual_headers(selection) {
            warn!(error = %e, "Failed to save manual headers");
            notifier.error("Failed to save manual headers");
            return false;
        }
        self.regroup(page, now);
        notifier.success(&format!("Saved {count} manual headers"));
        true
    }

    /// Restore default dividers, case sensitivity and mode after confirmation
    pub fn reset_to_defaults(
        &mut self,
        page: &mut HostPage,
        confirm: &mut dyn Confirm,
        notifier: &mut dyn Notifier,
        now: Instant,
    ) -> bool {
        if !confirm.confirm("Reset divider patterns, case sensitivity and mode to defaults?") {
            return false;
        }
        if let Err(e) = self.engine.reset_settings() {
            warn!(error = %e, "Failed to reset settings");
            notifier.error("Failed to reset settings");
            return false;
        }
        self.regroup(page, now);
        self.sync_settings(page);
        if let Some(settings) = settings_mut(page) {
            settings.visible = false;
        }
        notifier.info("Settings reset to defaults");
        true
    }

    /// Copy mode, dividers and manual headers from another profile
    pub fn copy_from_profile(
        &mut self,
        page: &mut HostPage,
        source: &str,
        confirm: &mut dyn Confirm,
        notifier: &mut dyn Notifier,
        now: Instant,
    ) -> Option<MatchReport> {
        if source == self.engine.profile() {
            notifier.warning("Pick a profile other than the active one");
            return None;
        }
        if !self.engine.store().list_profiles().contains(source) {
            notifier.warning(&format!("Profile '{source}' has no saved configuration"));
            return None;
        }
        let question = format!(
            "Overwrite the grouping settings of '{}' with those of '{source}'?",
            self.engine.profile()
        );
        if !confirm.confirm(&question) {
            return None;
        }
        let Some(list) = page.list() else {
            notifier.warning("No prompt list to match headers against");
            return None;
        };

        let snapshot = export_config(self.engine.store(), source);
        let report = match self.engine.import_snapshot(&snapshot, list) {
            Ok(report) => report,
            Err(e) => {
                warn!(source = %source, error = %e, "Failed to import configuration");
                notifier.error("Failed to import configuration");
                return None;
            }
        };

        self.regroup(page, now);
        self.sync_settings(page);
        notifier.success(&format!(
            "Copied from '{source}': {} matched by name, {} by identifier, {} unmatched",
            report.matched_by_name,
            report.matched_by_identifier,
            report.unmatched.len()
        ));
        if !report.unmatched.is_empty() {
            let missing: Vec<&str> = report
                .unmatched
                .iter()
                .map(|h| if h.name.is_empty() { h.identifier.as_str() } else { h.name.as_str() })
                .collect();
            notifier.warning(&format!("Headers not found: {}", missing.join(", ")));
        }
        Some(report)
    }

    /// Switch profile and reattach to the current panel with its settings
    pub fn activate_profile(&mut self, page: &mut HostPage, profile: &str) -> bool {
        if profile == self.engine.profile() {
            return false;
        }
        self.engine.activate_profile(profile);
        info!(profile = %profile, "Profile activated");
        self.resync.initialize(&mut self.engine, page)
    }

    /// Profiles with saved configuration, the active one included
    pub fn profiles(&self) -> BTreeSet<String> {
        let mut profiles = self.engine.store().list_profiles();
        profiles.insert(self.engine.profile().to_string());
        profiles
    }
}

fn settings_mut(page: &mut HostPage) -> Option<&mut SettingsPanel> {
    page.panel_mut().and_then(|panel| panel.settings.as_mut())
}
