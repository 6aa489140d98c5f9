//! Settings block mounted into the prompt manager panel
//!
//! Holds the form state the user edits (divider text, case checkbox, mode,
//! debug, manual header checkboxes) and the two collaborators user actions
//! report through: toasts and yes/no confirmation.

use std::collections::BTreeSet;

use crate::config::{FoldingMode, ProfileConfig};
use crate::error::FoldError;
use crate::host::{ControlBar, PromptManagerPanel};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPanel {
    pub visible: bool,
    /// One divider per line, as shown in the text area
    pub dividers_text: String,
    pub case_sensitive: bool,
    pub mode: FoldingMode,
    pub debug: bool,
    /// Checked entries while manual header selection is active
    pub manual_selection: Option<BTreeSet<String>>,
}

impl SettingsPanel {
    pub fn from_config(config: &ProfileConfig) -> Self {
        let mut panel = Self::default();
        panel.sync(config);
        panel
    }

    /// Refresh form fields from the profile; visibility and selection stay
    pub fn sync(&mut self, config: &ProfileConfig) {
        self.dividers_text = config.dividers_text();
        self.case_sensitive = config.case_sensitive;
        self.mode = config.folding_mode;
        self.debug = config.debug;
    }

    pub fn is_selecting(&self) -> bool {
        self.manual_selection.is_some()
    }

}

/// Mount (or remount) the settings block above the prompt list. Without a
/// header it still sits directly before the list.
pub fn mount(panel: &mut PromptManagerPanel, config: &ProfileConfig) -> Result<(), FoldError> {
    if panel.list.is_none() {
        return Err(FoldError::MissingMountPoint);
    }
    let visible = panel.settings.as_ref().is_some_and(|s| s.visible);
    let mut settings = SettingsPanel::from_config(config);
    settings.visible = visible;
    panel.settings = Some(settings);
    Ok(())
}

/// Put the control bar into the panel header, replacing any previous one
pub fn install_controls(panel: &mut PromptManagerPanel, feature_enabled: bool) -> Result<(), FoldError> {
    let settings_active = panel.settings.as_ref().is_some_and(|s| s.visible);
    let header = panel.header.as_mut().ok_or(FoldError::MissingMountPoint)?;
    header.controls = Some(ControlBar {
        feature_enabled,
        settings_active,
    });
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Toast sink for user-facing messages
pub trait Notifier {
    fn notify(&mut self, level: NoticeLevel, message: &str);

    fn success(&mut self, message: &str) {
        self.notify(NoticeLevel::Success, message);
    }

    fn info(&mut self, message: &str) {
        self.notify(NoticeLevel::Info, message);
    }

    fn warning(&mut self, message: &str) {
        self.notify(NoticeLevel::Warning, message);
    }

    fn error(&mut self, message: &str) {
        self.notify(NoticeLevel::Error, message);
    }
}

/// Yes/no prompt guarding destructive actions
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, question: &str) -> bool {
        self(question)
    }
}
