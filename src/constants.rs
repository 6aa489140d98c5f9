//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Persisted key layout (`<PREFIX>:<profile>:<field>`)
pub mod storage {
    /// Namespace prefix shared by every persisted key
    pub const PREFIX: &str = "prompt_fold";

    /// Separator between prefix, profile and field segments
    pub const SEPARATOR: char = ':';

    /// JSON object: group key → open flag
    pub const OPEN_STATES: &str = "open_states";

    /// Boolean: whole feature on/off
    pub const FEATURE_ENABLED: &str = "feature_enabled";

    /// JSON array of literal divider prefixes
    pub const DIVIDERS: &str = "dividers";

    /// Boolean: divider matching respects case
    pub const CASE_SENSITIVE: &str = "case_sensitive";

    /// Strategy name string (`standard` / `sandwich` / `manual`)
    pub const FOLDING_MODE: &str = "folding_mode";

    /// Boolean: verbose engine diagnostics
    pub const DEBUG: &str = "debug";

    /// JSON array of manually designated header identifiers
    pub const MANUAL_HEADERS: &str = "manual_headers";

    /// JSON array of `[identifier, name]` pairs
    pub const NAME_CACHE: &str = "name_cache";

    /// Every field written per profile
    pub const FIELDS: [&str; 8] = [
        OPEN_STATES,
        FEATURE_ENABLED,
        DIVIDERS,
        CASE_SENSITIVE,
        FOLDING_MODE,
        DEBUG,
        MANUAL_HEADERS,
        NAME_CACHE,
    ];
}

/// Default configuration values
pub mod defaults {
    /// Divider prefixes used when a profile has none persisted
    pub const DIVIDERS: [&str; 2] = ["=", "-"];

    /// Profile used when the host has not selected one
    pub const PROFILE: &str = "default";
}

/// File locations
pub mod config {
    /// Directory under the platform config dir
    pub const APP_DIR: &str = "prompt-fold";

    /// Key-value storage file name
    pub const FILENAME: &str = "storage.json";
}

/// Host DOM shape this system decorates
pub mod host {
    /// Id of the prompt manager panel
    pub const PROMPT_MANAGER: &str = "completion_prompt_manager";

    /// Id of the prompt list container inside the panel
    pub const PROMPT_LIST: &str = "completion_prompt_manager_list";

    /// Id of the settings block mounted into the panel
    pub const SETTINGS_PANEL: &str = "prompt-folding-settings";
}

/// Timer delays used to coalesce host re-render bursts
pub mod timing {
    use std::time::Duration;

    /// Delay before reconnecting the list observer after a rebuild
    pub const RECONNECT_DELAY: Duration = Duration::from_millis(100);

    /// Delay between drag completion and the follow-up rebuild
    pub const DRAG_REBUILD_DELAY: Duration = Duration::from_millis(150);

    /// Interval between host readiness probes
    pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Probes attempted before giving up (5 seconds total)
    pub const READY_POLL_ATTEMPTS: u32 = 50;
}
