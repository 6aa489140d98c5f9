//! Typed failures surfaced by the folding engine and its storage layer

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FoldError {
    #[error("failed to write storage file {path}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode '{field}' for profile '{profile}'")]
    Encode {
        profile: String,
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("divider patterns did not compile")]
    Pattern(#[from] regex::Error),

    #[error("two headers share the group key '{0}'")]
    DuplicateGroupKey(String),

    #[error("group state is borrowed elsewhere")]
    GroupStateBusy,

    #[error("host prompt manager not ready after {attempts} attempts")]
    ReadinessTimeout { attempts: u32 },

    #[error("no settings mount point in the prompt manager panel")]
    MissingMountPoint,
}
