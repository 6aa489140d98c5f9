#![forbid(unsafe_code)]

//! Collapsible grouping for a host's flat prompt list
//!
//! The host owns the list and may redraw it at any time. This crate regroups
//! it under a per-profile strategy, keeps the grouping state persisted per
//! profile and filters out prompts of disabled groups on the host's read path.

pub mod config;
pub mod constants;
pub mod divider;
pub mod error;
pub mod filter_hook;
pub mod folding;
pub mod group_state;
pub mod host;
pub mod resync;
pub mod session;
pub mod settings;

pub use error::FoldError;
pub use folding::{FoldingEngine, RebuildOutcome, RebuildSummary};
pub use session::FoldingSession;
