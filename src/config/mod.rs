//! Configuration management for prompt folding
//!
//! This module provides three pieces:
//! - **profile**: ProfileConfig, the per-profile grouping settings
//! - **store**: key-value persistence namespaced by profile
//! - **transfer**: copying a profile's grouping setup onto another profile

pub mod profile;
pub mod store;
pub mod transfer;

// Re-export commonly used types
pub use profile::{FoldingMode, ProfileConfig, parse_dividers};
pub use store::{FileStore, KeyValueStore, MemoryStore, ProfileStore};
pub use transfer::{ConfigSnapshot, HeaderIdentity, MatchReport, UnmatchedHeader};
