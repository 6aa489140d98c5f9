//! Downstream filter over the host's prompt collection
//!
//! The host's accessor is wrapped once. Every call goes through to the
//! original, then drops the children of groups whose header the active
//! character has disabled. Any inconsistency passes the collection through
//! untouched; the host's read path must never fail because of us.

use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::error::FoldError;
use crate::group_state::{GroupRegistry, SharedGroups};
use crate::host::{CollectionAccessor, PollConfig, PromptCollection, PromptManagerHost, PromptOrderEntry, wait_until_ready};

/// Refresh header flags from `order` and remove children of disabled groups.
///
/// With no active character (`order` is `None`) the flags recorded by the last
/// rebuild are used as they are. Headers missing from the order count as enabled.
pub fn filter_collection(
    mut collection: PromptCollection,
    order: Option<&[PromptOrderEntry]>,
    groups: &mut GroupRegistry,
) -> PromptCollection {
    if !groups.is_feature_enabled() {
        return collection;
    }

    if let Some(order) = order {
        let keys: Vec<String> = groups.group_keys().map(str::to_string).collect();
        for key in keys {
            let enabled = order
                .iter()
                .find(|entry| entry.identifier == key)
                .is_none_or(|entry| entry.enabled);
            groups.set_header_enabled(&key, enabled);
        }
    }

    let excluded = groups.disabled_children();
    if excluded.is_empty() {
        return collection;
    }

    let before = collection.collection.len();
    collection
        .collection
        .retain(|prompt| !excluded.contains(prompt.identifier.as_str()));
    debug!(
        removed = before - collection.collection.len(),
        "Filtered prompts of disabled groups"
    );
    collection
}

/// Remembers whether the accessor of a host manager was already wrapped
#[derive(Debug, Default)]
pub struct HookGuard {
    installed: bool,
}

impl HookGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }
}

/// Wrap the host's collection accessor. Returns `false` if already wrapped.
pub fn install<H: PromptManagerHost + ?Sized>(host: &mut H, groups: SharedGroups, guard: &mut HookGuard) -> bool {
    if guard.installed {
        debug!("Prompt collection filter already installed");
        return false;
    }

    let original = host.collection_accessor();
    let order = host.order_source();
    let wrapped: CollectionAccessor = Rc::new(move |generation_type: &str| {
        let collection = original(generation_type);
        match groups.try_borrow_mut() {
            Ok(mut registry) => filter_collection(collection, order().as_deref(), &mut registry),
            Err(_) => {
                warn!("Group state busy, passing prompts through unfiltered");
                collection
            }
        }
    });

    host.set_collection_accessor(wrapped);
    guard.installed = true;
    info!("Installed prompt collection filter");
    true
}

/// Wait for the host manager, then install the filter
pub async fn install_when_ready<H: PromptManagerHost + ?Sized>(
    host: &mut H,
    groups: SharedGroups,
    guard: &mut HookGuard,
    poll: PollConfig,
) -> Result<bool, FoldError> {
    if guard.is_installed() {
        return Ok(false);
    }
    wait_until_ready(|| host.is_ready(), poll).await?;
    Ok(install(host, groups, guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Prompt, StaticPromptManager};
    use std::time::Duration;

    fn prompts(ids: &[&str]) -> Vec<Prompt> {
        ids.iter()
            .map(|id| Prompt {
                identifier: id.to_string(),
                name: id.to_string(),
            })
            .collect()
    }

    fn order(entries: &[(&str, bool)]) -> Vec<PromptOrderEntry> {
        entries
            .iter()
            .map(|(id, enabled)| PromptOrderEntry {
                identifier: id.to_string(),
                enabled: *enabled,
            })
            .collect()
    }

    fn registry() -> GroupRegistry {
        let mut groups = GroupRegistry::new(true);
        groups.record_group("h1", vec!["a".to_string(), "b".to_string()], true);
        groups.record_group("h2", vec!["c".to_string()], true);
        groups
    }

    fn collection() -> PromptCollection {
        PromptCollection {
            collection: prompts(&["h1", "a", "b", "h2", "c", "loose"]),
        }
    }

    #[test]
    fn test_disabled_header_excludes_its_children() {
        let mut groups = registry();
        let order = order(&[("h1", false), ("h2", true)]);

        let filtered = filter_collection(collection(), Some(order.as_slice()), &mut groups);

        assert_eq!(filtered.identifiers(), vec!["h1", "h2", "c", "loose"]);
        assert_eq!(groups.header_enabled("h1"), Some(false));
    }

    #[test]
    fn test_reenabling_restores_children() {
        let mut groups = registry();
        filter_collection(collection(), Some(order(&[("h1", false)]).as_slice()), &mut groups);

        let filtered = filter_collection(collection(), Some(order(&[("h1", true)]).as_slice()), &mut groups);

        assert_eq!(filtered, collection());
    }

    #[test]
    fn test_header_missing_from_order_counts_as_enabled() {
        let mut groups = GroupRegistry::new(true);
        groups.record_group("h1", vec!["a".to_string()], false);

        let filtered = filter_collection(collection(), Some(&[][..]), &mut groups);

        assert_eq!(filtered, collection());
        assert_eq!(groups.header_enabled("h1"), Some(true));
    }

    #[test]
    fn test_without_character_uses_recorded_flags() {
        let mut groups = GroupRegistry::new(true);
        groups.record_group("h2", vec!["c".to_string()], false);

        let filtered = filter_collection(collection(), None, &mut groups);

        assert_eq!(filtered.identifiers(), vec!["h1", "a", "b", "h2", "loose"]);
    }

    #[test]
    fn test_feature_disabled_passes_through() {
        let mut groups = registry();
        groups.set_feature_enabled(false);

        let filtered = filter_collection(collection(), Some(order(&[("h1", false)]).as_slice()), &mut groups);

        assert_eq!(filtered, collection());
    }

    #[test]
    fn test_filter_is_idempotent() {
        let mut groups = registry();
        let order = order(&[("h2", false)]);
        let first = filter_collection(collection(), Some(order.as_slice()), &mut groups);
        let second = filter_collection(collection(), Some(order.as_slice()), &mut groups);
        assert_eq!(first, second);
    }

    #[test]
    fn test_install_wraps_accessor_once() {
        let mut manager = StaticPromptManager::new(prompts(&["h1", "a", "b"]), Some(order(&[("h1", false)])));
        let groups = GroupRegistry::shared(true);
        groups
            .borrow_mut()
            .record_group("h1", vec!["a".to_string(), "b".to_string()], true);
        let mut guard = HookGuard::new();

        assert!(install(&mut manager, Rc::clone(&groups), &mut guard));
        assert!(!install(&mut manager, Rc::clone(&groups), &mut guard));

        assert_eq!(manager.get_prompt_collection("normal").identifiers(), vec!["h1"]);

        manager.set_prompt_enabled("h1", true);
        assert_eq!(
            manager.get_prompt_collection("normal").identifiers(),
            vec!["h1", "a", "b"]
        );
    }

    #[test]
    fn test_busy_group_state_fails_open() {
        let mut manager = StaticPromptManager::new(prompts(&["h1", "a"]), Some(order(&[("h1", false)])));
        let groups = GroupRegistry::shared(true);
        groups.borrow_mut().record_group("h1", vec!["a".to_string()], false);
        let mut guard = HookGuard::new();
        install(&mut manager, Rc::clone(&groups), &mut guard);

        let held = groups.borrow();
        assert_eq!(manager.get_prompt_collection("normal").identifiers(), vec!["h1", "a"]);
        drop(held);

        assert_eq!(manager.get_prompt_collection("normal").identifiers(), vec!["h1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_when_ready_times_out() {
        let mut manager = StaticPromptManager::new(prompts(&["a"]), None);
        manager.set_ready(false);
        let mut guard = HookGuard::new();
        let poll = PollConfig {
            interval: Duration::from_millis(100),
            attempts: 3,
        };

        let result = install_when_ready(&mut manager, GroupRegistry::shared(true), &mut guard, poll).await;

        assert!(matches!(result, Err(FoldError::ReadinessTimeout { attempts: 3 })));
        assert!(!guard.is_installed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_when_ready_installs() {
        let mut manager = StaticPromptManager::new(prompts(&["a"]), None);
        let mut guard = HookGuard::new();

        let installed = install_when_ready(&mut manager, GroupRegistry::shared(true), &mut guard, PollConfig::default())
            .await
            .unwrap();

        assert!(installed);
        assert!(guard.is_installed());
    }
}
