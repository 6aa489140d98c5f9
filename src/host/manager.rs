//! The host's prompt manager object
//!
//! Only two things are read from it: the accessor that returns the active
//! prompt collection (which gets wrapped) and the enabled/disabled order for
//! the active character. The manager becomes usable some time after page
//! load, so readiness is polled.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error};

use crate::constants::timing;
use crate::error::FoldError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub identifier: String,
    #[serde(default)]
    pub name: String,
}

/// What the host hands to generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptCollection {
    pub collection: Vec<Prompt>,
}

impl PromptCollection {
    pub fn identifiers(&self) -> Vec<&str> {
        self.collection.iter().map(|p| p.identifier.as_str()).collect()
    }
}

/// Active character's enabled flag for one prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptOrderEntry {
    pub identifier: String,
    pub enabled: bool,
}

/// `getPromptCollection(generationType)`
pub type CollectionAccessor = Rc<dyn Fn(&str) -> PromptCollection>;

/// Prompt order of the active character, `None` when no character is active
pub type OrderSource = Rc<dyn Fn() -> Option<Vec<PromptOrderEntry>>>;

pub trait PromptManagerHost {
    /// Whether the manager has finished its own initialization
    fn is_ready(&self) -> bool;

    fn collection_accessor(&self) -> CollectionAccessor;

    fn set_collection_accessor(&mut self, accessor: CollectionAccessor);

    fn order_source(&self) -> OrderSource;

    /// Call whatever accessor is currently installed
    fn get_prompt_collection(&self, generation_type: &str) -> PromptCollection {
        (self.collection_accessor())(generation_type)
    }
}

/// Manager backed by shared vectors; used by the CLI and tests
pub struct StaticPromptManager {
    ready: bool,
    prompts: Rc<RefCell<Vec<Prompt>>>,
    order: Rc<RefCell<Option<Vec<PromptOrderEntry>>>>,
    accessor: CollectionAccessor,
}

impl StaticPromptManager {
    pub fn new(prompts: Vec<Prompt>, order: Option<Vec<PromptOrderEntry>>) -> Self {
        let prompts = Rc::new(RefCell::new(prompts));
        let source = Rc::clone(&prompts);
        let accessor: CollectionAccessor = Rc::new(move |_generation_type: &str| PromptCollection {
            collection: source.borrow().clone(),
        });
        Self {
            ready: true,
            prompts,
            order: Rc::new(RefCell::new(order)),
            accessor,
        }
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn set_prompt_enabled(&self, identifier: &str, enabled: bool) {
        if let Some(order) = self.order.borrow_mut().as_mut() {
            match order.iter_mut().find(|e| e.identifier == identifier) {
                Some(entry) => entry.enabled = enabled,
                None => order.push(PromptOrderEntry {
                    identifier: identifier.to_string(),
                    enabled,
                }),
            }
        }
    }

    pub fn set_prompts(&self, prompts: Vec<Prompt>) {
        *self.prompts.borrow_mut() = prompts;
    }
}

impl PromptManagerHost for StaticPromptManager {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn collection_accessor(&self) -> CollectionAccessor {
        Rc::clone(&self.accessor)
    }

    fn set_collection_accessor(&mut self, accessor: CollectionAccessor) {
        self.accessor = accessor;
    }

    fn order_source(&self) -> OrderSource {
        let order = Rc::clone(&self.order);
        Rc::new(move || order.borrow().clone())
    }
}

/// Polling schedule for host readiness
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: timing::READY_POLL_INTERVAL,
            attempts: timing::READY_POLL_ATTEMPTS,
        }
    }
}

/// Poll `probe` until it reports ready or the attempts run out.
/// Returns the number of probes it took.
pub async fn wait_until_ready(mut probe: impl FnMut() -> bool, poll: PollConfig) -> Result<u32, FoldError> {
    for attempt in 1..=poll.attempts {
        if probe() {
            debug!(attempt, "Host prompt manager ready");
            return Ok(attempt);
        }
        tokio::time::sleep(poll.interval).await;
    }
    error!(attempts = poll.attempts, "Host prompt manager never became ready, giving up");
    Err(FoldError::ReadinessTimeout {
        attempts: poll.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn prompt(id: &str) -> Prompt {
        Prompt {
            identifier: id.to_string(),
            name: id.to_uppercase(),
        }
    }

    #[test]
    fn test_static_manager_reads_live_prompts() {
        let manager = StaticPromptManager::new(vec![prompt("a")], None);
        manager.set_prompts(vec![prompt("a"), prompt("b")]);
        assert_eq!(manager.get_prompt_collection("normal").identifiers(), vec!["a", "b"]);
    }

    #[test]
    fn test_order_source_sees_updates() {
        let manager = StaticPromptManager::new(
            vec![prompt("a")],
            Some(vec![PromptOrderEntry {
                identifier: "a".to_string(),
                enabled: true,
            }]),
        );
        let source = manager.order_source();
        manager.set_prompt_enabled("a", false);
        assert!(!source().unwrap()[0].enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_ready_after_some_attempts() {
        let calls = Cell::new(0);
        let result = wait_until_ready(
            || {
                calls.set(calls.get() + 1);
                calls.get() >= 3
            },
            PollConfig::default(),
        )
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_ready_gives_up() {
        let calls = Cell::new(0);
        let poll = PollConfig {
            interval: Duration::from_millis(100),
            attempts: 5,
        };
        let result = wait_until_ready(
            || {
                calls.set(calls.get() + 1);
                false
            },
            poll,
        )
        .await;
        assert!(matches!(result, Err(FoldError::ReadinessTimeout { attempts: 5 })));
        assert_eq!(calls.get(), 5);
    }
}
