//! Key/value store abstraction backing the live caches
//!
//! Two backends implement the same trait: a local in-process map, and a
//! distributed store kept consistent across server processes through a
//! replicated log. Callers never know which one backs a given store; the
//! choice is made once at startup by the [`StoreFactory`].

pub mod codec;
pub mod distributed;
pub mod local;
pub mod log;

pub use codec::{JsonCodec, TypedStore, ValueCodec};
pub use distributed::DistributedStore;
pub use local::LocalStore;
pub use log::{InProcessLog, ReplicatedLog};

use crate::common::Config;
use crate::model::ExerciseId;
use std::sync::Arc;

/// Trait for key-value store backends
///
/// No ordering guarantee across distinct keys; per-key last-write-wins under
/// concurrent puts.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn put(&self, key: &str, value: Vec<u8>);
    fn delete(&self, key: &str);
    fn keys(&self) -> Vec<String>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn clear(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Local,
    Distributed,
}

/// Builds stores for the profile selected at startup.
///
/// Call sites open stores through this factory and never branch on the mode
/// themselves.
#[derive(Clone)]
pub struct StoreFactory {
    mode: StoreMode,
    log: Option<Arc<dyn ReplicatedLog>>,
    topic_prefix: String,
}

impl StoreFactory {
    pub fn local(topic_prefix: impl Into<String>) -> Self {
        Self {
            mode: StoreMode::Local,
            log: None,
            topic_prefix: topic_prefix.into(),
        }
    }

    pub fn distributed(log: Arc<dyn ReplicatedLog>, topic_prefix: impl Into<String>) -> Self {
        Self {
            mode: StoreMode::Distributed,
            log: Some(log),
            topic_prefix: topic_prefix.into(),
        }
    }

    /// Select the mode from configuration. Distributed mode without an
    /// explicit log falls back to the process-wide in-process instance, so
    /// every factory in the process shares one bus by default.
    pub fn from_config(config: &Config, log: Option<Arc<dyn ReplicatedLog>>) -> Self {
        if config.distributed {
            let log = log.unwrap_or_else(|| {
                let shared: Arc<dyn ReplicatedLog> = InProcessLog::shared();
                shared
            });
            Self::distributed(log, config.topic_prefix.clone())
        } else {
            Self::local(config.topic_prefix.clone())
        }
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Topic name for one kind of per-exercise store, e.g. `quiz.submissions.42`.
    pub fn topic(&self, kind: &str, exercise_id: ExerciseId) -> String {
        format!("{}.{}.{}", self.topic_prefix, kind, exercise_id)
    }

    /// Open a store on the given topic.
    ///
    /// Fails fast with `StoreNotReady` when the distributed backend is
    /// unavailable; callers decide whether to fall back to a local store.
    pub fn open(&self, topic: &str) -> crate::Result<Arc<dyn KeyValueStore>> {
        match self.mode {
            StoreMode::Local => Ok(Arc::new(LocalStore::new())),
            StoreMode::Distributed => {
                let log = self.log.as_ref().ok_or_else(|| {
                    crate::Error::StoreNotReady(format!("no replicated log attached for '{}'", topic))
                })?;
                let store = DistributedStore::connect(log.clone(), topic)?;
                Ok(Arc::new(store))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_naming() {
        let factory = StoreFactory::local("quiz");
        assert_eq!(factory.topic("submissions", 42), "quiz.submissions.42");
        assert_eq!(factory.topic("results", 7), "quiz.results.7");
    }

    #[test]
    fn test_local_factory_opens() {
        let factory = StoreFactory::local("quiz");
        assert_eq!(factory.mode(), StoreMode::Local);
        let store = factory.open("quiz.submissions.1").unwrap();
        store.put("a", vec![1]);
        assert_eq!(store.get("a"), Some(vec![1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distributed_config_defaults_to_the_shared_log() {
        let config = Config {
            distributed: true,
            ..Config::default()
        };
        let a = StoreFactory::from_config(&config, None);
        let b = StoreFactory::from_config(&config, None);
        assert_eq!(a.mode(), StoreMode::Distributed);

        // two factories built from config alone converge over one bus
        let store_a = a.open("quiz.submissions.901").unwrap();
        let store_b = b.open("quiz.submissions.901").unwrap();
        store_a.put("alice", b"v1".to_vec());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(store_b.get("alice"), Some(b"v1".to_vec()));
    }
}
