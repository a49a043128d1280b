//! Distributed store over a replicated log
//!
//! Writes publish an event onto the store's topic; a background consumer per
//! process applies the log to a local materialized view that backs reads.
//! A `get` right after a `put` from the same process may not see the write
//! until the consumer has caught up: eventual consistency, traded for
//! fire-and-forget write latency.

use crate::store::{KeyValueStore, ReplicatedLog};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Serialize, Deserialize)]
enum StoreEvent {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
    Clear,
}

pub struct DistributedStore {
    topic: String,
    log: Arc<dyn ReplicatedLog>,
    view: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    consumer: JoinHandle<()>,
}

impl std::fmt::Debug for DistributedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedStore")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl DistributedStore {
    /// Connect to a topic, spawning the consumer that keeps the local view
    /// current. Fails fast with `StoreNotReady` when the log is unreachable;
    /// the caller falls back to a local store instead of serving stale data.
    pub fn connect(log: Arc<dyn ReplicatedLog>, topic: &str) -> crate::Result<Self> {
        if !log.is_ready() {
            return Err(crate::Error::StoreNotReady(format!(
                "log unavailable for topic '{}'",
                topic
            )));
        }
        let mut rx = log.subscribe(topic)?;
        let view: Arc<Mutex<HashMap<String, Vec<u8>>>> = Arc::new(Mutex::new(HashMap::new()));

        let consumer = tokio::spawn({
            let view = view.clone();
            let topic = topic.to_string();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(payload) => Self::apply(&view, &topic, &payload),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("store '{}': consumer lagged {} events", topic, n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Ok(Self {
            topic: topic.to_string(),
            log,
            view,
            consumer,
        })
    }

    fn apply(view: &Mutex<HashMap<String, Vec<u8>>>, topic: &str, payload: &[u8]) {
        match bincode::deserialize::<StoreEvent>(payload) {
            Ok(StoreEvent::Put { key, value }) => {
                view.lock().unwrap().insert(key, value);
            }
            Ok(StoreEvent::Delete { key }) => {
                view.lock().unwrap().remove(&key);
            }
            Ok(StoreEvent::Clear) => {
                view.lock().unwrap().clear();
            }
            Err(e) => {
                tracing::warn!("store '{}': dropping undecodable event: {}", topic, e);
            }
        }
    }

    fn publish(&self, event: &StoreEvent) {
        let payload = match bincode::serialize(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("store '{}': could not encode event: {}", self.topic, e);
                return;
            }
        };
        if let Err(e) = self.log.publish(&self.topic, payload) {
            // Best effort: durable storage remains the source of truth
            tracing::warn!("store '{}': event dropped: {}", self.topic, e);
        }
    }
}

impl KeyValueStore for DistributedStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.view.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, value: Vec<u8>) {
        self.publish(&StoreEvent::Put {
            key: key.to_string(),
            value,
        });
    }

    fn delete(&self, key: &str) {
        self.publish(&StoreEvent::Delete {
            key: key.to_string(),
        });
    }

    fn keys(&self) -> Vec<String> {
        self.view.lock().unwrap().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.view.lock().unwrap().len()
    }

    fn clear(&self) {
        self.publish(&StoreEvent::Clear);
    }
}

impl Drop for DistributedStore {
    fn drop(&mut self) {
        self.consumer.abort();
    }
}
