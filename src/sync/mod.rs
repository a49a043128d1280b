//! Cross-instance synchronization of administrative events
//!
//! Coarse-grained events fan out to every server instance sharing the same
//! replicated log. Receivers treat each event as "evict and reload": the
//! authoritative state is durable storage, never the event payload, because
//! events may arrive out of order relative to concurrent writes. Delivery is
//! at-most-once and best-effort; a lost event delays cache coherence but
//! cannot corrupt data.

use crate::cache::CacheRegistry;
use crate::model::ExerciseId;
use crate::store::ReplicatedLog;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// Quiz data was reset on some instance; evict and reload from durable
    /// storage.
    QuizReset { exercise_id: ExerciseId },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    origin: String,
    event: SyncEvent,
}

pub struct SyncService {
    instance_id: String,
    topic: String,
    log: Option<Arc<dyn ReplicatedLog>>,
}

impl SyncService {
    /// Single-instance deployment: every broadcast is a no-op.
    pub fn local(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            topic: String::new(),
            log: None,
        }
    }

    pub fn distributed(
        instance_id: impl Into<String>,
        log: Arc<dyn ReplicatedLog>,
        topic_prefix: &str,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            topic: format!("{}.sync", topic_prefix),
            log: Some(log),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Broadcast an event to every instance on the shared log. Best effort:
    /// a failed publish is logged and dropped.
    pub fn inform_servers(&self, event: SyncEvent) {
        let Some(log) = &self.log else {
            return;
        };
        let envelope = Envelope {
            origin: self.instance_id.clone(),
            event,
        };
        let payload = match bincode::serialize(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("sync: could not encode event: {}", e);
                return;
            }
        };
        if let Err(e) = log.publish(&self.topic, payload) {
            tracing::warn!("sync: event dropped: {}", e);
        }
    }

    /// Spawn the listener applying remote events to the local registry.
    /// Returns None in single-instance mode or when the log is unreachable.
    pub fn listen(&self, registry: Arc<CacheRegistry>) -> Option<JoinHandle<()>> {
        let log = self.log.as_ref()?;
        let mut rx = match log.subscribe(&self.topic) {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!("sync: listener not started: {}", e);
                return None;
            }
        };

        let instance_id = self.instance_id.clone();
        Some(tokio::spawn(async move {
            loop {
                let payload = match rx.recv().await {
                    Ok(payload) => payload,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("sync: listener lagged {} events", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let envelope = match bincode::deserialize::<Envelope>(&payload) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        tracing::warn!("sync: dropping undecodable event: {}", e);
                        continue;
                    }
                };
                if envelope.origin == instance_id {
                    continue;
                }
                Self::apply(&registry, envelope.event);
            }
        }))
    }

    fn apply(registry: &CacheRegistry, event: SyncEvent) {
        match event {
            SyncEvent::QuizReset { exercise_id } => {
                if let Some(cache) = registry.remove(exercise_id) {
                    cache.clear();
                    tracing::info!(
                        "sync: evicted exercise {} after reset broadcast",
                        exercise_id
                    );
                }
                // the next access reloads from durable storage
            }
        }
    }
}
