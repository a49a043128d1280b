//! Replicated log abstraction
//!
//! The distributed store and the synchronization service both speak to a
//! partitioned, topic-keyed log through this trait. The in-process
//! implementation fans events out over broadcast channels; a real deployment
//! substitutes a networked log behind the same trait.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Events buffered per topic before slow consumers start lagging
const TOPIC_CAPACITY: usize = 1024;

/// A replicated, partitioned log keyed by topic name
pub trait ReplicatedLog: Send + Sync {
    /// Append a payload to the topic's partition. Fire-and-forget: no
    /// acknowledgment from replicas is awaited.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> crate::Result<()>;

    /// Subscribe to all future events on the topic.
    fn subscribe(&self, topic: &str) -> crate::Result<broadcast::Receiver<Vec<u8>>>;

    /// Is the backing infrastructure reachable?
    fn is_ready(&self) -> bool;
}

/// In-process log: one broadcast channel per topic.
///
/// All stores and services of one simulated fleet share a single instance.
pub struct InProcessLog {
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    healthy: AtomicBool,
}

static SHARED: Lazy<Arc<InProcessLog>> = Lazy::new(|| Arc::new(InProcessLog::new()));

impl InProcessLog {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            healthy: AtomicBool::new(true),
        }
    }

    /// The process-wide default instance.
    pub fn shared() -> Arc<InProcessLog> {
        SHARED.clone()
    }

    /// Mark the backing infrastructure up or down. While down, publish and
    /// subscribe fail with `StoreNotReady`.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        let mut topics = self.topics.lock().unwrap();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Default for InProcessLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicatedLog for InProcessLog {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> crate::Result<()> {
        if !self.is_ready() {
            return Err(crate::Error::StoreNotReady(format!(
                "log unavailable for topic '{}'",
                topic
            )));
        }
        // A send error only means no subscriber is attached yet
        let _ = self.sender(topic).send(payload);
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> crate::Result<broadcast::Receiver<Vec<u8>>> {
        if !self.is_ready() {
            return Err(crate::Error::StoreNotReady(format!(
                "log unavailable for topic '{}'",
                topic
            )));
        }
        Ok(self.sender(topic).subscribe())
    }

    fn is_ready(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let log = InProcessLog::new();
        let mut rx = log.subscribe("t").unwrap();
        log.publish("t", b"hello".to_vec()).unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_shared_instance_is_process_wide() {
        assert!(Arc::ptr_eq(&InProcessLog::shared(), &InProcessLog::shared()));
    }

    #[test]
    fn test_unhealthy_log_refuses() {
        let log = InProcessLog::new();
        log.set_healthy(false);
        assert!(!log.is_ready());
        assert!(matches!(
            log.publish("t", vec![]),
            Err(crate::Error::StoreNotReady(_))
        ));
        assert!(matches!(
            log.subscribe("t"),
            Err(crate::Error::StoreNotReady(_))
        ));

        log.set_healthy(true);
        assert!(log.subscribe("t").is_ok());
    }
}
