//! Local in-process store
//!
//! Concurrent map behind a mutex; operations are synchronous and block only
//! on lock contention. The default backend for single-instance deployments.

use crate::store::KeyValueStore;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory store (default)
#[derive(Debug, Default)]
pub struct LocalStore {
    map: Mutex<HashMap<String, Vec<u8>>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }
}

impl KeyValueStore for LocalStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.map.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, value: Vec<u8>) {
        self.map.lock().unwrap().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        self.map.lock().unwrap().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.map.lock().unwrap().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    fn clear(&self) {
        self.map.lock().unwrap().clear();
    }
}
