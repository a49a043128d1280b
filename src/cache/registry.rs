//! Process-wide registry of live exercise caches
//!
//! One injected instance per process, created at startup and drained at
//! shutdown; the scheduler and request handlers hold it by `Arc` rather than
//! through a global. Insertion is atomic per exercise id, so concurrent
//! first accesses never build duplicate caches.

use crate::cache::ExerciseCache;
use crate::model::ExerciseId;
use crate::store::{KeyValueStore, LocalStore, StoreFactory, TypedStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct CacheRegistry {
    factory: StoreFactory,
    caches: Mutex<HashMap<ExerciseId, Arc<ExerciseCache>>>,
}

impl CacheRegistry {
    pub fn new(factory: StoreFactory) -> Self {
        Self {
            factory,
            caches: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, exercise_id: ExerciseId) -> Option<Arc<ExerciseCache>> {
        self.caches.lock().unwrap().get(&exercise_id).cloned()
    }

    /// Fetch or lazily build the cache for an exercise. Atomic per id: two
    /// racing callers get the same instance.
    pub fn get_or_create(&self, exercise_id: ExerciseId) -> Arc<ExerciseCache> {
        let mut caches = self.caches.lock().unwrap();
        if let Some(cache) = caches.get(&exercise_id) {
            return cache.clone();
        }
        let cache = Arc::new(self.build_cache(exercise_id));
        caches.insert(exercise_id, cache.clone());
        cache
    }

    fn build_cache(&self, exercise_id: ExerciseId) -> ExerciseCache {
        ExerciseCache::new(
            exercise_id,
            TypedStore::json(self.open_store("submissions", exercise_id)),
            TypedStore::json(self.open_store("participations", exercise_id)),
            TypedStore::json(self.open_store("results", exercise_id)),
        )
    }

    /// Open one backing store, falling back to a local map when the
    /// distributed backend is not ready. The fallback is explicit and logged;
    /// the exercise keeps working single-instance.
    fn open_store(&self, kind: &str, exercise_id: ExerciseId) -> Arc<dyn KeyValueStore> {
        let topic = self.factory.topic(kind, exercise_id);
        match self.factory.open(&topic) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!("store '{}' unavailable, falling back to local: {}", topic, e);
                Arc::new(LocalStore::new())
            }
        }
    }

    /// Drop the cache for an exercise without clearing it; the caller decides
    /// whether remaining data is a bug worth warning about.
    pub fn remove(&self, exercise_id: ExerciseId) -> Option<Arc<ExerciseCache>> {
        self.caches.lock().unwrap().remove(&exercise_id)
    }

    /// Caches of all currently live exercises, for the periodic sweep.
    pub fn snapshot(&self) -> Vec<Arc<ExerciseCache>> {
        self.caches.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.caches.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tear down every cache; called at process shutdown.
    pub fn drain(&self) {
        let caches: Vec<_> = self.caches.lock().unwrap().drain().collect();
        for (_, cache) in caches {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let registry = CacheRegistry::new(StoreFactory::local("quiz"));
        let a = registry.get_or_create(1);
        let b = registry.get_or_create(1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_first_access_builds_one_cache() {
        let registry = Arc::new(CacheRegistry::new(StoreFactory::local("quiz")));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || registry.get_or_create(7)));
        }
        let caches: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(caches.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_and_drain() {
        let registry = CacheRegistry::new(StoreFactory::local("quiz"));
        registry.get_or_create(1);
        registry.get_or_create(2);

        assert!(registry.remove(1).is_some());
        assert!(registry.remove(1).is_none());
        assert_eq!(registry.len(), 1);

        registry.drain();
        assert!(registry.is_empty());
    }
}
