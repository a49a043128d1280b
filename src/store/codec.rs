//! Value codecs for typed stores
//!
//! Every store instance carries an explicit encode/decode pair for its value
//! type. Decoding only ever targets that one type; arbitrary payloads are a
//! codec error, not a deserialization of whatever arrived.

use crate::store::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Encode/decode contract attached to a store instance
pub trait ValueCodec<V>: Send + Sync {
    fn encode(&self, value: &V) -> crate::Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> crate::Result<V>;
}

/// JSON-backed codec for serde values.
///
/// Cached values embed free-form answer documents (`serde_json::Value`),
/// which need a self-describing format to decode.
pub struct JsonCodec;

impl<V: Serialize + DeserializeOwned> ValueCodec<V> for JsonCodec {
    fn encode(&self, value: &V) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| crate::Error::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> crate::Result<V> {
        serde_json::from_slice(bytes).map_err(|e| crate::Error::Codec(e.to_string()))
    }
}

/// A key/value store bound to one value type through its codec
pub struct TypedStore<V> {
    store: Arc<dyn KeyValueStore>,
    codec: Arc<dyn ValueCodec<V>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for TypedStore<V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            codec: self.codec.clone(),
            _value: PhantomData,
        }
    }
}

impl<V> TypedStore<V> {
    pub fn new(store: Arc<dyn KeyValueStore>, codec: Arc<dyn ValueCodec<V>>) -> Self {
        Self {
            store,
            codec,
            _value: PhantomData,
        }
    }

    pub fn get(&self, key: &str) -> crate::Result<Option<V>> {
        match self.store.get(key) {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, key: &str, value: &V) -> crate::Result<()> {
        let bytes = self.codec.encode(value)?;
        self.store.put(key, bytes);
        Ok(())
    }

    pub fn delete(&self, key: &str) {
        self.store.delete(key);
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

impl<V: Serialize + DeserializeOwned + 'static> TypedStore<V> {
    /// Convenience constructor with the default JSON codec
    pub fn json(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, Arc::new(JsonCodec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CachedSubmission;
    use crate::store::LocalStore;

    #[test]
    fn test_typed_store_roundtrip() {
        let store: TypedStore<CachedSubmission> = TypedStore::json(Arc::new(LocalStore::new()));

        let submission = CachedSubmission {
            answers: serde_json::json!({"q1": "b"}),
            submitted: true,
            submitted_at: None,
            updated_at: None,
        };
        store.put("alice", &submission).unwrap();

        let loaded = store.get("alice").unwrap().unwrap();
        assert_eq!(loaded, submission);
        assert!(store.get("bob").unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let raw = Arc::new(LocalStore::new());
        crate::store::KeyValueStore::put(raw.as_ref(), "alice", vec![0xff, 0x00, 0x13]);

        let store: TypedStore<CachedSubmission> = TypedStore::json(raw);
        let err = store.get("alice").unwrap_err();
        assert!(matches!(err, crate::Error::Codec(_)));
    }
}
