//! Response caching.
//!
//! Keys are derived from the sanitized prompt, the call parameters and the
//! output schema identity. The orchestrator reads the cache after input
//! moderation and writes it only after producing a final result.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::backend::Parameters;

/// Deterministic cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives a key from the inputs that determine a call's result.
    ///
    /// The key is the hex SHA-256 of a canonical JSON document, so equal
    /// inputs always produce equal keys.
    pub fn derive(prompt: &str, parameters: &Parameters, schema: Option<&str>) -> Self {
        let document = serde_json::json!({
            "prompt": prompt,
            "parameters": parameters,
            "schema": schema,
        });

        let mut hasher = Sha256::new();
        hasher.update(document.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key/get/set cache capability.
///
/// Implementations must tolerate concurrent `get`/`set`; concurrent writers
/// of the same key resolve as last write wins.
#[async_trait]
pub trait ResponseCache<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    /// Derives the key for a call.
    fn key(&self, prompt: &str, parameters: &Parameters, schema: Option<&str>) -> CacheKey {
        CacheKey::derive(prompt, parameters, schema)
    }

    /// Looks up a value.
    async fn get(&self, key: &CacheKey) -> Option<V>;

    /// Stores a value, replacing any previous one.
    async fn set(&self, key: CacheKey, value: V);
}

/// Process-local, unbounded cache.
pub struct InMemoryCache<V> {
    entries: RwLock<HashMap<CacheKey, V>>,
}

impl<V> InMemoryCache<V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<V> Default for InMemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for InMemoryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[async_trait]
impl<V> ResponseCache<V> for InMemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &CacheKey) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    async fn set(&self, key: CacheKey, value: V) {
        self.entries.write().insert(key, value);
    }
}

/// Cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl<V> ResponseCache<V> for NoopCache
where
    V: Send + Sync + 'static,
{
    async fn get(&self, _key: &CacheKey) -> Option<V> {
        None
    }

    async fn set(&self, _key: CacheKey, _value: V) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    fn params(temperature: f64) -> Parameters {
        let mut params = Parameters::new();
        params.insert("temperature".to_string(), serde_json::json!(temperature));
        params
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = CacheKey::derive("hello", &params(0.2), Some("Person"));
        let b = CacheKey::derive("hello", &params(0.2), Some("Person"));

        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_key_depends_on_every_input() {
        let base = CacheKey::derive("hello", &params(0.2), Some("Person"));

        assert_ne!(base, CacheKey::derive("hello!", &params(0.2), Some("Person")));
        assert_ne!(base, CacheKey::derive("hello", &params(0.7), Some("Person")));
        assert_ne!(base, CacheKey::derive("hello", &params(0.2), Some("Invoice")));
        assert_ne!(base, CacheKey::derive("hello", &params(0.2), None));
    }

    #[test]
    fn test_key_ignores_parameter_insertion_order() {
        let mut first = Parameters::new();
        first.insert("a".to_string(), serde_json::json!(1));
        first.insert("b".to_string(), serde_json::json!(2));

        let mut second = Parameters::new();
        second.insert("b".to_string(), serde_json::json!(2));
        second.insert("a".to_string(), serde_json::json!(1));

        assert_eq!(
            CacheKey::derive("p", &first, None),
            CacheKey::derive("p", &second, None)
        );
    }

    #[tokio::test]
    async fn test_in_memory_get_set() {
        let cache = InMemoryCache::<String>::new();
        let key = cache.key("hello", &Parameters::new(), None);

        assert_eq!(cache.get(&key).await, None);

        cache.set(key.clone(), "first".to_string()).await;
        cache.set(key.clone(), "second".to_string()).await;

        assert_eq!(cache.get(&key).await, Some("second".to_string()));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_noop_cache_never_hits() {
        let cache = NoopCache;
        let key = CacheKey::derive("hello", &Parameters::new(), None);

        ResponseCache::<String>::set(&cache, key.clone(), "value".to_string()).await;
        assert_eq!(ResponseCache::<String>::get(&cache, &key).await, None);
    }
}
