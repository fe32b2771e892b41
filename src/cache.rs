use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

const CACHE_KEY_DELIMITER: char = '@';

/// Identity of a cached entry, derived from the function name and module
/// path of a request. Stable across requests, so two requests naming the
/// same function share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(function_name: &str, module_path: &str) -> Self {
        Self(format!(
            "{}{}{}",
            function_name, CACHE_KEY_DELIMITER, module_path
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// In-memory store of per-function cache entries.
///
/// Entries live for the lifetime of the bridge process; there is no
/// eviction and nothing is persisted across restarts. Workers only ever see
/// cloned snapshots, and updates replace an entry wholesale.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<CacheKey, Value>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of the entry for `key`, inserting a fresh empty
    /// object first if the key has never been seen.
    pub async fn get_or_create(&self, key: &CacheKey) -> Value {
        let mut entries = self.entries.write().await;
        entries
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()))
            .clone()
    }

    /// Replace the entry for `key` wholesale.
    pub async fn set(&self, key: CacheKey, entry: Value) {
        self.entries.write().await.insert(key, entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
