//! Metadata Cache
//!
//! Schema snapshots keyed by (environment, schema). Entries never expire on
//! their own; only an explicit reload or invalidation drops them.

use super::SchemaSnapshot;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Cache key: (environment, schema)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub environment: String,
    pub schema: String,
}

impl CacheKey {
    pub fn new(environment: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            schema: schema.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.environment, self.schema)
    }
}

/// Loaded-entry counts
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub environments: usize,
}

/// Store for cached schema snapshots
pub struct MetadataCache {
    entries: Arc<RwLock<HashMap<CacheKey, Arc<SchemaSnapshot>>>>,
    /// One lock per key so concurrent misses trigger a single load
    loading: Arc<Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            loading: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Arc<SchemaSnapshot>> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn insert(&self, key: CacheKey, snapshot: SchemaSnapshot) -> Arc<SchemaSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.entries.write().await.insert(key, snapshot.clone());
        snapshot
    }

    /// Return the cached snapshot or run `loader` once for this key
    pub async fn get_or_load<F, Fut, E>(&self, key: &CacheKey, loader: F) -> Result<Arc<SchemaSnapshot>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SchemaSnapshot, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }

        let key_lock = {
            let mut loading = self.loading.lock().await;
            loading
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = key_lock.lock().await;

        // Another request may have finished the load while we waited
        if let Some(hit) = self.get(key).await {
            self.release(key, &key_lock).await;
            return Ok(hit);
        }

        let loaded = loader().await;
        let result = match loaded {
            Ok(snapshot) => {
                tracing::info!(
                    "Cached metadata for {}: {} tables",
                    key,
                    snapshot.tables.len()
                );
                Ok(self.insert(key.clone(), snapshot).await)
            }
            Err(e) => Err(e),
        };
        self.release(key, &key_lock).await;
        result
    }

    /// Forget the load lock of `key` unless a newer one replaced it
    async fn release(&self, key: &CacheKey, key_lock: &Arc<Mutex<()>>) {
        let mut loading = self.loading.lock().await;
        if loading.get(key).is_some_and(|l| Arc::ptr_eq(l, key_lock)) {
            loading.remove(key);
        }
    }

    /// Drop one entry; true if it was present
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            tracing::info!("Invalidated cached metadata for {}", key);
        }
        removed
    }

    /// Drop every entry of an environment; returns how many were removed
    pub async fn invalidate_environment(&self, environment: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| k.environment != environment);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::info!("Invalidated {} cached schemas for {}", removed, environment);
        }
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let mut environments: Vec<&str> = entries.keys().map(|k| k.environment.as_str()).collect();
        environments.sort_unstable();
        environments.dedup();
        CacheStats {
            entries: entries.len(),
            environments: environments.len(),
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}
