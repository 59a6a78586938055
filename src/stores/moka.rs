use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

use crate::entry::Entry;
use crate::error::StoreError;
use crate::store::Store;

/// Configuration for MokaStore.
#[derive(Debug, Clone)]
pub struct MokaStoreConfig {
    /// Maximum number of entries the cache can hold.
    pub max_capacity: u64,

    /// Time to live: entries are dropped after this duration from insertion.
    /// `None` means entries never expire based on time (only by size limit).
    ///
    /// This bounds how long a stale entry can linger as a fallback; the
    /// per-entry freshness ttl is independent and usually much shorter.
    pub time_to_live: Option<Duration>,

    /// Time to idle: entries are dropped if not accessed within this duration.
    /// `None` means entries don't expire based on idle time.
    pub time_to_idle: Option<Duration>,
}

impl Default for MokaStoreConfig {
    fn default() -> Self {
        MokaStoreConfig {
            max_capacity: 10_000,
            time_to_live: None,
            time_to_idle: None,
        }
    }
}

/// High-performance concurrent cache store using Moka.
///
/// MokaStore provides:
/// - Lock-free concurrent access for reads and writes
/// - Automatic background eviction with configurable policies
/// - Predictable performance under load
///
/// Use this store when the key space is large or unbounded and the cache
/// needs a hard capacity limit.
pub struct MokaStore<V>
where
    V: Clone + Send + Sync,
{
    cache: Cache<String, Entry<V>>,
}

impl<V> MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new MokaStore with the given configuration.
    ///
    /// # Example
    /// ```ignore
    /// let config = MokaStoreConfig {
    ///     max_capacity: 10_000,
    ///     time_to_live: Some(Duration::from_secs(300)),
    ///     time_to_idle: Some(Duration::from_secs(60)),
    /// };
    /// let store = MokaStore::new(config);
    /// ```
    pub fn new(config: MokaStoreConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);

        if let Some(ttl) = config.time_to_live {
            builder = builder.time_to_live(ttl);
        }

        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        MokaStore {
            cache: builder.build(),
        }
    }
}

#[async_trait]
impl<V> Store<V> for MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "moka"
    }

    async fn get(&self, key: &str) -> Result<Option<Entry<V>>, StoreError> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &str, entry: Entry<V>) -> Result<(), StoreError> {
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.cache.invalidate(*key).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_remove() {
        let store: MokaStore<String> = MokaStore::new(MokaStoreConfig::default());

        let result = store.get("user:1").await.unwrap();
        assert!(result.is_none());

        let entry = Entry::new("value1".to_string(), Some(60_000));
        store.set("user:1", entry).await.unwrap();

        let result = store.get("user:1").await.unwrap();
        assert_eq!(result.unwrap().value, "value1");

        store.remove(&["user:1"]).await.unwrap();
        assert!(store.get("user:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capacity_bound() {
        let store: MokaStore<u32> = MokaStore::new(MokaStoreConfig {
            max_capacity: 2,
            time_to_live: None,
            time_to_idle: None,
        });

        for i in 0..10u32 {
            store
                .set(&format!("key:{}", i), Entry::new(i, None))
                .await
                .unwrap();
        }
        store.cache.run_pending_tasks().await;

        assert!(store.cache.entry_count() <= 2);
    }
}
