use async_trait::async_trait;

use crate::entry::Entry;
use crate::error::StoreError;

/// A store is a common interface for storing, reading and deleting cache
/// entries under opaque string keys.
///
/// Stores hold plain data. Freshness judgment, fetching and timers live
/// in the orchestration layer; a store must be safely readable from any
/// call site without triggering side effects.
#[async_trait]
pub trait Store<V>: Send + Sync
where
    V: Clone + Send + Sync,
{
    /// A name for tracing.
    ///
    /// # Example
    /// - "hashmap"
    /// - "moka"
    fn name(&self) -> &'static str;

    /// Return the stored entry for `key`.
    ///
    /// Pure lookup: the response must be `None` for misses and must not
    /// carry a freshness judgment; stale entries are still returned.
    async fn get(&self, key: &str) -> Result<Option<Entry<V>>, StoreError>;

    /// Overwrite the entry for `key`.
    ///
    /// The entry carries its own `stored_at` stamp and ttl; eviction of
    /// no-longer-fresh entries is the store implementation's concern.
    async fn set(&self, key: &str, entry: Entry<V>) -> Result<(), StoreError>;

    /// Remove the key(s) from the store.
    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;

    /// Whether a fresh entry exists for `key` right now.
    async fn is_fresh(&self, key: &str) -> Result<bool, StoreError> {
        let now = crate::utils::now_ms();
        Ok(self
            .get(key)
            .await?
            .is_some_and(|entry| entry.is_fresh(now)))
    }
}
