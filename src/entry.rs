use serde::{Deserialize, Serialize};

/// A cache entry containing a value and its freshness window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry<V> {
    /// The cached value.
    pub value: V,

    /// Unix timestamp in milliseconds at which the value was stored.
    pub stored_at: i64,

    /// Freshness window in milliseconds.
    ///
    /// `None` means the entry stays fresh until explicitly invalidated.
    /// `Some(0)` means the entry is never fresh and every read triggers a
    /// refetch (the entry is still readable while the refetch is in flight).
    pub ttl_ms: Option<i64>,
}

impl<V> Entry<V> {
    /// Create a new entry stamped with the current time.
    pub fn new(value: V, ttl_ms: Option<i64>) -> Self {
        Entry {
            value,
            stored_at: crate::utils::now_ms(),
            ttl_ms,
        }
    }

    /// Create an entry with an explicit `stored_at` timestamp.
    pub fn stored_at(value: V, stored_at: i64, ttl_ms: Option<i64>) -> Self {
        Entry {
            value,
            stored_at,
            ttl_ms,
        }
    }

    /// Check if the entry is still fresh at `now_ms`.
    ///
    /// Fresh means `now - stored_at < ttl`, or unconditionally when no ttl
    /// is set. A stale entry is still readable but should trigger a refetch.
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        match self.ttl_ms {
            None => true,
            Some(ttl) => now_ms - self.stored_at < ttl,
        }
    }

    /// Check if the entry is stale (readable, but a refetch is due).
    pub fn is_stale(&self, now_ms: i64) -> bool {
        !self.is_fresh(now_ms)
    }
}
