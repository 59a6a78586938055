use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::FetchError;
use crate::generation::CancelSignal;
use crate::orchestrator::{Orchestrator, SharedFetcher};
use crate::store::Store;
use crate::stores::memory::{HashMapStore, HashMapStoreConfig};

/// Options for a resource subscription.
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    /// Cache freshness lifetime. `None` means the entry stays fresh until
    /// explicit invalidation; `Duration::ZERO` means always refetch.
    pub ttl: Option<Duration>,

    /// Re-run the fetch when [`ResourceCache::focus_regained`] fires.
    pub revalidate_on_focus: bool,

    /// Re-run the fetch on a fixed interval while at least one listener
    /// exists. `None` or zero disables the timer.
    pub refresh_interval: Option<Duration>,
}

impl ResourceOptions {
    pub(crate) fn ttl_ms(&self) -> Option<i64> {
        self.ttl.map(|d| d.as_millis() as i64)
    }
}

/// Observable state of a subscribed resource.
///
/// Derived state only: `data` is the last committed value, `error` the last
/// non-cancelled failure, `is_loading` whether a fetch is outstanding. A
/// failed refresh leaves `data` at its last good value.
#[derive(Debug, Clone)]
pub struct ResourceState<V> {
    pub data: Option<V>,
    pub error: Option<FetchError>,
    pub is_loading: bool,
}

impl<V> Default for ResourceState<V> {
    fn default() -> Self {
        ResourceState {
            data: None,
            error: None,
            is_loading: false,
        }
    }
}

/// A keyed resource cache with stale-while-revalidate subscriptions.
///
/// Cloning is cheap and clones share the same store, generation tracker
/// and subscriptions.
pub struct ResourceCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<Orchestrator<V>>,
}

impl<V> Clone for ResourceCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        ResourceCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> ResourceCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a resource cache backed by the given store.
    pub fn new(store: Arc<dyn Store<V>>) -> Self {
        ResourceCache {
            inner: Arc::new(Orchestrator::new(store)),
        }
    }

    /// Create a resource cache backed by a default in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(HashMapStore::new(HashMapStoreConfig::default())))
    }

    /// Subscribe to the resource identified by `key`.
    ///
    /// A fresh cache entry is served immediately without invoking the
    /// fetcher. A stale entry is served immediately while a refetch runs in
    /// the background; a missing entry yields a loading state. Listeners
    /// for the same key share one in-flight fetch.
    ///
    /// `key = None` suspends fetching entirely: the handle stays at
    /// `{data: None, error: None, is_loading: false}` and `mutate` is a
    /// no-op. On a key change, drop the old handle and subscribe again.
    pub async fn subscribe<F, Fut>(
        &self,
        key: Option<&str>,
        fetcher: F,
        options: ResourceOptions,
    ) -> ResourceHandle<V>
    where
        F: Fn(String, CancelSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let Some(key) = key else {
            return ResourceHandle::idle();
        };

        let fetcher: SharedFetcher<V> = Arc::new(
            move |key: String, cancel: CancelSignal| -> BoxFuture<'static, Result<V, FetchError>> {
                Box::pin(fetcher(key, cancel))
            },
        );
        let state_rx = self.inner.subscribe(key, fetcher, &options).await;

        ResourceHandle {
            subscription: Some((self.clone(), key.to_string())),
            state_rx,
            _idle_tx: None,
        }
    }

    /// Injected application-focus trigger. Re-runs the fetch for every key
    /// whose subscribers set [`ResourceOptions::revalidate_on_focus`].
    pub fn focus_regained(&self) {
        self.inner.focus_regained();
    }
}

/// A live subscription to one resource key.
///
/// Dropping the handle unsubscribes; when the last handle for a key is
/// dropped the outstanding fetch is cancelled and the refresh timer torn
/// down, while the cache entry is retained for future subscribers.
pub struct ResourceHandle<V>
where
    V: Clone + Send + Sync + 'static,
{
    subscription: Option<(ResourceCache<V>, String)>,
    state_rx: watch::Receiver<ResourceState<V>>,
    // Keeps the idle channel alive for handles without a key.
    _idle_tx: Option<watch::Sender<ResourceState<V>>>,
}

impl<V> ResourceHandle<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn idle() -> Self {
        let (tx, rx) = watch::channel(ResourceState::default());
        ResourceHandle {
            subscription: None,
            state_rx: rx,
            _idle_tx: Some(tx),
        }
    }

    /// Snapshot of the current resource state.
    pub fn state(&self) -> ResourceState<V> {
        self.state_rx.borrow().clone()
    }

    /// The last committed value, if any.
    pub fn data(&self) -> Option<V> {
        self.state_rx.borrow().data.clone()
    }

    /// The last non-cancelled fetch failure, cleared by the next success.
    pub fn error(&self) -> Option<FetchError> {
        self.state_rx.borrow().error.clone()
    }

    /// Whether a fetch for this key is outstanding.
    pub fn is_loading(&self) -> bool {
        self.state_rx.borrow().is_loading
    }

    /// Wait for the next state change. Returns `false` once the
    /// subscription is gone.
    pub async fn changed(&mut self) -> bool {
        self.state_rx.changed().await.is_ok()
    }

    /// Wait until no fetch is outstanding and return the state.
    ///
    /// A closed channel (subscription gone) yields the last seen state.
    pub async fn settled(&mut self) -> ResourceState<V> {
        let _ = self.state_rx.wait_for(|s| !s.is_loading).await;
        self.state_rx.borrow().clone()
    }

    /// Invalidate the cached entry and force a refetch, bypassing
    /// freshness. Resolves once the refetch settles; failures surface via
    /// [`ResourceState::error`]. No-op on a keyless handle.
    pub async fn mutate(&self) {
        if let Some((cache, key)) = &self.subscription {
            cache.inner.mutate(key).await;
        }
    }
}

impl<V> Drop for ResourceHandle<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some((cache, key)) = self.subscription.take() {
            cache.inner.unsubscribe(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_undefined_key_suspends() {
        let cache: ResourceCache<String> = ResourceCache::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let handle = cache
            .subscribe(
                None,
                move |_key, _cancel| {
                    let calls = calls_clone.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok("never".to_string())
                    }
                },
                ResourceOptions::default(),
            )
            .await;

        let state = handle.state();
        assert!(state.data.is_none());
        assert!(state.error.is_none());
        assert!(!state.is_loading);

        handle.mutate().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fresh_hit_suppresses_fetch() {
        let cache: ResourceCache<String> = ResourceCache::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let mut first = cache
            .subscribe(
                Some("user:1"),
                move |_key, _cancel| {
                    let calls = calls_clone.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok("Alice".to_string())
                    }
                },
                ResourceOptions {
                    ttl: Some(Duration::from_secs(60)),
                    ..Default::default()
                },
            )
            .await;
        let state = first.settled().await;
        assert_eq!(state.data, Some("Alice".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Fresh entry: the second subscriber is served from cache.
        let calls_clone = calls.clone();
        let second = cache
            .subscribe(
                Some("user:1"),
                move |_key, _cancel| {
                    let calls = calls_clone.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok("should not be called".to_string())
                    }
                },
                ResourceOptions {
                    ttl: Some(Duration::from_secs(60)),
                    ..Default::default()
                },
            )
            .await;

        assert!(!second.is_loading());
        assert_eq!(second.data(), Some("Alice".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
