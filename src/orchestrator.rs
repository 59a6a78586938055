//! Fetch orchestration: issues requests, gates commits by generation,
//! owns per-key refresh timers and the focus revalidation trigger.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::entry::Entry;
use crate::error::FetchError;
use crate::generation::{CancelSignal, FetchTicket, GenerationTracker};
use crate::resource::{ResourceOptions, ResourceState};
use crate::store::Store;
use crate::utils::now_ms;

/// Type-erased fetcher shared between the subscribe path, refresh timers,
/// focus revalidation and `mutate`.
pub(crate) type SharedFetcher<V> =
    Arc<dyn Fn(String, CancelSignal) -> BoxFuture<'static, Result<V, FetchError>> + Send + Sync>;

/// Per-key subscription bookkeeping.
struct KeyState<V> {
    fetcher: SharedFetcher<V>,
    ttl_ms: Option<i64>,
    revalidate_on_focus: bool,
    listeners: usize,
    state_tx: watch::Sender<ResourceState<V>>,
    refresh_task: Option<JoinHandle<()>>,
}

pub(crate) struct Orchestrator<V>
where
    V: Clone + Send + Sync,
{
    store: Arc<dyn Store<V>>,
    tracker: GenerationTracker,
    keys: Mutex<HashMap<String, KeyState<V>>>,
    /// Serializes the check-then-commit step so an attempt that passed the
    /// generation check cannot be overtaken by a newer attempt's write.
    commit_lock: tokio::sync::Mutex<()>,
}

impl<V> Orchestrator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(store: Arc<dyn Store<V>>) -> Self {
        Orchestrator {
            store,
            tracker: GenerationTracker::new(),
            keys: Mutex::new(HashMap::new()),
            commit_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Register a listener for `key` and return its state channel.
    ///
    /// A fresh cache entry is served without touching the fetcher. A stale
    /// or missing entry triggers a fetch unless one is already outstanding
    /// for the key, in which case the new listener joins it.
    pub(crate) async fn subscribe(
        self: &Arc<Self>,
        key: &str,
        fetcher: SharedFetcher<V>,
        options: &ResourceOptions,
    ) -> watch::Receiver<ResourceState<V>> {
        let entry = self.store.get(key).await.ok().flatten();
        let fresh = entry.as_ref().is_some_and(|e| e.is_fresh(now_ms()));

        // Claim the fetch before anything is spawned: a concurrent
        // subscriber for the same key gets `None` here and joins the
        // outstanding attempt instead of issuing a duplicate request.
        let ticket = if fresh {
            None
        } else {
            self.tracker.begin_if_idle(key)
        };
        let in_flight = ticket.is_some() || self.tracker.in_flight(key);

        let rx = {
            let mut keys = self.keys.lock();
            let state = keys.entry(key.to_string()).or_insert_with(|| KeyState {
                fetcher: Arc::clone(&fetcher),
                ttl_ms: options.ttl_ms(),
                revalidate_on_focus: options.revalidate_on_focus,
                listeners: 0,
                state_tx: watch::Sender::new(ResourceState {
                    data: entry.map(|e| e.value),
                    error: None,
                    is_loading: in_flight,
                }),
                refresh_task: None,
            });

            state.listeners += 1;
            // Latest subscriber wins for shared per-key settings.
            state.fetcher = fetcher;
            state.ttl_ms = options.ttl_ms();
            state.revalidate_on_focus = options.revalidate_on_focus;

            if in_flight {
                state.state_tx.send_modify(|s| s.is_loading = true);
            }

            if let Some(every) = options.refresh_interval.filter(|d| !d.is_zero())
                && state.refresh_task.is_none()
            {
                state.refresh_task = Some(self.spawn_refresh(key.to_string(), every));
            }

            state.state_tx.subscribe()
        };

        if let Some(ticket) = ticket {
            tokio::spawn(Arc::clone(self).run_attempt(key.to_string(), ticket));
        }

        rx
    }

    /// Drop one listener for `key`; the last drop cancels the outstanding
    /// fetch, tears down the refresh timer and releases bookkeeping. The
    /// cache entry itself is retained for future subscribers.
    pub(crate) fn unsubscribe(&self, key: &str) {
        let mut keys = self.keys.lock();
        let Some(state) = keys.get_mut(key) else {
            return;
        };

        state.listeners -= 1;
        if state.listeners > 0 {
            return;
        }

        if let Some(task) = state.refresh_task.take() {
            task.abort();
        }
        self.tracker.cancel(key);
        self.tracker.release(key);
        keys.remove(key);
        trace!(key = %key, "last listener unsubscribed");
    }

    /// Invalidate the cache entry and force a refetch, bypassing freshness.
    /// Resolves once that fetch has settled (or been superseded).
    pub(crate) async fn mutate(self: &Arc<Self>, key: &str) {
        if !self.keys.lock().contains_key(key) {
            return;
        }
        if let Err(error) = self.store.remove(&[key]).await {
            warn!(key = %key, %error, "invalidate failed");
        }
        Arc::clone(self).run(key.to_string()).await;
    }

    /// Injected focus-regain trigger: re-run every key whose subscribers
    /// opted into focus revalidation.
    pub(crate) fn focus_regained(self: &Arc<Self>) {
        let due: Vec<String> = self
            .keys
            .lock()
            .iter()
            .filter(|(_, s)| s.revalidate_on_focus && s.listeners > 0)
            .map(|(k, _)| k.clone())
            .collect();

        for key in due {
            debug!(key = %key, "focus revalidation");
            tokio::spawn(Arc::clone(self).run(key));
        }
    }

    /// Begin a fresh (superseding) attempt for `key` and drive it to
    /// settlement. Used by `mutate`, refresh ticks and focus revalidation;
    /// the subscribe path claims its ticket up front via `begin_if_idle`
    /// and calls [`Self::run_attempt`] directly.
    async fn run(self: Arc<Self>, key: String) {
        let ticket = self.tracker.begin(&key);
        self.run_attempt(key, ticket).await;
    }

    /// Perform one fetch attempt for `key` and commit the outcome iff the
    /// attempt is still current when it settles.
    ///
    /// The fetch races against its cancel signal; a settled result is then
    /// re-checked against the generation tracker, which stays the
    /// authoritative gate even for a fetch that ignored the signal.
    async fn run_attempt(self: Arc<Self>, key: String, ticket: FetchTicket) {
        let (fetcher, ttl_ms) = {
            let keys = self.keys.lock();
            match keys.get(&key) {
                Some(state) => (Arc::clone(&state.fetcher), state.ttl_ms),
                None => {
                    // Key released before the attempt started; settle the
                    // ticket so later subscribers are not blocked from
                    // claiming a fetch.
                    self.tracker.end(&key, ticket.generation);
                    return;
                }
            }
        };
        {
            let keys = self.keys.lock();
            if let Some(state) = keys.get(&key) {
                state.state_tx.send_modify(|s| s.is_loading = true);
            }
        }
        debug!(key = %key, generation = ticket.generation, "fetch started");

        let fetch = (fetcher)(key.clone(), ticket.cancel.clone());
        let outcome = tokio::select! {
            result = fetch => Some(result),
            () = ticket.cancel.clone().cancelled() => None,
        };

        let _commit = self.commit_lock.lock().await;
        if !self.tracker.is_current(&key, ticket.generation) {
            trace!(key = %key, generation = ticket.generation, "superseded fetch discarded");
            self.tracker.end(&key, ticket.generation);
            return;
        }

        match outcome {
            Some(Ok(value)) => {
                let entry = Entry::new(value.clone(), ttl_ms);
                if let Err(error) = self.store.set(&key, entry).await {
                    warn!(key = %key, %error, "cache write failed");
                }
                let keys = self.keys.lock();
                if let Some(state) = keys.get(&key) {
                    state.state_tx.send_modify(|s| {
                        s.data = Some(value);
                        s.error = None;
                        s.is_loading = false;
                    });
                }
                trace!(key = %key, generation = ticket.generation, "fetch committed");
            }
            Some(Err(error)) if !error.is_cancelled() => {
                // Stale-on-error: the cache and last good data are untouched.
                warn!(key = %key, %error, "fetch failed");
                let keys = self.keys.lock();
                if let Some(state) = keys.get(&key) {
                    state.state_tx.send_modify(|s| {
                        s.error = Some(error);
                        s.is_loading = false;
                    });
                }
            }
            // Cancellation is absorbed; the outcome stays unobservable.
            Some(Err(_)) | None => {}
        }

        self.tracker.end(&key, ticket.generation);
    }

    fn spawn_refresh(self: &Arc<Self>, key: String, every: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; subscribing already fetched.
            interval.tick().await;
            loop {
                interval.tick().await;
                Arc::clone(&this).run(key.clone()).await;
            }
        })
    }
}
