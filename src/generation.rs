//! Per-key generation counters and cancel signals.
//!
//! UI keys change rapidly (parameter edits, remounts, tab switches), so a
//! slow response for an earlier request can settle after a newer request
//! for the same key has started. Each fetch attempt is tagged with a
//! monotonically increasing generation; only the latest generation for a
//! key may commit its result. Cancellation is signalled separately through
//! a watch channel wired into the fetcher, but generation comparison stays
//! the authoritative gate at commit time.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;

/// A cooperative cancellation signal handed to fetchers.
///
/// `is_cancelled` can be polled cheaply; `cancelled` resolves once the
/// fetch has been superseded or abandoned. A fetcher is free to ignore it;
/// the orchestrator races the fetch against the signal and the generation
/// gate discards the result either way.
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    fn new(rx: watch::Receiver<bool>) -> Self {
        CancelSignal { rx }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(mut self) {
        // A dropped sender means the key's bookkeeping was released, which
        // also counts as cancellation.
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// A right-to-commit for one fetch attempt.
pub struct FetchTicket {
    pub generation: u64,
    pub cancel: CancelSignal,
}

struct KeyGenerations {
    latest: u64,
    outstanding: Option<u64>,
    cancel_tx: watch::Sender<bool>,
}

/// Tracks the most recent outstanding fetch attempt per key.
#[derive(Default)]
pub struct GenerationTracker {
    keys: Mutex<HashMap<String, KeyGenerations>>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new fetch attempt for `key`.
    ///
    /// Increments the generation, signals cancellation to any prior attempt
    /// and invalidates its right to commit.
    pub fn begin(&self, key: &str) -> FetchTicket {
        let mut keys = self.keys.lock();
        Self::begin_locked(&mut keys, key)
    }

    /// Start a new fetch attempt only if none is outstanding for `key`.
    ///
    /// The check and the begin happen under one lock, so two racing
    /// subscribers cannot both claim the fetch; the loser joins the
    /// winner's attempt instead of duplicating it.
    pub fn begin_if_idle(&self, key: &str) -> Option<FetchTicket> {
        let mut keys = self.keys.lock();
        if keys
            .get(key)
            .is_some_and(|state| state.outstanding.is_some())
        {
            return None;
        }
        Some(Self::begin_locked(&mut keys, key))
    }

    fn begin_locked(keys: &mut HashMap<String, KeyGenerations>, key: &str) -> FetchTicket {
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let generation = match keys.get_mut(key) {
            Some(state) => {
                let _ = state.cancel_tx.send(true);
                state.latest += 1;
                state.outstanding = Some(state.latest);
                state.cancel_tx = cancel_tx;
                state.latest
            }
            None => {
                keys.insert(
                    key.to_string(),
                    KeyGenerations {
                        latest: 1,
                        outstanding: Some(1),
                        cancel_tx,
                    },
                );
                1
            }
        };

        FetchTicket {
            generation,
            cancel: CancelSignal::new(cancel_rx),
        }
    }

    /// True only if no newer `begin(key)` has occurred since `generation`.
    ///
    /// A released key always answers `false`, so a very late commit for a
    /// key nobody watches anymore is discarded too.
    pub fn is_current(&self, key: &str, generation: u64) -> bool {
        self.keys
            .lock()
            .get(key)
            .is_some_and(|state| state.latest == generation)
    }

    /// Release bookkeeping once the fetch of `generation` has settled,
    /// regardless of whether it was current.
    pub fn end(&self, key: &str, generation: u64) {
        let mut keys = self.keys.lock();
        if let Some(state) = keys.get_mut(key)
            && state.outstanding == Some(generation)
        {
            state.outstanding = None;
        }
    }

    /// Whether a fetch attempt for `key` is currently outstanding.
    pub fn in_flight(&self, key: &str) -> bool {
        self.keys
            .lock()
            .get(key)
            .is_some_and(|state| state.outstanding.is_some())
    }

    /// Cancel the current attempt and invalidate its right to commit.
    ///
    /// Used when the last listener for a key unsubscribes: the abort signal
    /// and the generation bump are independent, additive safety layers.
    pub fn cancel(&self, key: &str) {
        let mut keys = self.keys.lock();
        if let Some(state) = keys.get_mut(key) {
            let _ = state.cancel_tx.send(true);
            state.latest += 1;
            state.outstanding = None;
        }
    }

    /// Drop all bookkeeping for `key`.
    pub fn release(&self, key: &str) {
        self.keys.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_increments_generation() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin("k");
        let b = tracker.begin("k");
        assert_eq!(a.generation, 1);
        assert_eq!(b.generation, 2);
    }

    #[test]
    fn test_newer_begin_invalidates_older() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin("k");
        assert!(tracker.is_current("k", a.generation));

        let b = tracker.begin("k");
        assert!(!tracker.is_current("k", a.generation));
        assert!(tracker.is_current("k", b.generation));
        assert!(a.cancel.is_cancelled());
        assert!(!b.cancel.is_cancelled());
    }

    #[test]
    fn test_begin_if_idle_joins_outstanding() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin_if_idle("k").expect("no outstanding attempt");
        // A second claim while the first is outstanding must join, not begin.
        assert!(tracker.begin_if_idle("k").is_none());
        assert!(tracker.is_current("k", a.generation));

        tracker.end("k", a.generation);
        assert!(tracker.begin_if_idle("k").is_some());
    }

    #[test]
    fn test_keys_are_isolated() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin("k1");
        let _ = tracker.begin("k2");
        assert!(tracker.is_current("k1", a.generation));
        assert!(!a.cancel.is_cancelled());
    }

    #[test]
    fn test_end_clears_in_flight() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin("k");
        assert!(tracker.in_flight("k"));

        tracker.end("k", a.generation);
        assert!(!tracker.in_flight("k"));
        // end does not grant anyone else the right to commit
        assert!(tracker.is_current("k", a.generation));
    }

    #[test]
    fn test_end_of_superseded_generation_is_harmless() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin("k");
        let b = tracker.begin("k");

        // The superseded attempt settling late must not clear the newer
        // attempt's outstanding marker.
        tracker.end("k", a.generation);
        assert!(tracker.in_flight("k"));

        tracker.end("k", b.generation);
        assert!(!tracker.in_flight("k"));
    }

    #[test]
    fn test_cancel_signals_and_invalidates() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin("k");

        tracker.cancel("k");
        assert!(a.cancel.is_cancelled());
        assert!(!tracker.is_current("k", a.generation));
        assert!(!tracker.in_flight("k"));
    }

    #[test]
    fn test_released_key_discards_late_commits() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin("k");
        tracker.release("k");
        assert!(!tracker.is_current("k", a.generation));
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves_on_supersede() {
        let tracker = GenerationTracker::new();
        let a = tracker.begin("k");
        let waiter = tokio::spawn(a.cancel.clone().cancelled());

        let _ = tracker.begin("k");
        waiter.await.unwrap();
    }
}
