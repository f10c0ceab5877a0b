//! Shared cache state and the readiness signal.

use tokio::sync::{watch, RwLock};

/// The value currently held by a [`crate::RefreshCache`], plus the
/// validators needed to build the next conditional request.
pub(crate) struct CacheState<V> {
    pub(crate) value: Option<V>,
    pub(crate) etag: String,
    pub(crate) last_modified: String,
}

impl<V> Default for CacheState<V> {
    fn default() -> Self {
        Self {
            value: None,
            etag: String::new(),
            last_modified: String::new(),
        }
    }
}

/// Async-aware, readers-preferring guard around a [`CacheState`].
pub(crate) struct CacheEntry<V> {
    state: RwLock<CacheState<V>>,
}

impl<V: Clone> CacheEntry<V> {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Non-blocking snapshot: the current value and whether it has ever
    /// been populated.
    pub(crate) async fn get(&self) -> (Option<V>, bool) {
        let guard = self.state.read().await;
        let ok = guard.value.is_some();
        (guard.value.clone(), ok)
    }

    pub(crate) async fn validators(&self) -> (String, String) {
        let guard = self.state.read().await;
        (guard.etag.clone(), guard.last_modified.clone())
    }

    pub(crate) async fn replace(&self, value: V, etag: String, last_modified: String) {
        let mut guard = self.state.write().await;
        guard.value = Some(value);
        guard.etag = etag;
        guard.last_modified = last_modified;
    }
}

/// A one-shot "has this ever succeeded" signal, closed exactly once: the
/// first time a successful response (200 or 304) is fully processed.
///
/// Rust stand-in for a closable channel: the sender fires once via
/// [`tokio::sync::watch`], and readers either poll [`Ready::is_ready`] or
/// `await` [`Ready::ready`].
pub struct Ready {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Ready {
    pub(crate) fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    pub(crate) fn fire(&self) {
        // `send_if_modified` keeps this idempotent: later calls after the
        // first success are silent no-ops instead of waking waiters again.
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        });
    }

    /// Non-blocking check: has the cache ever completed a successful cycle?
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until the cache completes its first successful cycle. Returns
    /// immediately if it already has.
    pub async fn ready(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}
