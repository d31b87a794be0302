//! Background staleness-sweep scheduling.
//!
//! [`EvictionScheduler`] owns a `tokio::spawn`ed task that periodically calls
//! [`GenerationalStore::sweep`] on a dedicated timer, independent of
//! request-handling tasks. The sweep period is half the configured staleness
//! timeout (see [`CacheConfig::sweep_interval`](crate::config::CacheConfig::sweep_interval)):
//! an entry must sit untouched through two consecutive sweeps before it is
//! evicted, covering roughly the full timeout.
//!
//! The task stops via a [`CancellationToken`]; [`stop`](EvictionScheduler::stop)
//! awaits the task handle, so no sweep fires after `stop` returns. That
//! guarantee is what makes `reconfigure`/`deactivate` sequencing (and test
//! teardown) safe.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::GenerationalStore;

/// Periodic driver of [`GenerationalStore::sweep`].
pub struct EvictionScheduler {
    cancel: CancellationToken,
    /// Wrapped in `Mutex` so `stop()` can take ownership via `&self`.
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EvictionScheduler {
    /// Starts sweeping `store` every `timeout / 2`.
    ///
    /// A zero `timeout` disables periodic sweeping entirely — no task is
    /// spawned and [`stop`](Self::stop) is still safe to call. Capacity
    /// eviction inside `insert` is unaffected.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context when `timeout` is
    /// non-zero.
    pub fn start(store: Arc<GenerationalStore>, timeout: Duration) -> Self {
        let cancel = CancellationToken::new();
        if timeout.is_zero() {
            return Self { cancel, handle: Mutex::new(None) };
        }

        let interval = timeout / 2;
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; consume it so we start
            // with a full interval wait.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("eviction scheduler shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        store.sweep();
                    }
                }
            }
        });

        Self { cancel, handle: Mutex::new(Some(handle)) }
    }

    /// Stops the periodic sweep task.
    ///
    /// Idempotent and safe to call even if no task was ever started. The
    /// task has fully terminated by the time this returns — no sweep fires
    /// afterwards.
    pub async fn stop(&self) {
        self.cancel.cancel();
        // Take the handle so we can await it without holding the lock.
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            // Best-effort wait; if the task panicked, we just log.
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "eviction sweep task panicked");
            }
        }
    }
}
