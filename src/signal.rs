//! Wake signals and the global stop signal.
//!
//! Loops never receive per-notification payloads. They are woken by binary,
//! edge-triggered flags and always rescan full current state, so many raises
//! before a wait coalesce into a single wake.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{watch, Notify};

/// Edge-triggered wake flag.
#[derive(Debug, Default)]
pub struct WakeSignal {
    raised: AtomicBool,
    raises: AtomicU64,
    notify: Notify,
}

impl WakeSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes the waiter, if any.
    pub fn raise(&self) {
        self.raises.fetch_add(1, Ordering::Relaxed);
        self.raised.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Clears a pending wake without waiting.
    pub fn clear(&self) {
        self.raised.store(false, Ordering::Release);
    }

    /// Whether a raise is pending.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Total number of `raise` calls since creation.
    #[must_use]
    pub fn raise_count(&self) -> u64 {
        self.raises.load(Ordering::Relaxed)
    }

    /// Waits until the flag is raised, then clears it.
    ///
    /// Returns immediately when a raise is already pending.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a raise between check and await is not lost.
            notified.as_mut().enable();
            if self.raised.swap(false, Ordering::AcqRel) {
                return;
            }
            notified.await;
        }
    }

    /// Waits for a raise, bounded by `timeout`.
    ///
    /// Returns true if woken by a raise, false on timeout. The flag is
    /// cleared either way.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        let woken = tokio::time::timeout(timeout, self.wait()).await.is_ok();
        self.clear();
        woken
    }
}

/// Owner side of the global stop signal.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Requests a stop. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether stop was requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new observer of this stop signal.
    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the global stop signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether stop was requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested.
    ///
    /// A dropped `Shutdown` owner counts as a stop request.
    pub async fn requested(&mut self) {
        // Err means the owner is gone, which also ends the wait.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
