//! Single-slot debounce gate
//!
//! OS watchers commonly fire several raw events for one logical save
//! (write + metadata update, or delete + recreate). The gate collapses
//! any burst that arrives while a refresh cycle is pending into that
//! one cycle, so the worker is woken at most once per cycle.

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Gate between raw watcher callbacks and the worker loop.
///
/// Invariant: at most one refresh cycle is queued at a time. `signal`
/// is a no-op while `pending` is set, and `pending` is cleared only
/// when the cycle finishes (successfully or not).
pub struct DebounceGate {
    /// Whether a refresh cycle is queued or in flight
    pending: Mutex<bool>,

    /// Single-slot wakeup for the worker loop
    wake: Notify,
}

impl DebounceGate {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            wake: Notify::new(),
        }
    }

    /// Record a raw change notification.
    ///
    /// Returns `true` if this call queued a new refresh cycle, `false`
    /// if one was already pending and the notification was dropped.
    /// Safe to call from any thread; only holds the lock briefly.
    pub fn signal(&self) -> bool {
        let mut pending = self.pending.lock();
        if *pending {
            return false;
        }
        *pending = true;
        self.wake.notify_one();
        true
    }

    /// Clear the pending flag, letting the next notification through.
    ///
    /// Called at the end of every cycle, including failed ones.
    pub fn clear(&self) {
        *self.pending.lock() = false;
    }

    /// Whether a refresh cycle is currently queued or in flight.
    pub fn is_pending(&self) -> bool {
        *self.pending.lock()
    }

    /// Wait for the next wakeup.
    ///
    /// `Notify` stores a single permit, so a wakeup released before the
    /// worker reaches this call is not lost.
    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    /// Release one wakeup without queuing a cycle.
    ///
    /// Used at shutdown to unblock a waiting worker after the closing
    /// flag has been set.
    pub fn wake(&self) {
        self.wake.notify_one();
    }
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_signal_queues_exactly_once() {
        let gate = DebounceGate::new();

        // First signal queues a cycle
        assert!(gate.signal());
        assert!(gate.is_pending());

        // Everything after that is dropped until the cycle clears
        assert!(!gate.signal());
        assert!(!gate.signal());

        gate.clear();
        assert!(!gate.is_pending());

        // Next signal queues again
        assert!(gate.signal());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let gate = DebounceGate::new();
        gate.clear();
        gate.clear();
        assert!(!gate.is_pending());
        assert!(gate.signal());
    }

    #[tokio::test]
    async fn test_wakeup_permit_is_stored() {
        let gate = DebounceGate::new();

        // Signal before anyone waits; the permit must not be lost
        assert!(gate.signal());

        tokio::time::timeout(Duration::from_millis(100), gate.notified())
            .await
            .expect("stored wakeup should complete immediately");
    }

    #[tokio::test]
    async fn test_burst_stores_single_permit() {
        let gate = DebounceGate::new();

        gate.signal();
        gate.signal();
        gate.signal();

        // One permit for the burst
        tokio::time::timeout(Duration::from_millis(100), gate.notified())
            .await
            .expect("first wait should complete");

        // No second permit queued
        let second = tokio::time::timeout(Duration::from_millis(100), gate.notified()).await;
        assert!(second.is_err(), "burst must not queue a second wakeup");
    }
}
