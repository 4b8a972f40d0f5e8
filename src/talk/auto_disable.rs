//! Auto-disable timer for wake-activated conversations
//!
//! The timer exists only while the conversation was activated by the wake
//! phrase. Each armed timer gets a fresh id; an expiry whose id no longer
//! matches the armed one is ignored, so a superseded timer that already
//! woke up cannot turn the conversation off.

use tokio::task::JoinHandle;

struct ArmedTimer {
    id: u64,
    handle: JoinHandle<()>,
}

/// Timer state owned by the runtime
#[derive(Default)]
pub(crate) struct AutoDisable {
    activated_by_wake: bool,
    timer: Option<ArmedTimer>,
    next_id: u64,
}

impl AutoDisable {
    /// Whether the current conversation was started by the wake phrase
    pub(crate) const fn activated_by_wake(&self) -> bool {
        self.activated_by_wake
    }

    /// Whether a timer is pending
    pub(crate) const fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Set the activation flag; clearing it cancels any pending timer
    pub(crate) fn set_activated_by_wake(&mut self, by_wake: bool) {
        self.activated_by_wake = by_wake;
        if !by_wake {
            self.clear();
        }
    }

    /// Arm a new timer, replacing any pending one
    ///
    /// `spawn` receives the timer id and returns the sleeping task. Returns
    /// `None` without spawning when the conversation was not wake-activated.
    pub(crate) fn arm<F>(&mut self, spawn: F) -> Option<u64>
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        if !self.activated_by_wake {
            return None;
        }

        self.clear();
        self.next_id += 1;
        let id = self.next_id;
        self.timer = Some(ArmedTimer {
            id,
            handle: spawn(id),
        });
        Some(id)
    }

    /// Cancel the pending timer, if any
    pub(crate) fn clear(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
            tracing::debug!(id = timer.id, "auto-disable timer cleared");
        }
    }

    /// Claim an expiry: true only for the currently armed timer
    ///
    /// The timer is dropped without aborting, since the caller is that
    /// timer's own task.
    pub(crate) fn take_expired(&mut self, id: u64) -> bool {
        match &self.timer {
            Some(timer) if timer.id == id => {
                self.timer = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future;

    use super::*;

    fn pending_task(_id: u64) -> JoinHandle<()> {
        tokio::spawn(future::pending())
    }

    #[tokio::test]
    async fn test_arm_requires_wake_activation() {
        let mut state = AutoDisable::default();
        assert_eq!(state.arm(pending_task), None);
        assert!(!state.is_armed());

        state.set_activated_by_wake(true);
        assert_eq!(state.arm(pending_task), Some(1));
        assert!(state.is_armed());
    }

    #[tokio::test]
    async fn test_clearing_flag_cancels_timer() {
        let mut state = AutoDisable::default();
        state.set_activated_by_wake(true);
        state.arm(pending_task);

        state.set_activated_by_wake(false);
        assert!(!state.is_armed());
        assert!(!state.activated_by_wake());
    }

    #[tokio::test]
    async fn test_superseded_expiry_ignored() {
        let mut state = AutoDisable::default();
        state.set_activated_by_wake(true);
        let first = state.arm(pending_task).unwrap();
        let second = state.arm(pending_task).unwrap();

        assert!(!state.take_expired(first));
        assert!(state.is_armed());
        assert!(state.take_expired(second));
        assert!(!state.is_armed());
        assert!(!state.take_expired(second));
    }

    #[tokio::test]
    async fn test_clear_aborts_task() {
        let mut state = AutoDisable::default();
        state.set_activated_by_wake(true);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        state.arm(move |_| {
            tokio::spawn(async move {
                future::pending::<()>().await;
                drop(tx);
            })
        });
        state.clear();

        // Aborting drops the task's captures, closing the channel
        assert!(rx.await.is_err());
    }
}
