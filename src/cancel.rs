//! Cooperative cancellation threaded through the engine.
//!
//! A [`CancelToken`] is a cheap, clonable handle backed by a watch channel.
//! The CLI trips it on Ctrl+C; rate-limiter waits, retry sleeps, worker
//! queue pulls, and in-flight git subprocesses all select against
//! [`CancelToken::cancelled`], so one trigger unwinds every blocking point
//! without leaving half-finished clone jobs unaccounted for.

use std::sync::Arc;
use tokio::sync::watch;

/// Clonable cancellation handle.
///
/// Every clone observes the same flag; cancelling through any clone
/// cancels them all, and the flag never resets.
#[derive(Debug, Clone)]
pub struct CancelToken {
    observer: watch::Receiver<bool>,
    trigger: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        let (trigger, observer) = watch::channel(false);
        Self {
            observer,
            trigger: Arc::new(trigger),
        }
    }

    /// Trip the flag. Idempotent; wakes every task parked in
    /// [`CancelToken::cancelled`].
    pub fn cancel(&self) {
        self.trigger.send_replace(true);
    }

    /// Whether the flag has been tripped.
    pub fn is_cancelled(&self) -> bool {
        *self.observer.borrow()
    }

    /// Resolve once the flag trips. Returns immediately if it already has.
    pub async fn cancelled(&self) {
        let mut observer = self.observer.clone();
        // This token keeps the trigger alive, so the channel cannot close
        // out from under the wait.
        let _ = observer.wait_for(|cancelled| *cancelled).await;
    }
}
