//! One-shot completion signal.
//!
//! A [`CompletionSignal`] starts out pending and settles at most once, either
//! resolved with a value or rejected with a reason. Any number of handles can
//! wait on it, including handles that start waiting after it has settled.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Settlement status of a [`CompletionSignal`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Status<T, E> {
    Pending,
    Resolved(T),
    Rejected(E),
}

impl<T, E> Status<T, E> {
    fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// A settle-once notifier with multi-waiter fan-out.
///
/// Cloning a signal yields another handle onto the same underlying state.
pub struct CompletionSignal<T, E> {
    tx: Arc<watch::Sender<Status<T, E>>>,
}

impl<T, E> Clone for CompletionSignal<T, E> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T, E> Default for CompletionSignal<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for CompletionSignal<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &*self.tx.borrow() {
            Status::Pending => "pending",
            Status::Resolved(_) => "resolved",
            Status::Rejected(_) => "rejected",
        };
        f.debug_struct("CompletionSignal")
            .field("status", &status)
            .finish()
    }
}

impl<T, E> CompletionSignal<T, E> {
    /// Create a new pending signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Status::Pending);
        Self {
            tx: Arc::new(tx),
        }
    }

    /// Resolve the signal with `value`.
    ///
    /// Returns `false` and drops `value` if the signal was already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Status::Resolved(value))
    }

    /// Reject the signal with `reason`.
    ///
    /// Returns `false` and drops `reason` if the signal was already settled.
    pub fn reject(&self, reason: E) -> bool {
        self.settle(Status::Rejected(reason))
    }

    fn settle(&self, outcome: Status<T, E>) -> bool {
        self.tx.send_if_modified(move |status| {
            if !status.is_pending() {
                return false;
            }
            *status = outcome;
            true
        })
    }

    /// Whether the signal has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(*self.tx.borrow(), Status::Resolved(_))
    }

    /// Whether the signal has been rejected.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(*self.tx.borrow(), Status::Rejected(_))
    }

    /// Whether the signal has left the pending state.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.tx.borrow().is_pending()
    }

    /// Wait until the signal settles either way.
    ///
    /// Completes on the first poll when the signal is already settled.
    pub async fn settled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|status| !status.is_pending()).await;
    }
}

impl<T: Clone, E: Clone> CompletionSignal<T, E> {
    /// Current outcome, or `None` while pending.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<T, E>> {
        match &*self.tx.borrow() {
            Status::Pending => None,
            Status::Resolved(value) => Some(Ok(value.clone())),
            Status::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    /// Wait for settlement and return the resolved value.
    ///
    /// Yields `None` when the signal is rejected instead.
    pub async fn resolution(&self) -> Option<T> {
        self.wait().await.ok()
    }

    /// Wait for settlement and return the rejection reason.
    ///
    /// Yields `None` when the signal is resolved instead.
    pub async fn rejection(&self) -> Option<E> {
        self.wait().await.err()
    }

    /// Wait for settlement, surfacing a rejection as `Err`.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason if the signal was rejected.
    pub async fn wait(&self) -> Result<T, E> {
        loop {
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            self.settled().await;
        }
    }
}
