use std::future::{pending, Future};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::DomainError;

/// Caller-owned deadline and cancellation signal for one pipeline call.
///
/// Every network operation of the call goes through [`CallContext::run`], so an
/// expired or cancelled context aborts whatever is in flight.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancelled: Option<watch::Receiver<bool>>,
}

/// Cancels every [`CallContext`] derived from the same `cancellable` call.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl CallContext {
    /// A context that never expires and cannot be cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Keeps the earlier of the current and the given deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        self.cancelled = Some(receiver);
        (self, CancelHandle { sender })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .map(|receiver| *receiver.borrow())
            .unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    /// Drives `future` unless the context is cancelled or its deadline passes
    /// first, in which case the future is dropped and an error is returned.
    pub async fn run<T, F>(&self, operation: &str, future: F) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        if self.is_cancelled() {
            return Err(DomainError::cancelled(operation));
        }
        if self.is_expired() {
            return Err(DomainError::deadline_exceeded(operation));
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.wait_cancelled() => Err(DomainError::cancelled(operation)),
            _ = deadline => Err(DomainError::deadline_exceeded(operation)),
            result = future => result,
        }
    }

    async fn wait_cancelled(&self) {
        let Some(receiver) = &self.cancelled else {
            return pending().await;
        };
        let mut receiver = receiver.clone();
        // A dropped handle can no longer cancel.
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            pending::<()>().await;
        }
    }
}
