//! Per-request cancellation and deadline handling.

use domains::{DomainError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Carries the caller's cancellation signal and deadline into every
/// storage-bound call.
///
/// Cloning shares the same token, so cancelling any clone cancels all of
/// them.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    budget: Option<Duration>,
}

impl RequestContext {
    /// A context with no deadline. Cancellation still works.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
            budget: Some(timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drives `fut` until it finishes, the context is cancelled, or the
    /// deadline passes. The losing future is dropped, which aborts the
    /// in-flight storage call.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let guarded = async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(DomainError::Cancelled),
                res = fut => res,
            }
        };

        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, guarded)
                .await
                .unwrap_or_else(|_| {
                    Err(DomainError::DeadlineExceeded(self.budget.unwrap_or_default()))
                }),
            None => guarded.await,
        }
    }
}
