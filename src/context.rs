//! Cancellation and timeout bounds for driver calls.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounds every prepare/exec/query/begin/commit/rollback call of a session.
///
/// The timeout applies to each driver call separately. Cancelling the
/// token aborts the call in flight and every later one.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ExecContext {
    /// Context with no timeout and a fresh, never-cancelled token.
    pub fn background() -> Self {
        Self::default()
    }

    /// Set a per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use `token` for cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Per-call timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Check if the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` to completion unless cancelled or timed out first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let bounded = async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Error::Cancelled),
                res = fut => res,
            }
        };

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, bounded)
                .await
                .map_err(|_| Error::Timeout { timeout })?,
            None => bounded.await,
        }
    }
}
