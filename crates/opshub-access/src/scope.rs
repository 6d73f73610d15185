//! Request scopes: cancellation and deadlines for managed cluster calls

use std::future::Future;
use std::time::Duration;

use opshub_common::ApiResult;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{AbortReason, Error};

/// Cancellation and deadline shared by every cluster call of one request
///
/// Only calls into a managed cluster are wrapped with [`RequestScope::run`].
/// Ledger writes run unguarded once the cluster call they record returned.
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestScope {
    /// A scope with no deadline that is never cancelled unless asked to
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Replace the cancellation token, e.g. with a server shutdown token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancel every outstanding and future call in this scope
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The cancellation token, for callers that want to link child work
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `fut` unless the scope ends first.
    ///
    /// The future's own output is returned untouched so callers can inspect
    /// the cluster response; the outer `Err` only reports an abort. On abort
    /// the future is dropped, which cancels the in-flight request.
    pub async fn run<F>(&self, operation: &str, fut: F) -> Result<F::Output, Error>
    where
        F: Future,
    {
        if let Some(reason) = self.expired() {
            return Err(Self::aborted(operation, reason));
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Self::aborted(operation, AbortReason::Cancelled)),
            _ = Self::until(self.deadline) => {
                Err(Self::aborted(operation, AbortReason::DeadlineExceeded))
            }
            out = fut => Ok(out),
        }
    }

    /// Run a cluster call, reporting its failure as [`Error::UpstreamUnavailable`]
    pub async fn call<T, F>(&self, operation: &str, fut: F) -> Result<T, Error>
    where
        F: Future<Output = ApiResult<T>>,
    {
        self.run(operation, fut)
            .await?
            .map_err(|e| Error::upstream(operation, e))
    }

    fn expired(&self) -> Option<AbortReason> {
        if self.cancel.is_cancelled() {
            Some(AbortReason::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(AbortReason::DeadlineExceeded)
        } else {
            None
        }
    }

    async fn until(deadline: Option<Instant>) {
        match deadline {
            Some(d) => tokio::time::sleep_until(d).await,
            None => std::future::pending::<()>().await,
        }
    }

    fn aborted(operation: &str, reason: AbortReason) -> Error {
        debug!(operation, %reason, "cluster call aborted");
        Error::Aborted {
            operation: operation.to_string(),
            reason,
        }
    }
}
