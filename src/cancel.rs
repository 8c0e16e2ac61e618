//! Cooperative cancellation for fetch functions.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::FetchError;

/// Advisory cancellation signal handed to a fetch function.
///
/// Cancelling only flips the signal. A fetch function honors it by polling
/// [`CancellationToken::check`], awaiting [`CancellationToken::cancelled`], or
/// wrapping its work in [`CancellationToken::run_until_cancelled`]. A fetch that
/// ignores the token runs to completion.
///
/// Clone is cheap; all clones observe the same signal. Once cancelled, a token
/// stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. The first reason wins; later calls keep it.
    pub fn cancel(&self, reason: Option<String>) {
        {
            let mut slot = self.reason.lock();
            if !self.inner.is_cancelled() && slot.is_none() {
                *slot = reason;
            }
        }
        self.inner.cancel();
    }

    /// Returns `true` once [`CancellationToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Reason given at cancellation, if any.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// `Err(FetchError::Cancelled)` if cancelled, `Ok(())` otherwise.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_cancelled() {
            Err(self.to_error())
        } else {
            Ok(())
        }
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    /// Race `fut` against the cancellation signal.
    ///
    /// Returns the output of `fut` if it finishes first, and
    /// `FetchError::Cancelled` if the token is (or already was) cancelled.
    pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output, FetchError> {
        tokio::select! {
            biased;
            _ = self.inner.cancelled() => Err(self.to_error()),
            output = fut => Ok(output),
        }
    }

    fn to_error(&self) -> FetchError {
        FetchError::cancelled(self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_keeps_first_reason() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());

        token.cancel(Some("first".into()));
        token.cancel(Some("second".into()));

        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("first"));
        assert!(token.check().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_clones_share_signal() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel(None);
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), None);
    }

    #[tokio::test]
    async fn test_run_until_cancelled_completes() {
        let token = CancellationToken::new();
        let result = token.run_until_cancelled(async { 7 }).await;
        assert_eq!(result.ok(), Some(7));
    }

    #[tokio::test]
    async fn test_run_until_cancelled_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel(Some("stop".into()));
        let result = token
            .run_until_cancelled(std::future::pending::<()>())
            .await;
        match result {
            Err(FetchError::Cancelled { reason }) => assert_eq!(reason.as_deref(), Some("stop")),
            other => panic!("Expected Cancelled, got {:?}", other),
        }
    }
}
