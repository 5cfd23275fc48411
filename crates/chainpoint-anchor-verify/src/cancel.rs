//! Cancellation scope threaded through a whole verification call.

use std::future::Future;

use tokio::sync::watch;

use crate::error::VerificationError;

/// Owning side of a cancellation scope
#[derive(Debug)]
pub struct CancelHandle {
    tx_cancel: watch::Sender<bool>,
}

/// Observing side of a cancellation scope, cheap to clone and share between tasks
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx_cancel: watch::Receiver<bool>,
}

/// Create a fresh, not yet canceled scope
pub fn cancel_scope() -> (CancelHandle, CancelToken) {
    let (tx_cancel, rx_cancel) = watch::channel(false);
    (CancelHandle { tx_cancel }, CancelToken { rx_cancel })
}

impl CancelHandle {
    /// Cancel the scope. Idempotent.
    pub fn cancel(&self) {
        self.tx_cancel.send_replace(true);
    }
}

impl CancelToken {
    /// A token that is never canceled
    pub fn never() -> Self {
        let (_, rx_cancel) = watch::channel(false);
        Self { rx_cancel }
    }

    pub fn is_canceled(&self) -> bool {
        *self.rx_cancel.borrow()
    }

    /// Resolves once the scope is canceled. Pends forever if the handle is gone.
    pub async fn canceled(&self) {
        let mut rx_cancel = self.rx_cancel.clone();
        if rx_cancel.wait_for(|canceled| *canceled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Drive `fut` unless the scope is canceled first, in which case `fut` is dropped
    /// and [`VerificationError::Canceled`] is returned.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, VerificationError>
    where
        F: Future<Output = Result<T, VerificationError>>,
    {
        if self.is_canceled() {
            return Err(VerificationError::Canceled);
        }
        tokio::select! {
            biased;
            _ = self.canceled() => Err(VerificationError::Canceled),
            res = fut => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes_when_not_canceled() {
        let (_handle, token) = cancel_scope();
        let res = token.run(async { Ok::<_, VerificationError>(7) }).await;
        assert_eq!(res.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_run_fails_fast_when_already_canceled() {
        let (handle, token) = cancel_scope();
        handle.cancel();
        let res = token
            .run(async { Ok::<_, VerificationError>("completed") })
            .await;
        assert!(matches!(res, Err(VerificationError::Canceled)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_future() {
        let (handle, token) = cancel_scope();
        let task = tokio::spawn(async move {
            token
                .run(std::future::pending::<Result<(), VerificationError>>())
                .await
        });
        handle.cancel();
        let res = task.await.unwrap();
        assert!(matches!(res, Err(VerificationError::Canceled)));
    }

    #[tokio::test]
    async fn test_clone_observes_same_scope() {
        let (handle, token) = cancel_scope();
        let observer = token.clone();
        handle.cancel();
        assert!(observer.is_canceled());
        observer.canceled().await;
    }

    #[tokio::test]
    async fn test_never_token_does_not_fire() {
        let token = CancelToken::never();
        assert!(!token.is_canceled());
        let res = token.run(async { Ok::<_, VerificationError>("done") }).await;
        assert_eq!(res.unwrap(), "done");
    }
}
