//! Cooperative cancellation token.
//!
//! A watch channel wrapped in a clonable token. Worker tasks `select!` on
//! [`CancelToken::cancelled`] at suspension points; dropping the handle
//! without cancelling leaves the token forever pending, so uncancelled
//! runs are unaffected.

use tokio::sync::watch;

/// Sender side; cancelling is idempotent.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiver side, cloned into each worker task.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that can never fire. Useful for callers without a
    /// cancellation path.
    pub fn never() -> Self {
        let (_handle, token) = cancel_pair();
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is signalled; pends forever if the
    /// handle is gone without having cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

/// Create a linked handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (handle, token) = cancel_pair();
        let waiter = tokio::spawn({
            let token = token.clone();
            async move {
                token.cancelled().await;
                true
            }
        });

        handle.cancel();
        assert!(waiter.await.unwrap());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn never_token_pends() {
        let token = CancelToken::never();
        let outcome =
            tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(outcome.is_err());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_before_wait_resolves_immediately() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        tokio::time::timeout(Duration::from_millis(20), token.cancelled())
            .await
            .expect("already-cancelled token must resolve");
    }
}
