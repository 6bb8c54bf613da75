//! Query Context
//!
//! Cancellation signal and optional deadline carried by every operation.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

/// Handle the host keeps to cancel in-flight work
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Per-query context passed into every network operation
#[derive(Debug, Clone)]
pub struct QueryContext {
    cancel: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new().1
    }
}

impl QueryContext {
    /// Create a context together with the handle that cancels it
    pub fn new() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx: Arc::new(tx) },
            Self {
                cancel: rx,
                deadline: None,
            },
        )
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Fail fast if the caller already gave up
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled {
                operation: operation.to_string(),
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(deadline_exceeded(operation));
        }
        Ok(())
    }

    /// Resolves once cancellation is requested; never resolves if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run a network future under this context's cancellation and deadline
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check(operation)?;

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| deadline_exceeded(operation))?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::Cancelled {
                operation: operation.to_string(),
            }),
            result = bounded => result,
        }
    }
}

fn deadline_exceeded(operation: &str) -> Error {
    Error::Transport {
        operation: operation.to_string(),
        message: "deadline exceeded".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_passes_result_through() {
        let ctx = QueryContext::default();
        let value = ctx.run("op", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_call() {
        let (handle, ctx) = QueryContext::new();

        let task = tokio::spawn(async move {
            ctx.run("list servers", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            Error::Cancelled {
                operation: "list servers".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_check_after_cancel() {
        let (handle, ctx) = QueryContext::new();
        assert!(ctx.check("op").is_ok());
        handle.cancel();
        assert!(matches!(ctx.check("op"), Err(Error::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = QueryContext::default().with_deadline(Instant::now() + Duration::from_millis(10));
        let err = ctx
            .run("get image", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("deadline exceeded"));
    }
}
