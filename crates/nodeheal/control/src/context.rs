//! Per-cycle deadline and cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{ControlError, ControlResult};

/// Deadline and shutdown signal threaded through every I/O call of a cycle.
///
/// Status is persisted in one final write, so abandoning a cycle at any
/// suspension point leaves no partial status behind.
#[derive(Debug, Clone)]
pub struct CycleContext {
    deadline: Instant,
    shutdown: Option<watch::Receiver<bool>>,
}

impl CycleContext {
    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            shutdown: None,
        }
    }

    /// Also abort when `shutdown` flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Shutdown was requested or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        let shutdown = self
            .shutdown
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false);
        shutdown || Instant::now() >= self.deadline
    }

    /// Run `fut`, bounded by `io_timeout` and the cycle deadline, whichever is sooner.
    pub async fn bound<F>(&self, operation: &str, io_timeout: Duration, fut: F) -> ControlResult<F::Output>
    where
        F: Future,
    {
        let limit = (Instant::now() + io_timeout).min(self.deadline);
        self.race(operation, limit, fut).await
    }

    /// Run `fut`, bounded only by the cycle deadline.
    pub async fn within_deadline<F>(&self, operation: &str, fut: F) -> ControlResult<F::Output>
    where
        F: Future,
    {
        self.race(operation, self.deadline, fut).await
    }

    /// Like [`bound`](Self::bound) for fallible calls, flattening the error.
    pub async fn run<F, T, E>(&self, operation: &str, io_timeout: Duration, fut: F) -> ControlResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ControlError>,
    {
        self.bound(operation, io_timeout, fut)
            .await
            .and_then(|result| result.map_err(Into::into))
    }

    async fn race<F>(&self, operation: &str, limit: Instant, fut: F) -> ControlResult<F::Output>
    where
        F: Future,
    {
        let mut shutdown = self.shutdown.clone();
        let started = Instant::now();

        tokio::select! {
            result = tokio::time::timeout_at(limit, fut) => result.map_err(|_| ControlError::Timeout {
                operation: operation.to_string(),
                timeout_ms: limit.saturating_duration_since(started).as_millis() as u64,
            }),
            _ = wait_for_shutdown(&mut shutdown) => Err(ControlError::Cancelled {
                operation: operation.to_string(),
            }),
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        loop {
            let stop = *rx.borrow_and_update();
            if stop {
                return;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
    std::future::pending::<()>().await
}
