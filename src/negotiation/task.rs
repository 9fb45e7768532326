//! Cancellable background workers.
//!
//! Every worker is a tokio task paired with a [`CancellationToken`].
//! Shutdown is staged:
//!
//! 1. Cancel the token
//! 2. Join with a bounded grace period
//! 3. Abort the task
//! 4. Wait briefly for the abort, then give up and log

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// How long to wait for a task after aborting it.
pub(crate) const ABORT_WAIT: Duration = Duration::from_millis(100);

/// Stand-in for deadlines too far out to represent, roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// ============================================================================
// Deadlines
// ============================================================================

/// Returns `start + timeout`, saturating to a far-future instant instead of
/// overflowing.
pub(crate) fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

// ============================================================================
// Worker
// ============================================================================

/// A spawned task with its cancellation token.
///
/// Dropping a worker cancels its token; the task exits at its next check.
pub(crate) struct Worker<T> {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> Worker<T> {
    /// Spawns `task` with `cancel` as its token.
    pub(crate) fn spawn<F, Fut>(name: &'static str, cancel: CancellationToken, task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let handle = tokio::spawn(task(cancel.clone()));
        debug!(worker = name, "Worker spawned");

        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    /// Returns `true` once the task has completed or been joined.
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the task until `deadline`.
    ///
    /// Returns `None` if the deadline passes first; the task keeps running.
    pub(crate) async fn join_until(&mut self, deadline: Instant) -> Option<Result<T>> {
        let handle = self.handle.as_mut()?;

        match timeout_at(deadline, handle).await {
            Ok(joined) => {
                self.handle = None;
                Some(joined.map_err(|e| join_failure(self.name, &e)))
            }
            Err(_) => None,
        }
    }

    /// Stops the task and returns its output if it finished within `grace`.
    ///
    /// Never blocks longer than `grace` plus [`ABORT_WAIT`].
    pub(crate) async fn shutdown(mut self, grace: Duration) -> Option<T> {
        self.cancel.cancel();

        let mut handle = self.handle.take()?;

        match timeout(grace, &mut handle).await {
            Ok(Ok(output)) => {
                debug!(worker = self.name, "Worker stopped");
                return Some(output);
            }
            Ok(Err(e)) => {
                warn!(worker = self.name, error = %e, "Worker ended abnormally");
                return None;
            }
            Err(_) => {
                debug!(
                    worker = self.name,
                    grace_ms = grace.as_millis() as u64,
                    "Worker ignored cancellation, aborting"
                );
            }
        }

        handle.abort();

        match timeout(ABORT_WAIT, &mut handle).await {
            Ok(_) => debug!(worker = self.name, "Worker aborted"),
            Err(_) => warn!(worker = self.name, "Worker abandoned after abort"),
        }

        None
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn join_failure(name: &str, error: &JoinError) -> Error {
    if error.is_cancelled() {
        Error::Cancelled
    } else {
        Error::transport(format!("{name} worker panicked: {error}"))
    }
}

// ============================================================================
// Tests
// ============================================================================
