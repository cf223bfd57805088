//! Background tasks — detached work the caller does not wait for.
//!
//! Stale-while-revalidate answers from the store immediately and refreshes
//! the store afterwards. That refresh runs as a detached Tokio task wrapped
//! in a [`Revalidation`] handle, so tests (or a curious caller) can wait for
//! it while the normal request path simply drops the handle.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::warn;

/// Handle to a detached store refresh.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct Revalidation {
    handle: JoinHandle<bool>,
}

impl Revalidation {
    /// Spawns `task` onto the current Tokio runtime.
    ///
    /// The task resolves to `true` when it wrote a fresh response into a store.
    pub(crate) fn spawn<F>(task: F) -> Self
    where
        F: Future<Output = bool> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(task),
        }
    }

    /// Returns `true` once the task has run to completion.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the refresh and reports whether the store was updated.
    ///
    /// A task that panicked reports `false`.
    pub async fn finished(self) -> bool {
        match self.handle.await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "revalidation task failed");
                false
            }
        }
    }
}
