//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before aborting stragglers.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the process-wide cancellation token and the background tasks that
/// must be joined on shutdown.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a task to be joined by [`graceful_shutdown`](Self::graceful_shutdown).
    pub fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.lock().push((name, handle));
    }

    /// Number of tracked tasks not yet joined.
    pub fn tracked(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Cancel the token, wait up to `timeout` for every tracked task, then
    /// abort whatever is left.
    ///
    /// Returns the number of tasks that finished on their own.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) -> usize {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        info!(
            task_count = tasks.len(),
            timeout_ms = timeout.as_millis(),
            "waiting for tasks to complete"
        );

        let deadline = tokio::time::Instant::now() + timeout;
        let mut finished = 0;
        for (name, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => finished += 1,
                Ok(Err(e)) => warn!(task = name, error = %e, "task ended abnormally"),
                Err(_) => {
                    warn!(task = name, "task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
        finished
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
