//! Server error types.

use thiserror::Error;

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Other listener I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The Prometheus recorder could not be installed.
    #[error("metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    /// `listen` was called more than once.
    #[error("server already started")]
    AlreadyStarted,
}
