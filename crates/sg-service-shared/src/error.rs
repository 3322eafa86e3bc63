use std::net::SocketAddr;

use thiserror::Error;

use crate::metrics::MetricsError;

/// Convenient result alias for the service crate.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Top-level service error type.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The listener could not be bound. Terminal for the process.
    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The accept loop ended with an I/O error.
    #[error("server accept loop failed: {0}")]
    Serve(#[source] std::io::Error),

    /// The global tracing subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),

    /// Wrapper for metrics recorder errors.
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}
