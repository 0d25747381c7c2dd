//! Server error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind its address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A global metrics recorder is already installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
