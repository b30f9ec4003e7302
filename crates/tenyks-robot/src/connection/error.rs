//! Connection error types.

use std::time::Duration;

/// Errors that can occur on a protocol connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("No data from {connection} within {timeout:?}")]
    NoGreeting {
        connection: String,
        timeout: Duration,
    },

    #[error("Not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
