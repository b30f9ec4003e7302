//! Bus error types.

/// Errors from the pub/sub bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Redis error: {0}")]
    Redis(#[from] fred::prelude::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] tenyks_core::Error),

    #[error("Bus closed")]
    Closed,
}
