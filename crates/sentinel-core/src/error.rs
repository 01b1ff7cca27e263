//! Error types for sentinel-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid security id: {0}")]
    InvalidSecurityId(String),

    #[error("Unknown segment: {0}")]
    UnknownSegment(String),

    #[error("Unknown direction: {0}")]
    UnknownDirection(String),

    #[error("Unknown trade mode: {0}")]
    UnknownMode(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
