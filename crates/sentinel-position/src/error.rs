//! Position error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Position not found: {0}")]
    NotFound(String),

    #[error("Invalid position state: {0}")]
    InvalidState(String),

    #[error("No price available for {0}")]
    PriceUnavailable(String),

    #[error("Order routing failed: {0}")]
    RoutingFailed(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sentinel_persistence::PersistenceError),
}

pub type PositionResult<T> = Result<T, PositionError>;
