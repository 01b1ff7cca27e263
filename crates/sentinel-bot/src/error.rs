//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sentinel_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sentinel_persistence::PersistenceError),

    #[error("Feed error: {0}")]
    Feed(#[from] sentinel_feed::FeedError),

    #[error("Notify error: {0}")]
    Notify(#[from] sentinel_notify::NotifyError),

    #[error("Instrument error: {0}")]
    Instruments(#[from] sentinel_instruments::InstrumentError),

    #[error("Position error: {0}")]
    Position(#[from] sentinel_position::PositionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
