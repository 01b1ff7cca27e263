//! Notification error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("No chat configured for channel {0}")]
    UnknownChannel(String),

    #[error("Telegram bot token not configured")]
    NotConfigured,
}

pub type NotifyResult<T> = Result<T, NotifyError>;
