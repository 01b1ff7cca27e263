//! Instrument master error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scrip master is missing column {0}")]
    MissingColumn(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Scrip master download returned status {0}")]
    Status(u16),

    #[error("No {option_type} option for {index} at strike {strike}")]
    NoAtmOption {
        index: String,
        strike: rust_decimal::Decimal,
        option_type: String,
    },
}

pub type InstrumentResult<T> = Result<T, InstrumentError>;
