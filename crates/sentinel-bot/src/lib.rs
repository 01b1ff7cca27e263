//! Sentinel service: configuration and wiring for the position monitor.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, OperatingMode};
pub use error::{AppError, AppResult};
