//! Core domain types for the Sentinel position monitor.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - `Price`, `Quantity`: precision-safe numeric types
//! - `InstrumentRef`, `Segment`, `SecurityId`: broker instrument addressing
//! - `Direction`, `TradeMode`, `PositionStatus`, `ExitReason`: lifecycle enums
//! - `PositionId`, `ChannelName`: identifiers

pub mod decimal;
pub mod error;
pub mod instrument;
pub mod types;

pub use decimal::{Price, Quantity};
pub use error::{CoreError, Result};
pub use instrument::{InstrumentRef, SecurityId, Segment};
pub use types::{ChannelName, Direction, ExitReason, PositionId, PositionStatus, TradeMode};
