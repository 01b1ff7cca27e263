//! Whole-document JSON persistence for Sentinel.
//!
//! State (open positions, daily channel counters) is small and always
//! rewritten in full, so each document is a single pretty-printed JSON
//! file replaced atomically on every save.

pub mod document;
pub mod error;

pub use document::JsonDocument;
pub use error::{PersistenceError, PersistenceResult};
