//! Live price sources for Sentinel.
//!
//! The monitor only needs "last traded price for this instrument, or
//! nothing" behind a short timeout. This crate provides:
//!
//! - [`PriceSource`]: the accessor trait consumed by the monitor
//! - [`LtpCache`]: in-memory last-traded-price cache with a staleness bound
//! - [`RestLtpSource`]: broker REST LTP polling
//! - [`FallbackSource`]: cache first, REST second
//! - [`parser`]: binary market-feed packet decoding
//! - [`MarketFeed`]: WebSocket client that keeps the cache warm

pub mod error;
pub mod feed;
pub mod parser;
pub mod rest;
pub mod source;

pub use error::{FeedError, FeedResult};
pub use feed::{FeedConfig, MarketFeed};
pub use parser::{parse_frame, FeedPacket, ParsedFrame};
pub use rest::{RestConfig, RestLtpSource};
pub use source::{FallbackSource, LtpCache, PriceSource, Quote};
