//! Position lifecycle for Sentinel.
//!
//! - [`compute_exits`]: stop-loss and five targets from one risk input
//! - [`Position`]: the record and its per-price evaluation step
//! - [`PositionStore`]: durable, concurrently shared map of positions
//! - [`PositionMonitor`]: polling loop that promotes stops and closes positions
//! - [`OrderRouter`]: paper and broker market-order routing
//! - [`PositionService`]: create, promote to live, list

pub mod error;
pub mod monitor;
pub mod position;
pub mod router;
pub mod service;
pub mod store;
pub mod targets;

pub use error::{PositionError, PositionResult};
pub use monitor::{CycleReport, FallbackPolicy, MonitorConfig, PositionMonitor};
pub use position::{Evaluation, OpenParams, Position};
pub use router::{AnyRouter, BrokerRestRouter, OrderAck, OrderRequest, OrderRouter, PaperRouter};
pub use service::{NewPosition, Promotion, PositionService};
pub use store::PositionStore;
pub use targets::{compute_exits, Exits, TARGET_MULTIPLIERS};
