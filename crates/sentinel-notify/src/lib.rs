//! Lifecycle notifications and channel routing for Sentinel.
//!
//! - [`LifecycleEvent`]: what the monitor and service report
//! - [`Notifier`]: fire-and-forget sink; never blocks, never fails the caller
//! - [`TelegramNotifier`]: renders Markdown alerts and delivers them from a
//!   background task
//! - [`ChannelGate`]: daily free-channel allowance with premium overflow

pub mod error;
pub mod event;
pub mod gate;
pub mod notifier;
pub mod render;
pub mod telegram;

pub use error::{NotifyError, NotifyResult};
pub use event::{LifecycleEvent, PositionSummary};
pub use gate::{ChannelDecision, ChannelGate, ChannelGateConfig, DailyChannelStats};
pub use notifier::{LogNotifier, Notifier};
pub use render::{render, RenderedMessage};
pub use telegram::{spawn_telegram, TelegramConfig, TelegramDispatcher, TelegramNotifier};
