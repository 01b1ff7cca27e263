//! Lifecycle events reported by the position service and monitor.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sentinel_core::{
    ChannelName, Direction, ExitReason, PositionId, Price, Quantity, TradeMode,
};

/// Point-in-time view of a position, detached from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub id: PositionId,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: Quantity,
    pub mode: TradeMode,
    pub channel: ChannelName,
    pub entry_price: Price,
    pub stop_loss_price: Price,
    pub targets: [Price; 5],
    pub max_excursion_price: Price,
    pub target1_hit: bool,
}

impl PositionSummary {
    /// Signed profit in price points if closed at `exit_price`.
    pub fn pnl_points(&self, exit_price: Price) -> Decimal {
        (exit_price - self.entry_price) * self.direction.factor()
    }

    /// Signed profit as a percentage of entry.
    pub fn pnl_pct(&self, exit_price: Price) -> Option<Decimal> {
        if self.entry_price.is_zero() {
            return None;
        }
        Some(self.pnl_points(exit_price) / self.entry_price.inner() * Decimal::ONE_HUNDRED)
    }
}

/// Position lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Trade accepted and stored.
    Added {
        channel: ChannelName,
        position_id: PositionId,
        symbol: String,
        direction: Direction,
        mode: TradeMode,
        /// The free channel was full and the position was moved.
        redirected: bool,
    },
    /// Exits computed; the monitor now watches the position.
    Active { summary: PositionSummary },
    /// First target reached; stop moved to entry.
    TargetOneHit {
        channel: ChannelName,
        symbol: String,
        summary: PositionSummary,
    },
    /// Exit condition fired; the position left the store.
    Closed {
        summary: PositionSummary,
        reason: ExitReason,
        exit_price: Price,
    },
}

impl LifecycleEvent {
    /// Destination channel.
    pub fn channel(&self) -> &ChannelName {
        match self {
            Self::Added { channel, .. } | Self::TargetOneHit { channel, .. } => channel,
            Self::Active { summary } | Self::Closed { summary, .. } => &summary.channel,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Active { .. } => "active",
            Self::TargetOneHit { .. } => "target1_hit",
            Self::Closed { .. } => "closed",
        }
    }
}
