//! Position lifecycle enums and identifiers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::decimal::Price;
use crate::error::{CoreError, Result};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Profit when price rises.
    Buy,
    /// Profit when price falls.
    Sell,
}

impl Direction {
    /// +1 for BUY, -1 for SELL.
    #[inline]
    pub fn factor(&self) -> Decimal {
        match self {
            Self::Buy => Decimal::ONE,
            Self::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    /// True if `price` has reached or passed `level` in the profit direction.
    #[inline]
    pub fn reached(&self, price: Price, level: Price) -> bool {
        match self {
            Self::Buy => price >= level,
            Self::Sell => price <= level,
        }
    }

    /// True if `price` has reached or passed `level` in the loss direction.
    #[inline]
    pub fn breached(&self, price: Price, level: Price) -> bool {
        match self {
            Self::Buy => price <= level,
            Self::Sell => price >= level,
        }
    }

    /// The more favourable of two prices.
    #[inline]
    pub fn best_of(&self, a: Price, b: Price) -> Price {
        match self {
            Self::Buy => a.max(b),
            Self::Sell => a.min(b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            _ => Err(CoreError::UnknownDirection(s.to_string())),
        }
    }
}

/// Whether orders for a position are routed to the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeMode {
    /// Logged and monitored only.
    #[default]
    Paper,
    /// Orders sent to the broker.
    Live,
}

impl TradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "PAPER",
            Self::Live => "LIVE",
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAPER" => Ok(Self::Paper),
            "LIVE" => Ok(Self::Live),
            _ => Err(CoreError::UnknownMode(s.to_string())),
        }
    }
}

/// Position status.
///
/// `Closed` is terminal and the record leaves the store in the same step;
/// `Converted` marks a paper record superseded by a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Active,
    Closed,
    Converted,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Converted => write!(f, "CONVERTED"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    /// Price crossed the (possibly break-even) stop-loss.
    #[serde(rename = "SL_HIT")]
    StopLossHit,
    /// Price reached the final target.
    #[serde(rename = "TARGET5_HIT")]
    Target5Hit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLossHit => "SL_HIT",
            Self::Target5Hit => "TARGET5_HIT",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique position identifier.
///
/// Format: `{SYMBOL}_{timestamp_ms}_{uuid_short}`. The random suffix keeps
/// two positions on the same symbol within one millisecond distinct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(String);

impl PositionId {
    /// Generate a fresh id for `symbol`.
    pub fn generate(symbol: &str) -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().simple().to_string()[..8];
        let symbol: String = symbol
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        Self(format!("{}_{ts}_{uuid_short}", symbol.to_ascii_uppercase()))
    }

    /// Wrap an existing id (from storage or a callback payload).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical notification channel name (e.g. "Free Group", "VIP Channel").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
