//! Position record and the per-price evaluation step.
//!
//! ```text
//! ACTIVE ──price reaches T1──► ACTIVE (target1_hit, stop = entry)
//!   │                              │
//!   └──── stop breached / T5 ──────┴──► CLOSED (removed from store)
//!   └──── promote_to_live ─────────────► CONVERTED (kept, not monitored)
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sentinel_core::{
    ChannelName, Direction, ExitReason, InstrumentRef, PositionId, PositionStatus, Price,
    Quantity, TradeMode,
};
use sentinel_notify::PositionSummary;

use crate::error::{PositionError, PositionResult};
use crate::targets::compute_exits;

// ============================================================================
// Position
// ============================================================================

/// Inputs for [`Position::open`].
#[derive(Debug, Clone)]
pub struct OpenParams {
    pub symbol: String,
    pub instrument: InstrumentRef,
    pub direction: Direction,
    pub quantity: Quantity,
    pub entry_price: Price,
    pub risk_distance: Decimal,
    pub mode: TradeMode,
    pub channel: ChannelName,
}

/// A monitored position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub instrument: InstrumentRef,
    pub direction: Direction,
    pub quantity: Quantity,
    /// Fixed at creation.
    pub entry_price: Price,
    /// Fixed at creation; the exits were derived from it.
    pub risk_distance: Decimal,
    /// Moves once, to `entry_price`, when T1 is reached.
    pub stop_loss_price: Price,
    pub targets: [Price; 5],
    /// Best price seen so far in the profit direction.
    pub max_excursion_price: Price,
    pub target1_hit: bool,
    pub status: PositionStatus,
    pub mode: TradeMode,
    pub channel: ChannelName,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Build a new ACTIVE position with computed exits.
    ///
    /// Rejects an empty symbol, a non-positive entry or a non-positive risk.
    pub fn open(params: OpenParams) -> PositionResult<Self> {
        let symbol = params.symbol.trim().to_string();
        if symbol.is_empty() {
            return Err(PositionError::InvalidPosition("symbol is empty".to_string()));
        }
        if !params.entry_price.is_positive() {
            return Err(PositionError::InvalidPosition(format!(
                "entry price must be positive, got {}",
                params.entry_price
            )));
        }
        if params.risk_distance <= Decimal::ZERO {
            return Err(PositionError::InvalidPosition(format!(
                "risk distance must be positive, got {}",
                params.risk_distance
            )));
        }

        let exits = compute_exits(params.entry_price, params.risk_distance, params.direction);
        Ok(Self {
            id: PositionId::generate(&symbol),
            symbol,
            instrument: params.instrument,
            direction: params.direction,
            quantity: params.quantity,
            entry_price: params.entry_price,
            risk_distance: params.risk_distance,
            stop_loss_price: exits.stop_loss,
            targets: exits.targets,
            max_excursion_price: params.entry_price,
            target1_hit: false,
            status: PositionStatus::Active,
            mode: params.mode,
            channel: params.channel,
            opened_at: Utc::now(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    pub fn target1(&self) -> Price {
        self.targets[0]
    }

    pub fn final_target(&self) -> Price {
        self.targets[4]
    }

    /// Apply one observed price.
    ///
    /// Order: excursion, then T1 promotion, then exit check. The stop is
    /// checked before T5 so a price satisfying both closes as `SL_HIT`.
    pub fn evaluate(&mut self, price: Price) -> Evaluation {
        self.max_excursion_price = self.direction.best_of(self.max_excursion_price, price);

        let target1_hit = !self.target1_hit && self.direction.reached(price, self.target1());
        if target1_hit {
            self.target1_hit = true;
            self.stop_loss_price = self.entry_price;
        }

        let exit = if self.direction.breached(price, self.stop_loss_price) {
            Some(ExitReason::StopLossHit)
        } else if self.direction.reached(price, self.final_target()) {
            Some(ExitReason::Target5Hit)
        } else {
            None
        };
        if exit.is_some() {
            self.status = PositionStatus::Closed;
        }

        Evaluation { target1_hit, exit }
    }

    /// Detached view for notifications.
    pub fn summary(&self) -> PositionSummary {
        PositionSummary {
            id: self.id.clone(),
            symbol: self.symbol.clone(),
            direction: self.direction,
            quantity: self.quantity,
            mode: self.mode,
            channel: self.channel.clone(),
            entry_price: self.entry_price,
            stop_loss_price: self.stop_loss_price,
            targets: self.targets,
            max_excursion_price: self.max_excursion_price,
            target1_hit: self.target1_hit,
        }
    }
}

/// What one [`Position::evaluate`] call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Evaluation {
    /// T1 was reached on this call.
    pub target1_hit: bool,
    pub exit: Option<ExitReason>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sentinel_core::{SecurityId, Segment};

    fn params(direction: Direction, entry: Decimal, risk: Decimal) -> OpenParams {
        OpenParams {
            symbol: "NIFTY 22500 CE".to_string(),
            instrument: InstrumentRef::new(SecurityId(43251), Segment::NseFno),
            direction,
            quantity: Quantity::new(50).unwrap(),
            entry_price: Price::new(entry),
            risk_distance: risk,
            mode: TradeMode::Paper,
            channel: ChannelName::from("Free Group"),
        }
    }

    fn px(value: Decimal) -> Price {
        Price::new(value)
    }

    #[test]
    fn test_open_computes_exits() {
        let position = Position::open(params(Direction::Buy, dec!(100), dec!(20))).unwrap();

        assert!(position.id.as_str().starts_with("NIFTY-22500-CE_"));
        assert_eq!(position.stop_loss_price, px(dec!(80)));
        assert_eq!(position.final_target(), px(dec!(160)));
        assert_eq!(position.max_excursion_price, px(dec!(100)));
        assert!(position.is_active());
        assert!(!position.target1_hit);
    }

    #[test]
    fn test_open_rejects_bad_input() {
        let err = Position::open(params(Direction::Buy, dec!(100), dec!(0))).unwrap_err();
        assert!(matches!(err, PositionError::InvalidPosition(_)));

        let err = Position::open(params(Direction::Sell, dec!(0), dec!(5))).unwrap_err();
        assert!(matches!(err, PositionError::InvalidPosition(_)));

        let mut blank = params(Direction::Buy, dec!(100), dec!(5));
        blank.symbol = "  ".to_string();
        assert!(Position::open(blank).is_err());
    }

    #[test]
    fn test_target1_moves_stop_to_entry_once() {
        let mut position = Position::open(params(Direction::Buy, dec!(100), dec!(20))).unwrap();

        let eval = position.evaluate(px(dec!(112)));
        assert!(eval.target1_hit);
        assert_eq!(eval.exit, None);
        assert_eq!(position.stop_loss_price, position.entry_price);

        let eval = position.evaluate(px(dec!(115)));
        assert!(!eval.target1_hit);
        assert_eq!(position.stop_loss_price, position.entry_price);
    }

    #[test]
    fn test_stop_wins_simultaneous_breach() {
        // A degenerate record, already past T1, where one price satisfies
        // both conditions.
        let mut position = Position::open(params(Direction::Buy, dec!(100), dec!(20))).unwrap();
        position.target1_hit = true;
        position.stop_loss_price = px(dec!(170));

        let eval = position.evaluate(px(dec!(165)));
        assert!(!eval.target1_hit);
        assert_eq!(position.stop_loss_price, px(dec!(170)));
        assert_eq!(eval.exit, Some(ExitReason::StopLossHit));
        assert_eq!(position.status, PositionStatus::Closed);
    }

    #[test]
    fn test_gap_through_t5_flips_and_closes() {
        let mut position = Position::open(params(Direction::Sell, dec!(100), dec!(10))).unwrap();

        let eval = position.evaluate(px(dec!(65)));
        assert!(eval.target1_hit);
        assert_eq!(eval.exit, Some(ExitReason::Target5Hit));
        assert_eq!(position.max_excursion_price, px(dec!(65)));
    }

    #[test]
    fn test_excursion_is_monotonic() {
        let mut position = Position::open(params(Direction::Sell, dec!(100), dec!(10))).unwrap();

        for price in [dec!(98), dec!(103), dec!(96), dec!(99)] {
            position.evaluate(px(price));
        }
        assert_eq!(position.max_excursion_price, px(dec!(96)));
    }

    #[test]
    fn test_record_roundtrips_through_json() {
        let position = Position::open(params(Direction::Buy, dec!(100), dec!(20))).unwrap();
        let json = serde_json::to_string(&position).unwrap();
        assert!(json.contains("\"status\":\"ACTIVE\""));

        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back, position);
    }
}
