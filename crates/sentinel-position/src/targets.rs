//! Stop-loss and target levels from a single risk input.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use sentinel_core::{Direction, Price};

/// Target distances as multiples of the risk distance, T1..T5.
pub const TARGET_MULTIPLIERS: [Decimal; 5] = [dec!(0.5), dec!(1.0), dec!(1.5), dec!(2.0), dec!(3.0)];

/// Exit levels for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exits {
    pub stop_loss: Price,
    pub targets: [Price; 5],
}

/// Compute the stop-loss and five targets.
///
/// `stop = entry - risk * f`, `T[i] = entry + risk * m[i] * f` where `f` is
/// +1 for BUY and -1 for SELL. The caller guarantees `risk > 0`.
pub fn compute_exits(entry: Price, risk: Decimal, direction: Direction) -> Exits {
    let factor = direction.factor();
    Exits {
        stop_loss: entry - risk * factor,
        targets: TARGET_MULTIPLIERS.map(|m| entry + risk * m * factor),
    }
}
