//! Markdown rendering of lifecycle events.
//!
//! Output targets Telegram's legacy Markdown: `*bold*` titles, with the
//! four reserved characters escaped in every dynamic value.

use rust_decimal::Decimal;

use sentinel_core::{Price, TradeMode};

use crate::event::LifecycleEvent;

/// Callback-data prefix for the paper → live button.
pub const LIVE_CALLBACK_PREFIX: &str = "live_";

/// A rendered alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
    /// Inline button as (label, callback data).
    pub button: Option<(String, String)>,
}

impl RenderedMessage {
    /// Full Markdown text as sent.
    pub fn text(&self) -> String {
        format!("🔔 *{}*\n{}", self.title, self.body)
    }
}

/// Escape Telegram legacy-Markdown control characters.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn fmt_signed(value: Decimal) -> String {
    let value = value.round_dp(2).normalize();
    if value.is_sign_positive() && !value.is_zero() {
        format!("+{value}")
    } else {
        value.to_string()
    }
}

fn fmt_targets(targets: &[Price; 5]) -> String {
    targets
        .iter()
        .map(Price::to_string)
        .collect::<Vec<_>>()
        .join(" / ")
}

/// Render an event for delivery.
pub fn render(event: &LifecycleEvent) -> RenderedMessage {
    match event {
        LifecycleEvent::Added {
            channel,
            position_id,
            symbol,
            direction,
            mode,
            redirected,
        } => {
            let status = match mode {
                TradeMode::Live => "✅ Order Sent to Exchange",
                TradeMode::Paper => "📝 Paper Trade Logged",
            };
            let mut body = format!(
                "Symbol: {}\nAction: {direction}\nMode: {mode}\n{status}",
                escape_markdown(symbol)
            );
            if *redirected {
                body.push_str(&format!(
                    "\n(Switched to {} due to daily limit)",
                    escape_markdown(channel.as_str())
                ));
            }
            let button = (*mode == TradeMode::Paper).then(|| {
                (
                    "⚡ EXECUTE LIVE".to_string(),
                    format!("{LIVE_CALLBACK_PREFIX}{position_id}"),
                )
            });
            RenderedMessage {
                title: "New Trade Executed".to_string(),
                body,
                button,
            }
        }
        LifecycleEvent::Active { summary } => RenderedMessage {
            title: "Position Active".to_string(),
            body: format!(
                "Symbol: {}\nAction: {} x{}\nEntry: {}\nStop Loss: {}\nTargets: {}",
                escape_markdown(&summary.symbol),
                summary.direction,
                summary.quantity,
                summary.entry_price,
                summary.stop_loss_price,
                fmt_targets(&summary.targets),
            ),
            button: None,
        },
        LifecycleEvent::TargetOneHit {
            symbol, summary, ..
        } => RenderedMessage {
            title: "Target 1 Hit".to_string(),
            body: format!(
                "Symbol: {}\nT1 {} reached. Stop moved to entry {} (risk-free).",
                escape_markdown(symbol),
                summary.targets[0],
                summary.stop_loss_price,
            ),
            button: None,
        },
        LifecycleEvent::Closed {
            summary,
            reason,
            exit_price,
        } => {
            let points = summary.pnl_points(*exit_price);
            let pct = summary
                .pnl_pct(*exit_price)
                .map(|p| format!(" ({}%)", fmt_signed(p)))
                .unwrap_or_default();
            RenderedMessage {
                title: "Position Closed".to_string(),
                body: format!(
                    "Symbol: {}\nReason: {}\nEntry: {}\nExit: {}\nP&L: {} pts{pct}\nBest Price: {}",
                    escape_markdown(&summary.symbol),
                    escape_markdown(reason.as_str()),
                    summary.entry_price,
                    exit_price,
                    fmt_signed(points),
                    summary.max_excursion_price,
                ),
                button: None,
            }
        }
    }
}
