//! Position monitor loop.
//!
//! Once per interval, each ACTIVE position is evaluated in store order:
//!
//! ```text
//! fetch price (timeout) ──miss──► fallback policy
//!        │
//!        ▼
//! Position::evaluate ──► T1 hit?  replace record, notify
//!                    └─► exit?    remove record, notify closed
//! ```
//!
//! A failing position never stops its siblings or the loop. Persistence
//! failures are retried on the next cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sentinel_core::{ExitReason, PositionId, Price};
use sentinel_feed::PriceSource;
use sentinel_notify::{LifecycleEvent, Notifier};
use sentinel_telemetry::Metrics;

use crate::position::Position;
use crate::store::PositionStore;

// ============================================================================
// MonitorConfig
// ============================================================================

/// What to do when no usable price arrives for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Evaluate against the entry price for this cycle.
    #[default]
    EntryPrice,
    /// Leave the position untouched until a real price arrives.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Cycle period.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Upper bound on a single price fetch.
    #[serde(default = "default_price_timeout_ms")]
    pub price_timeout_ms: u64,
    #[serde(default)]
    pub fallback: FallbackPolicy,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_price_timeout_ms() -> u64 {
    3000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            price_timeout_ms: default_price_timeout_ms(),
            fallback: FallbackPolicy::default(),
        }
    }
}

// ============================================================================
// CycleReport
// ============================================================================

/// Summary of one monitor cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub evaluated: usize,
    /// Positions evaluated against the fallback price.
    pub fallbacks: usize,
    /// Positions left untouched (no price under [`FallbackPolicy::Skip`]).
    pub skipped: usize,
    pub target1_hits: Vec<PositionId>,
    pub closed: Vec<(PositionId, ExitReason)>,
}

// ============================================================================
// PositionMonitor
// ============================================================================

pub struct PositionMonitor<P, N> {
    config: MonitorConfig,
    store: Arc<PositionStore>,
    prices: P,
    notifier: N,
}

impl<P: PriceSource, N: Notifier> PositionMonitor<P, N> {
    pub fn new(config: MonitorConfig, store: Arc<PositionStore>, prices: P, notifier: N) -> Self {
        Self {
            config,
            store,
            prices,
            notifier,
        }
    }

    /// Run until `shutdown` is cancelled, then flush once more.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.config.interval_ms,
            price_timeout_ms = self.config.price_timeout_ms,
            fallback = ?self.config.fallback,
            active = self.store.active_count(),
            "PositionMonitor started"
        );

        let mut ticker = interval(Duration::from_millis(self.config.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }

        // Failure already logged and counted by the store.
        let _ = self.store.flush_if_dirty();
        info!("PositionMonitor stopped");
    }

    /// Evaluate every ACTIVE position once.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        // Retry a flush that failed last cycle.
        let _ = self.store.flush_if_dirty();

        for position in self.store.active() {
            self.evaluate_position(position, &mut report).await;
        }

        Metrics::set_active_positions(self.store.active_count());
        Metrics::monitor_cycle(started.elapsed().as_secs_f64() * 1000.0);
        if report.evaluated > 0 {
            debug!(
                evaluated = report.evaluated,
                fallbacks = report.fallbacks,
                skipped = report.skipped,
                closed = report.closed.len(),
                "Monitor cycle complete"
            );
        }
        report
    }

    async fn evaluate_position(&self, current: Position, report: &mut CycleReport) {
        let Some(price) = self.observe_price(&current, report).await else {
            report.skipped += 1;
            return;
        };
        report.evaluated += 1;

        let mut next = current.clone();
        let evaluation = next.evaluate(price);

        if let Some(reason) = evaluation.exit {
            // Removed by someone else mid-cycle: nothing to close.
            if self.store.remove_if_active(&next.id).is_none() {
                debug!(position_id = %next.id, "Position gone before close, skipping");
                return;
            }
            let _ = self.store.flush();

            if evaluation.target1_hit {
                self.on_target1(&next, price, report);
            }
            self.on_closed(&next, reason, price, report);
        } else if next != current {
            if !self.store.replace_if_active(next.clone()) {
                debug!(position_id = %next.id, "Position changed mid-cycle, update dropped");
                return;
            }
            let _ = self.store.flush();

            if evaluation.target1_hit {
                self.on_target1(&next, price, report);
            }
        }
    }

    /// Price for this cycle, or `None` to leave the position untouched.
    async fn observe_price(&self, position: &Position, report: &mut CycleReport) -> Option<Price> {
        let fetch = self.prices.get_price(&position.instrument);
        let cause = match timeout(Duration::from_millis(self.config.price_timeout_ms), fetch).await
        {
            Ok(Ok(Some(price))) if price.is_positive() => return Some(price),
            Ok(Ok(Some(_))) => "non_positive",
            Ok(Ok(None)) => "missing",
            Ok(Err(e)) => {
                warn!(position_id = %position.id, error = %e, "Price fetch failed");
                "error"
            }
            Err(_) => {
                warn!(
                    position_id = %position.id,
                    timeout_ms = self.config.price_timeout_ms,
                    "Price fetch timed out"
                );
                "timeout"
            }
        };

        Metrics::price_fallback(cause);
        match self.config.fallback {
            FallbackPolicy::EntryPrice => {
                debug!(
                    position_id = %position.id,
                    cause,
                    entry = %position.entry_price,
                    "No price, evaluating at entry"
                );
                report.fallbacks += 1;
                Some(position.entry_price)
            }
            FallbackPolicy::Skip => {
                debug!(position_id = %position.id, cause, "No price, skipping position");
                None
            }
        }
    }

    fn on_target1(&self, position: &Position, price: Price, report: &mut CycleReport) {
        info!(
            position_id = %position.id,
            symbol = %position.symbol,
            price = %price,
            target1 = %position.target1(),
            stop_loss = %position.stop_loss_price,
            "Target 1 hit, stop moved to entry"
        );
        report.target1_hits.push(position.id.clone());
        self.notifier.notify(LifecycleEvent::TargetOneHit {
            channel: position.channel.clone(),
            symbol: position.symbol.clone(),
            summary: position.summary(),
        });
    }

    fn on_closed(&self, position: &Position, reason: ExitReason, price: Price, report: &mut CycleReport) {
        let summary = position.summary();
        let points = summary.pnl_points(price);
        info!(
            position_id = %position.id,
            symbol = %position.symbol,
            reason = %reason,
            exit_price = %price,
            entry = %position.entry_price,
            max_excursion = %position.max_excursion_price,
            pnl_points = %points,
            "Position closed"
        );
        Metrics::position_closed(
            reason.as_str(),
            position.mode.as_str(),
            points.to_f64().unwrap_or_default(),
        );
        report.closed.push((position.id.clone(), reason));
        self.notifier.notify(LifecycleEvent::Closed {
            summary,
            reason,
            exit_price: price,
        });
    }
}
