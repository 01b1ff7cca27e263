//! Free-channel daily allowance.
//!
//! The free channel accepts `free_daily_limit` positions per calendar day;
//! anything beyond that goes to the premium channel. The day's count is
//! persisted so a restart does not reset it.

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sentinel_core::ChannelName;
use sentinel_persistence::JsonDocument;
use sentinel_telemetry::Metrics;

/// Channel gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGateConfig {
    pub free_channel: ChannelName,
    pub premium_channel: ChannelName,
    #[serde(default = "default_free_daily_limit")]
    pub free_daily_limit: u32,
}

fn default_free_daily_limit() -> u32 {
    1
}

/// Persisted usage for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyChannelStats {
    pub date: NaiveDate,
    pub free_count: u32,
}

impl Default for DailyChannelStats {
    fn default() -> Self {
        Self {
            date: NaiveDate::MIN,
            free_count: 0,
        }
    }
}

/// Outcome of [`ChannelGate::reserve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDecision {
    pub channel: ChannelName,
    /// The requested channel was over its daily allowance.
    pub redirected: bool,
    /// Day whose free allowance this decision holds a slot of.
    reserved_on: Option<NaiveDate>,
}

impl ChannelDecision {
    fn pass_through(channel: ChannelName) -> Self {
        Self {
            channel,
            redirected: false,
            reserved_on: None,
        }
    }

    /// True if this decision took a free-channel slot.
    pub fn is_reserved(&self) -> bool {
        self.reserved_on.is_some()
    }
}

pub struct ChannelGate {
    config: ChannelGateConfig,
    /// Held across the save so the file never lags a newer count.
    stats: Mutex<DailyChannelStats>,
    document: JsonDocument<DailyChannelStats>,
}

impl ChannelGate {
    /// Create a gate, restoring today's usage from `document` if present.
    pub fn new(config: ChannelGateConfig, document: JsonDocument<DailyChannelStats>) -> Self {
        let stats = document.load_or_default();
        Self {
            config,
            stats: Mutex::new(stats),
            document,
        }
    }

    pub fn config(&self) -> &ChannelGateConfig {
        &self.config
    }

    /// Decide where a position requested for `requested` goes today, taking
    /// a free-channel slot if one is left.
    ///
    /// The check and the count happen under one lock, so concurrent callers
    /// never exceed the allowance. Give the slot back with
    /// [`release`](Self::release) if the position is not created.
    pub fn reserve(&self, requested: &ChannelName) -> ChannelDecision {
        self.reserve_on(requested, Utc::now().date_naive())
    }

    pub fn reserve_on(&self, requested: &ChannelName, date: NaiveDate) -> ChannelDecision {
        if *requested != self.config.free_channel {
            return ChannelDecision::pass_through(requested.clone());
        }

        let mut stats = self.stats.lock();
        if stats.date != date {
            *stats = DailyChannelStats {
                date,
                free_count: 0,
            };
        }

        if stats.free_count >= self.config.free_daily_limit {
            info!(
                requested = %requested,
                channel = %self.config.premium_channel,
                used = stats.free_count,
                limit = self.config.free_daily_limit,
                "Free channel limit reached, redirecting"
            );
            Metrics::channel_redirect();
            return ChannelDecision {
                channel: self.config.premium_channel.clone(),
                redirected: true,
                reserved_on: None,
            };
        }

        stats.free_count += 1;
        self.persist(&stats);
        ChannelDecision {
            channel: requested.clone(),
            redirected: false,
            reserved_on: Some(date),
        }
    }

    /// Return the free slot held by `decision`. No-op for decisions that
    /// hold none, or whose day has already rolled over.
    pub fn release(&self, decision: &ChannelDecision) {
        let Some(date) = decision.reserved_on else {
            return;
        };

        let mut stats = self.stats.lock();
        if stats.date != date || stats.free_count == 0 {
            return;
        }
        stats.free_count -= 1;
        debug!(channel = %decision.channel, used = stats.free_count, "Free channel slot released");
        self.persist(&stats);
    }

    /// In-memory usage stays authoritative when the save fails.
    fn persist(&self, stats: &DailyChannelStats) {
        if let Err(e) = self.document.save(stats) {
            warn!(error = %e, "Failed to persist channel stats");
            Metrics::persistence_failure();
        }
    }

    /// Free-channel usage for `date`.
    pub fn free_used_on(&self, date: NaiveDate) -> u32 {
        let stats = self.stats.lock();
        if stats.date == date {
            stats.free_count
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> ChannelGateConfig {
        ChannelGateConfig {
            free_channel: ChannelName::from("Free Group"),
            premium_channel: ChannelName::from("VIP Channel"),
            free_daily_limit: 1,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_first_free_request_is_allowed_then_redirected() {
        let dir = TempDir::new().unwrap();
        let gate = ChannelGate::new(config(), JsonDocument::new(dir.path().join("stats.json")));
        let free = ChannelName::from("Free Group");

        let first = gate.reserve_on(&free, day(4));
        assert_eq!(first.channel, free);
        assert!(!first.redirected);
        assert!(first.is_reserved());

        let second = gate.reserve_on(&free, day(4));
        assert_eq!(second.channel.as_str(), "VIP Channel");
        assert!(second.redirected);
        assert!(!second.is_reserved());
        assert_eq!(gate.free_used_on(day(4)), 1);
    }

    #[test]
    fn test_premium_requests_are_never_counted() {
        let dir = TempDir::new().unwrap();
        let gate = ChannelGate::new(config(), JsonDocument::new(dir.path().join("stats.json")));
        let vip = ChannelName::from("VIP Channel");

        for _ in 0..3 {
            let decision = gate.reserve_on(&vip, day(4));
            assert!(!decision.redirected);
            assert!(!decision.is_reserved());
        }
        assert_eq!(gate.free_used_on(day(4)), 0);
    }

    #[test]
    fn test_count_resets_on_new_day() {
        let dir = TempDir::new().unwrap();
        let gate = ChannelGate::new(config(), JsonDocument::new(dir.path().join("stats.json")));
        let free = ChannelName::from("Free Group");

        gate.reserve_on(&free, day(4));
        assert!(gate.reserve_on(&free, day(4)).redirected);
        assert!(!gate.reserve_on(&free, day(5)).redirected);

        assert_eq!(gate.free_used_on(day(5)), 1);
        assert_eq!(gate.free_used_on(day(4)), 0);
    }

    #[test]
    fn test_release_returns_the_slot() {
        let dir = TempDir::new().unwrap();
        let gate = ChannelGate::new(config(), JsonDocument::new(dir.path().join("stats.json")));
        let free = ChannelName::from("Free Group");

        let held = gate.reserve_on(&free, day(4));
        gate.release(&held);
        assert_eq!(gate.free_used_on(day(4)), 0);

        let again = gate.reserve_on(&free, day(4));
        assert_eq!(again.channel, free);

        let redirected = gate.reserve_on(&free, day(4));
        gate.release(&redirected);
        assert_eq!(gate.free_used_on(day(4)), 1);
    }

    #[test]
    fn test_release_after_rollover_leaves_new_day_alone() {
        let dir = TempDir::new().unwrap();
        let gate = ChannelGate::new(config(), JsonDocument::new(dir.path().join("stats.json")));
        let free = ChannelName::from("Free Group");

        let yesterday = gate.reserve_on(&free, day(4));
        gate.reserve_on(&free, day(5));
        gate.release(&yesterday);
        assert_eq!(gate.free_used_on(day(5)), 1);
    }

    #[test]
    fn test_concurrent_reservations_respect_limit() {
        let dir = TempDir::new().unwrap();
        let gate = std::sync::Arc::new(ChannelGate::new(
            config(),
            JsonDocument::new(dir.path().join("stats.json")),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    gate.reserve_on(&ChannelName::from("Free Group"), day(4))
                        .is_reserved()
                })
            })
            .collect();
        let reserved = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| *r)
            .count();

        assert_eq!(reserved, 1);
        assert_eq!(gate.free_used_on(day(4)), 1);
    }

    #[test]
    fn test_usage_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        let free = ChannelName::from("Free Group");

        {
            let gate = ChannelGate::new(config(), JsonDocument::new(&path));
            gate.reserve_on(&free, day(4));
        }

        let gate = ChannelGate::new(config(), JsonDocument::new(&path));
        assert_eq!(gate.free_used_on(day(4)), 1);
        assert!(gate.reserve_on(&free, day(4)).redirected);
    }
}
