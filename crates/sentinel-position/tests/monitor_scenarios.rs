//! End-to-end monitor cycles against a scripted price source.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use sentinel_core::{Direction, ExitReason};
use sentinel_notify::LifecycleEvent;
use sentinel_persistence::JsonDocument;
use sentinel_position::{FallbackPolicy, MonitorConfig, PositionMonitor, PositionStore};

use common::{instrument, open, px, RecordingNotifier, Reply, ScriptedPrices};

fn store(dir: &TempDir) -> Arc<PositionStore> {
    Arc::new(PositionStore::load(JsonDocument::new(
        dir.path().join("positions.json"),
    )))
}

fn config(fallback: FallbackPolicy) -> MonitorConfig {
    MonitorConfig {
        interval_ms: 10,
        price_timeout_ms: 200,
        fallback,
    }
}

#[tokio::test]
async fn buy_flips_at_t1_then_stops_out_at_break_even_side() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let position = open(1, Direction::Buy, dec!(100), dec!(20));
    let id = position.id.clone();
    store.put(position);

    let prices = Arc::new(ScriptedPrices::new());
    prices.prices(instrument(1), [dec!(105), dec!(115), dec!(125), dec!(79)]);
    let notifier = RecordingNotifier::new();
    let monitor = PositionMonitor::new(
        config(FallbackPolicy::EntryPrice),
        store.clone(),
        prices.clone(),
        notifier.clone(),
    );

    let report = monitor.run_cycle().await;
    assert!(report.target1_hits.is_empty());
    let p = store.get(&id).unwrap();
    assert_eq!(p.stop_loss_price, px(dec!(80)));
    assert_eq!(p.max_excursion_price, px(dec!(105)));

    let report = monitor.run_cycle().await;
    assert_eq!(report.target1_hits, vec![id.clone()]);
    let p = store.get(&id).unwrap();
    assert!(p.target1_hit);
    assert_eq!(p.stop_loss_price, px(dec!(100)));

    monitor.run_cycle().await;
    let p = store.get(&id).unwrap();
    assert_eq!(p.stop_loss_price, px(dec!(100)));
    assert_eq!(p.max_excursion_price, px(dec!(125)));

    let report = monitor.run_cycle().await;
    assert_eq!(report.closed, vec![(id.clone(), ExitReason::StopLossHit)]);
    assert!(store.get(&id).is_none());

    assert_eq!(notifier.kinds(), vec!["target1_hit", "closed"]);
    match notifier.events().last().unwrap() {
        LifecycleEvent::Closed {
            summary,
            reason,
            exit_price,
        } => {
            assert_eq!(*reason, ExitReason::StopLossHit);
            assert_eq!(*exit_price, px(dec!(79)));
            assert_eq!(summary.max_excursion_price, px(dec!(125)));
            assert_eq!(summary.stop_loss_price, px(dec!(100)));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn sell_runs_to_final_target() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let position = open(2, Direction::Sell, dec!(100), dec!(10));
    let id = position.id.clone();
    assert_eq!(position.stop_loss_price, px(dec!(110)));
    store.put(position);

    let prices = ScriptedPrices::new();
    prices.prices(instrument(2), [dec!(96), dec!(70)]);
    let notifier = RecordingNotifier::new();
    let monitor = PositionMonitor::new(
        config(FallbackPolicy::EntryPrice),
        store.clone(),
        prices,
        notifier.clone(),
    );

    let report = monitor.run_cycle().await;
    assert!(report.target1_hits.is_empty());
    assert!(report.closed.is_empty());
    assert!(!store.get(&id).unwrap().target1_hit);
    assert_eq!(store.get(&id).unwrap().max_excursion_price, px(dec!(96)));

    let report = monitor.run_cycle().await;
    assert_eq!(report.closed, vec![(id.clone(), ExitReason::Target5Hit)]);
    assert!(store.is_empty());
    assert_eq!(notifier.kinds().last(), Some(&"closed"));
}

#[tokio::test]
async fn missing_prices_change_nothing_between_stop_and_t1() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let position = open(3, Direction::Buy, dec!(100), dec!(20));
    let id = position.id.clone();
    store.put(position.clone());

    let prices = ScriptedPrices::new();
    prices.push(instrument(3), [Reply::Missing, Reply::Fail, Reply::Price(px(dec!(0)))]);
    let notifier = RecordingNotifier::new();
    let monitor = PositionMonitor::new(
        config(FallbackPolicy::EntryPrice),
        store.clone(),
        prices,
        notifier.clone(),
    );

    for _ in 0..3 {
        let report = monitor.run_cycle().await;
        assert_eq!(report.fallbacks, 1);
        assert!(report.closed.is_empty());
    }

    let after = store.get(&id).unwrap();
    assert_eq!(after, position);
    assert!(notifier.events().is_empty());
}

#[tokio::test]
async fn entry_fallback_after_t1_exits_at_break_even() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let position = open(4, Direction::Buy, dec!(100), dec!(20));
    let id = position.id.clone();
    store.put(position);

    let prices = ScriptedPrices::new();
    prices.push(instrument(4), [Reply::Price(px(dec!(112))), Reply::Missing]);
    let notifier = RecordingNotifier::new();
    let monitor = PositionMonitor::new(
        config(FallbackPolicy::EntryPrice),
        store.clone(),
        prices,
        notifier.clone(),
    );

    monitor.run_cycle().await;
    let report = monitor.run_cycle().await;
    assert_eq!(report.closed, vec![(id, ExitReason::StopLossHit)]);
}

#[tokio::test]
async fn skip_policy_leaves_position_untouched() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let position = open(5, Direction::Buy, dec!(100), dec!(20));
    let id = position.id.clone();
    store.put(position);

    let prices = ScriptedPrices::new();
    prices.push(
        instrument(5),
        [Reply::Price(px(dec!(112))), Reply::Missing, Reply::Fail],
    );
    let notifier = RecordingNotifier::new();
    let monitor = PositionMonitor::new(
        config(FallbackPolicy::Skip),
        store.clone(),
        prices,
        notifier.clone(),
    );

    monitor.run_cycle().await;
    for _ in 0..2 {
        let report = monitor.run_cycle().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.evaluated, 0);
    }
    let p = store.get(&id).unwrap();
    assert!(p.target1_hit);
    assert!(p.is_active());
}

#[tokio::test]
async fn excursion_is_monotonic_across_cycles() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let position = open(6, Direction::Sell, dec!(200), dec!(10));
    let id = position.id.clone();
    store.put(position);

    let prices = ScriptedPrices::new();
    prices.prices(
        instrument(6),
        [dec!(198), dec!(203), dec!(197), dec!(201), dec!(199)],
    );
    let monitor = PositionMonitor::new(
        config(FallbackPolicy::EntryPrice),
        store.clone(),
        prices,
        RecordingNotifier::new(),
    );

    let mut best = px(dec!(200));
    for _ in 0..5 {
        monitor.run_cycle().await;
        let excursion = store.get(&id).unwrap().max_excursion_price;
        assert!(excursion <= best);
        best = excursion;
    }
    assert_eq!(best, px(dec!(197)));
}

#[tokio::test]
async fn closed_position_is_removed_exactly_once_and_persisted() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.put(open(7, Direction::Buy, dec!(100), dec!(20)));

    let prices = ScriptedPrices::new();
    prices.prices(instrument(7), [dec!(75), dec!(75), dec!(75)]);
    let notifier = RecordingNotifier::new();
    let monitor = PositionMonitor::new(
        config(FallbackPolicy::EntryPrice),
        store.clone(),
        prices,
        notifier.clone(),
    );

    let first = monitor.run_cycle().await;
    let second = monitor.run_cycle().await;
    let third = monitor.run_cycle().await;

    assert_eq!(first.closed.len(), 1);
    assert!(second.closed.is_empty() && third.closed.is_empty());
    assert_eq!(notifier.kinds(), vec!["closed"]);

    let reloaded = PositionStore::load(JsonDocument::new(dir.path().join("positions.json")));
    assert!(reloaded.is_empty());
}

#[tokio::test]
async fn failing_position_does_not_block_siblings() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let stalled = open(8, Direction::Buy, dec!(100), dec!(20));
    let healthy = open(9, Direction::Buy, dec!(100), dec!(20));
    let healthy_id = healthy.id.clone();
    store.put(stalled);
    store.put(healthy);

    let prices = ScriptedPrices::new();
    prices.push(instrument(8), [Reply::Stall(Duration::from_secs(5))]);
    prices.prices(instrument(9), [dec!(161)]);
    let monitor = PositionMonitor::new(
        config(FallbackPolicy::EntryPrice),
        store.clone(),
        prices,
        RecordingNotifier::new(),
    );

    let report = monitor.run_cycle().await;
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.fallbacks, 1);
    assert_eq!(report.closed, vec![(healthy_id, ExitReason::Target5Hit)]);
    assert_eq!(store.active_count(), 1);
}

#[tokio::test]
async fn run_loop_stops_on_cancel() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let position = open(10, Direction::Buy, dec!(100), dec!(20));
    let id = position.id.clone();
    store.put(position);

    let prices = ScriptedPrices::new();
    prices.prices(instrument(10), [dec!(50)]);
    let notifier = RecordingNotifier::new();
    let monitor = PositionMonitor::new(
        config(FallbackPolicy::EntryPrice),
        store.clone(),
        prices,
        notifier.clone(),
    );

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(monitor.run(shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(2), async {
        while store.get(&id).is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notifier.kinds(), vec!["closed"]);
}
