//! Application wiring.
//!
//! ```text
//! MarketFeed ──ticks──► LtpCache ─┐
//!                                 ├─ FallbackSource ─► PositionMonitor ─► Notifier
//! RestLtpSource ──────────────────┘                         │
//!                                                     PositionStore (JSON)
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sentinel_core::{Direction, InstrumentRef, PositionId, Price};
use sentinel_feed::{FallbackSource, LtpCache, MarketFeed, RestLtpSource};
use sentinel_instruments::{Instrument, ScripMaster};
use sentinel_notify::{spawn_telegram, ChannelGate, LogNotifier, Notifier};
use sentinel_persistence::JsonDocument;
use sentinel_position::{
    AnyRouter, BrokerRestRouter, NewPosition, PaperRouter, Position, PositionMonitor,
    PositionService, PositionStore, Promotion,
};
use sentinel_telemetry::Metrics;

use crate::config::{AppConfig, OperatingMode};
use crate::error::AppResult;

type Prices = Arc<FallbackSource<Arc<LtpCache>, RestLtpSource>>;
type Service = PositionService<Prices, Arc<dyn Notifier>, AnyRouter>;

/// How long a one-shot command waits for queued notifications.
const NOTIFY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Application {
    config: AppConfig,
    store: Arc<PositionStore>,
    gate: Arc<ChannelGate>,
    cache: Arc<LtpCache>,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let store = Arc::new(PositionStore::load(JsonDocument::new(
            &config.store.positions_path,
        )));
        let gate = Arc::new(ChannelGate::new(
            config.gate_config(),
            JsonDocument::new(&config.store.channel_stats_path),
        ));
        let cache = Arc::new(LtpCache::new(config.max_quote_age()));
        Ok(Self {
            config,
            store,
            gate,
            cache,
        })
    }

    pub fn store(&self) -> &Arc<PositionStore> {
        &self.store
    }

    /// Stored positions, ACTIVE only unless `all`.
    pub fn positions(&self, all: bool) -> Vec<Position> {
        if all {
            self.store.all()
        } else {
            self.store.active()
        }
    }

    /// Load the scrip master, downloading it on first use.
    pub async fn scrip_master(&self) -> AppResult<ScripMaster> {
        let instruments = &self.config.instruments;
        Ok(ScripMaster::load_or_download(
            &instruments.master_path,
            &instruments.master_url,
            Duration::from_secs(instruments.download_timeout_secs),
        )
        .await?)
    }

    /// Symbol search over the scrip master.
    pub async fn search_instruments(&self, query: &str) -> AppResult<Vec<Instrument>> {
        let master = self.scrip_master().await?;
        Ok(master.search(query).into_iter().cloned().collect())
    }

    /// At-the-money index option for `spot`, nearest expiry from today.
    pub async fn resolve_atm(
        &self,
        index: &str,
        spot: Price,
        direction: Direction,
    ) -> AppResult<Instrument> {
        let master = self.scrip_master().await?;
        let today = chrono::Local::now().date_naive();
        let option = master.atm_option(index, spot, direction, today)?;
        info!(
            index,
            spot = %spot,
            symbol = %option.trading_symbol,
            security_id = %option.security_id,
            "ATM option resolved"
        );
        Ok(option.clone())
    }

    /// Create one position and wait for its notifications to go out.
    pub async fn open_position(&self, request: NewPosition) -> AppResult<PositionId> {
        let (notifier, dispatcher) = self.notifier()?;
        let service = self.service(notifier)?;
        let result = service.create_position(request).await;
        drop(service);
        drain(dispatcher).await;
        Ok(result?)
    }

    /// Promote a paper position and wait for its notifications to go out.
    pub async fn promote(&self, id: &PositionId) -> AppResult<Promotion> {
        let (notifier, dispatcher) = self.notifier()?;
        let service = self.service(notifier)?;
        let result = service.promote_to_live(id).await;
        drop(service);
        drain(dispatcher).await;
        Ok(result?)
    }

    /// Run the monitor (and feed, when enabled) until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        let shutdown = CancellationToken::new();
        let (notifier, dispatcher) = self.notifier()?;
        let prices = self.prices()?;

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if self.config.feed.enabled {
            let instruments: BTreeSet<InstrumentRef> =
                self.store.active().iter().map(|p| p.instrument).collect();
            let feed = MarketFeed::new(
                self.config.feed.feed_config(&self.config.broker),
                self.cache.clone(),
                instruments,
                shutdown.clone(),
            );
            tasks.push(tokio::spawn(feed.run()));
        } else {
            info!("Market feed disabled, using REST quotes only");
        }

        if let Some(path) = self.config.telemetry.metrics_file.clone() {
            let interval = Duration::from_secs(self.config.telemetry.metrics_interval_secs);
            tasks.push(tokio::spawn(export_metrics(path, interval, shutdown.clone())));
        }

        let monitor = PositionMonitor::new(
            self.config.monitor.clone(),
            self.store.clone(),
            prices,
            notifier,
        );
        tasks.push(tokio::spawn(monitor.run(shutdown.clone())));

        info!(
            mode = ?self.config.mode,
            active = self.store.active_count(),
            "Sentinel running"
        );

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown.cancel();

        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Task ended abnormally");
            }
        }
        drain(dispatcher).await;

        self.store.flush()?;
        info!(positions = self.store.len(), "Sentinel stopped");
        Ok(())
    }

    fn prices(&self) -> AppResult<Prices> {
        let rest = RestLtpSource::new(self.config.broker.rest_config())?;
        Ok(Arc::new(FallbackSource::new(self.cache.clone(), rest)))
    }

    fn router(&self) -> AppResult<AnyRouter> {
        Ok(match self.config.mode {
            OperatingMode::Paper => AnyRouter::Paper(PaperRouter),
            OperatingMode::Live => {
                AnyRouter::Broker(BrokerRestRouter::new(self.config.broker.rest_config())?)
            }
        })
    }

    fn notifier(&self) -> AppResult<(Arc<dyn Notifier>, Option<JoinHandle<()>>)> {
        if self.config.telegram.enabled {
            let (telegram, handle) = spawn_telegram(self.config.telegram_config())?;
            let notifier: Arc<dyn Notifier> = Arc::new(telegram);
            Ok((notifier, Some(handle)))
        } else {
            let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
            Ok((notifier, None))
        }
    }

    fn service(&self, notifier: Arc<dyn Notifier>) -> AppResult<Service> {
        Ok(PositionService::new(
            self.store.clone(),
            self.prices()?,
            notifier,
            self.router()?,
            self.gate.clone(),
        ))
    }
}

/// Wait for the Telegram dispatcher once every notifier handle is gone.
async fn drain(dispatcher: Option<JoinHandle<()>>) {
    let Some(handle) = dispatcher else {
        return;
    };
    if tokio::time::timeout(NOTIFY_DRAIN_TIMEOUT, handle).await.is_err() {
        warn!("Pending notifications not delivered before exit");
    }
}

async fn export_metrics(path: std::path::PathBuf, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let text = match Metrics::gather_text() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Metrics encode failed");
                        continue;
                    }
                };
                if let Err(e) = tokio::fs::write(&path, text).await {
                    warn!(path = %path.display(), error = %e, "Metrics export failed");
                }
            }
        }
    }
}
