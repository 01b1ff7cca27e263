//! WebSocket market feed that keeps an [`LtpCache`] warm.
//!
//! Handles connection lifecycle, reconnection after a fixed delay, and
//! re-subscription of every instrument after each reconnect.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use sentinel_core::InstrumentRef;
use sentinel_telemetry::Metrics;

use crate::error::{FeedError, FeedResult};
use crate::parser::{parse_frame, FeedPacket, ParsedFrame};
use crate::source::LtpCache;

/// Subscribe request code for ticker packets.
const REQUEST_CODE_TICKER: u8 = 15;

/// The broker accepts at most this many instruments per subscribe message.
const MAX_INSTRUMENTS_PER_REQUEST: usize = 100;

/// Market feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket endpoint without query string.
    pub url: String,
    pub client_id: String,
    pub access_token: String,
    /// Delay before reconnecting after any disconnect.
    pub reconnect_delay: Duration,
}

impl FeedConfig {
    /// Full connect URL with auth query parameters.
    pub fn connect_url(&self) -> String {
        format!(
            "{}?version=2&token={}&clientId={}&authType=2",
            self.url, self.access_token, self.client_id
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SubscribeRequest {
    request_code: u8,
    instrument_count: usize,
    instrument_list: Vec<SubscribeInstrument>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SubscribeInstrument {
    exchange_segment: &'static str,
    security_id: String,
}

/// Build subscribe messages for `instruments`, chunked to the broker limit.
fn subscribe_messages<'a>(
    instruments: impl IntoIterator<Item = &'a InstrumentRef>,
) -> FeedResult<Vec<String>> {
    let all: Vec<&InstrumentRef> = instruments.into_iter().collect();
    all.chunks(MAX_INSTRUMENTS_PER_REQUEST)
        .map(|chunk| {
            let request = SubscribeRequest {
                request_code: REQUEST_CODE_TICKER,
                instrument_count: chunk.len(),
                instrument_list: chunk
                    .iter()
                    .map(|i| SubscribeInstrument {
                        exchange_segment: i.segment.as_str(),
                        security_id: i.security_id.to_string(),
                    })
                    .collect(),
            };
            serde_json::to_string(&request).map_err(FeedError::from)
        })
        .collect()
}

/// WebSocket market feed task.
pub struct MarketFeed {
    config: FeedConfig,
    cache: Arc<LtpCache>,
    subscriptions: BTreeSet<InstrumentRef>,
    shutdown: CancellationToken,
}

impl MarketFeed {
    /// Create the feed. Nothing connects until [`run`](Self::run).
    pub fn new(
        config: FeedConfig,
        cache: Arc<LtpCache>,
        instruments: impl IntoIterator<Item = InstrumentRef>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            cache,
            subscriptions: instruments.into_iter().collect(),
            shutdown,
        }
    }

    /// Run until the shutdown token is cancelled, reconnecting on any error.
    pub async fn run(self) {
        info!(
            url = %self.config.url,
            instruments = self.subscriptions.len(),
            "MarketFeed started"
        );

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.session().await {
                Ok(()) => info!("Market feed session ended"),
                Err(e) => {
                    error!(error = %e, "Market feed session failed");
                    Metrics::feed_reconnect(reconnect_reason(&e));
                }
            }
            Metrics::feed_disconnected();

            if self.shutdown.is_cancelled() {
                break;
            }

            warn!(
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "Reconnecting market feed"
            );
            tokio::select! {
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
                () = self.shutdown.cancelled() => break,
            }
        }

        Metrics::feed_disconnected();
        info!("MarketFeed stopped");
    }

    async fn session(&self) -> FeedResult<()> {
        let (ws, _response) = connect_async(self.config.connect_url()).await?;
        let (mut write, mut read) = ws.split();
        Metrics::feed_connected();
        info!("Market feed connected");

        for msg in subscribe_messages(&self.subscriptions)? {
            write.send(Message::Text(msg)).await?;
        }
        debug!(count = self.subscriptions.len(), "Subscriptions restored");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => self.on_binary(&data)?,
                        Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                        Some(Ok(Message::Text(text))) => debug!(%text, "Feed text message"),
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            return Err(FeedError::ConnectionClosed { code, reason });
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn on_binary(&self, data: &[u8]) -> FeedResult<()> {
        let ParsedFrame { packets, errors } = parse_frame(data);
        for e in &errors {
            debug!(error = %e, len = data.len(), "Skipping malformed packet");
        }

        for packet in packets {
            match packet {
                FeedPacket::Ticker {
                    instrument, ltp, ..
                } => {
                    trace!(%instrument, %ltp, "Tick");
                    self.cache.update(instrument, ltp);
                    Metrics::feed_tick();
                }
                FeedPacket::Disconnect { reason } => {
                    return Err(FeedError::ServerDisconnect(reason));
                }
                FeedPacket::Ignored { code } => trace!(code, "Ignored packet"),
            }
        }
        Ok(())
    }
}

fn reconnect_reason(e: &FeedError) -> &'static str {
    match e {
        FeedError::ConnectionClosed { .. } => "closed",
        FeedError::ServerDisconnect(_) => "server_disconnect",
        FeedError::Tungstenite(_) => "transport",
        _ => "other",
    }
}
