//! Broker REST last-traded-price source.
//!
//! `POST {base_url}/marketfeed/ltp` with a body of segment → security ids:
//!
//! ```text
//! request:  {"NSE_FNO": [49081]}
//! response: {"status": "success",
//!            "data": {"NSE_FNO": {"49081": {"last_price": 368.15}}}}
//! ```

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use sentinel_core::{InstrumentRef, Price};

use crate::error::{FeedError, FeedResult};
use crate::source::PriceSource;

/// Default request timeout; a stalled quote must not stall the monitor.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Connection settings for the broker REST API.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// API base, e.g. `https://api.dhan.co/v2`.
    pub base_url: String,
    pub client_id: String,
    pub access_token: String,
    pub timeout: Duration,
}

impl RestConfig {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: client_id.into(),
            access_token: access_token.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LtpResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: HashMap<String, HashMap<String, LtpEntry>>,
}

#[derive(Debug, Deserialize)]
struct LtpEntry {
    last_price: Option<f64>,
}

/// Polls the broker REST API for last-traded prices.
pub struct RestLtpSource {
    client: Client,
    config: RestConfig,
}

impl RestLtpSource {
    pub fn new(config: RestConfig) -> FeedResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn ltp_url(&self) -> String {
        format!("{}/marketfeed/ltp", self.config.base_url.trim_end_matches('/'))
    }

    async fn fetch(&self, instrument: &InstrumentRef) -> FeedResult<Option<Price>> {
        let mut body = HashMap::new();
        body.insert(instrument.segment.as_str(), vec![instrument.security_id.get()]);

        let response = self
            .client
            .post(self.ltp_url())
            .header("access-token", &self.config.access_token)
            .header("client-id", &self.config.client_id)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: LtpResponse = response.json().await?;
        extract_ltp(&parsed, instrument)
    }
}

fn extract_ltp(response: &LtpResponse, instrument: &InstrumentRef) -> FeedResult<Option<Price>> {
    if let Some(status) = response.status.as_deref() {
        if status != "success" {
            return Err(FeedError::Decode(format!("status={status}")));
        }
    }

    let price = response
        .data
        .get(instrument.segment.as_str())
        .and_then(|by_id| by_id.get(&instrument.security_id.to_string()))
        .and_then(|entry| entry.last_price)
        .and_then(Price::from_wire_f64)
        .filter(Price::is_positive);

    Ok(price)
}

impl PriceSource for RestLtpSource {
    async fn get_price(&self, instrument: &InstrumentRef) -> FeedResult<Option<Price>> {
        match self.fetch(instrument).await {
            Ok(price) => {
                debug!(%instrument, price = ?price, "REST LTP");
                Ok(price)
            }
            Err(e) => {
                warn!(%instrument, error = %e, "REST LTP request failed");
                Err(e)
            }
        }
    }
}
