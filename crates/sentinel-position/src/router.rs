//! Market order routing.
//!
//! - [`PaperRouter`]: logs the order and returns a synthetic id
//! - [`BrokerRestRouter`]: intraday market order over the broker REST API
//! - [`AnyRouter`]: runtime choice between the two

use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use sentinel_core::{Direction, InstrumentRef, Quantity};
use sentinel_feed::RestConfig;
use sentinel_telemetry::Metrics;

use crate::error::{PositionError, PositionResult};

/// A market order to open a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol: String,
    pub instrument: InstrumentRef,
    pub direction: Direction,
    pub quantity: Quantity,
}

/// Broker acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub order_id: String,
    pub status: String,
}

pub trait OrderRouter: Send + Sync {
    /// Label used in logs and metrics.
    fn name(&self) -> &'static str;

    fn place_market_order(
        &self,
        request: &OrderRequest,
    ) -> impl Future<Output = PositionResult<OrderAck>> + Send;
}

// ============================================================================
// PaperRouter
// ============================================================================

/// Accepts every order without contacting a broker.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaperRouter;

impl OrderRouter for PaperRouter {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn place_market_order(&self, request: &OrderRequest) -> PositionResult<OrderAck> {
        let order_id = format!("PAPER-{}", Uuid::new_v4().simple());
        info!(
            symbol = %request.symbol,
            instrument = %request.instrument,
            direction = %request.direction,
            quantity = request.quantity.get(),
            %order_id,
            "Paper order accepted"
        );
        Metrics::order_routed(self.name(), true);
        Ok(OrderAck {
            order_id,
            status: "TRADED".to_string(),
        })
    }
}

// ============================================================================
// BrokerRestRouter
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderBody<'a> {
    dhan_client_id: &'a str,
    transaction_type: &'static str,
    exchange_segment: &'static str,
    product_type: &'static str,
    order_type: &'static str,
    validity: &'static str,
    security_id: String,
    quantity: u32,
    price: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderResponse {
    order_id: Option<String>,
    order_status: Option<String>,
}

/// Routes orders to the broker's `orders` endpoint.
pub struct BrokerRestRouter {
    client: Client,
    config: RestConfig,
}

impl BrokerRestRouter {
    pub fn new(config: RestConfig) -> PositionResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PositionError::RoutingFailed(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn orders_url(&self) -> String {
        format!("{}/orders", self.config.base_url.trim_end_matches('/'))
    }

    fn body<'a>(&'a self, request: &OrderRequest) -> PlaceOrderBody<'a> {
        PlaceOrderBody {
            dhan_client_id: &self.config.client_id,
            transaction_type: request.direction.as_str(),
            exchange_segment: request.instrument.segment.as_str(),
            product_type: "INTRADAY",
            order_type: "MARKET",
            validity: "DAY",
            security_id: request.instrument.security_id.to_string(),
            quantity: request.quantity.get(),
            price: 0,
        }
    }

    async fn send(&self, request: &OrderRequest) -> PositionResult<OrderAck> {
        let response = self
            .client
            .post(self.orders_url())
            .header("access-token", &self.config.access_token)
            .header("client-id", &self.config.client_id)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| PositionError::RoutingFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PositionError::RoutingFailed(format!(
                "broker returned {status}: {body}"
            )));
        }

        let parsed: PlaceOrderResponse = response
            .json()
            .await
            .map_err(|e| PositionError::RoutingFailed(format!("bad order response: {e}")))?;
        let order_id = parsed
            .order_id
            .ok_or_else(|| PositionError::RoutingFailed("order response missing orderId".to_string()))?;

        Ok(OrderAck {
            order_id,
            status: parsed.order_status.unwrap_or_default(),
        })
    }
}

impl OrderRouter for BrokerRestRouter {
    fn name(&self) -> &'static str {
        "broker"
    }

    async fn place_market_order(&self, request: &OrderRequest) -> PositionResult<OrderAck> {
        match self.send(request).await {
            Ok(ack) => {
                info!(
                    symbol = %request.symbol,
                    instrument = %request.instrument,
                    direction = %request.direction,
                    quantity = request.quantity.get(),
                    order_id = %ack.order_id,
                    status = %ack.status,
                    "Broker order placed"
                );
                Metrics::order_routed(self.name(), true);
                Ok(ack)
            }
            Err(e) => {
                warn!(symbol = %request.symbol, error = %e, "Broker order failed");
                Metrics::order_routed(self.name(), false);
                Err(e)
            }
        }
    }
}

// ============================================================================
// AnyRouter
// ============================================================================

/// Router selected from configuration at startup.
pub enum AnyRouter {
    Paper(PaperRouter),
    Broker(BrokerRestRouter),
}

impl OrderRouter for AnyRouter {
    fn name(&self) -> &'static str {
        match self {
            Self::Paper(r) => r.name(),
            Self::Broker(r) => r.name(),
        }
    }

    async fn place_market_order(&self, request: &OrderRequest) -> PositionResult<OrderAck> {
        match self {
            Self::Paper(r) => r.place_market_order(request).await,
            Self::Broker(r) => r.place_market_order(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{SecurityId, Segment};

    fn request() -> OrderRequest {
        OrderRequest {
            symbol: "NIFTY 22500 CE".to_string(),
            instrument: InstrumentRef::new(SecurityId(43251), Segment::NseFno),
            direction: Direction::Sell,
            quantity: Quantity::new(75).unwrap(),
        }
    }

    #[test]
    fn test_order_body_shape() {
        let router =
            BrokerRestRouter::new(RestConfig::new("https://api.example.com/v2/", "1100", "tok"))
                .unwrap();
        let body = serde_json::to_value(router.body(&request())).unwrap();

        assert_eq!(router.orders_url(), "https://api.example.com/v2/orders");
        assert_eq!(body["dhanClientId"], "1100");
        assert_eq!(body["transactionType"], "SELL");
        assert_eq!(body["exchangeSegment"], "NSE_FNO");
        assert_eq!(body["productType"], "INTRADAY");
        assert_eq!(body["orderType"], "MARKET");
        assert_eq!(body["validity"], "DAY");
        assert_eq!(body["securityId"], "43251");
        assert_eq!(body["quantity"], 75);
        assert_eq!(body["price"], 0);
    }

    #[test]
    fn test_order_response_parse() {
        let parsed: PlaceOrderResponse =
            serde_json::from_str(r#"{"orderId":"112111182198","orderStatus":"PENDING"}"#).unwrap();
        assert_eq!(parsed.order_id.as_deref(), Some("112111182198"));
        assert_eq!(parsed.order_status.as_deref(), Some("PENDING"));
    }

    #[tokio::test]
    async fn test_paper_router_accepts() {
        let router = AnyRouter::Paper(PaperRouter);
        let ack = router.place_market_order(&request()).await.unwrap();

        assert_eq!(router.name(), "paper");
        assert!(ack.order_id.starts_with("PAPER-"));
    }

    #[tokio::test]
    async fn test_broker_router_unreachable_is_routing_failure() {
        let mut config = RestConfig::new("http://127.0.0.1:9", "1100", "tok");
        config.timeout = std::time::Duration::from_millis(500);
        let router = BrokerRestRouter::new(config).unwrap();

        let err = router.place_market_order(&request()).await.unwrap_err();
        assert!(matches!(err, PositionError::RoutingFailed(_)));
    }
}
