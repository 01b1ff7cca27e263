//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;

use sentinel_core::{
    ChannelName, Direction, InstrumentRef, Price, Quantity, SecurityId, Segment, TradeMode,
};
use sentinel_feed::{FeedError, FeedResult, PriceSource};
use sentinel_notify::{LifecycleEvent, Notifier};
use sentinel_position::{
    OpenParams, OrderAck, OrderRequest, OrderRouter, Position, PositionError, PositionResult,
};

pub fn instrument(id: u32) -> InstrumentRef {
    InstrumentRef::new(SecurityId(id), Segment::NseFno)
}

pub fn px(value: Decimal) -> Price {
    Price::new(value)
}

pub fn open(id: u32, direction: Direction, entry: Decimal, risk: Decimal) -> Position {
    Position::open(OpenParams {
        symbol: format!("OPT{id}"),
        instrument: instrument(id),
        direction,
        quantity: Quantity::new(50).unwrap(),
        entry_price: px(entry),
        risk_distance: risk,
        mode: TradeMode::Paper,
        channel: ChannelName::from("Free Group"),
    })
    .unwrap()
}

/// One scripted reply per call, per instrument.
#[derive(Debug, Clone)]
pub enum Reply {
    Price(Price),
    Missing,
    Fail,
    Stall(Duration),
}

/// Price source that replays a script. An exhausted script answers `Missing`.
#[derive(Default)]
pub struct ScriptedPrices {
    scripts: Mutex<HashMap<InstrumentRef, VecDeque<Reply>>>,
}

impl ScriptedPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, instrument: InstrumentRef, replies: impl IntoIterator<Item = Reply>) {
        self.scripts
            .lock()
            .entry(instrument)
            .or_default()
            .extend(replies);
    }

    pub fn prices(&self, instrument: InstrumentRef, values: impl IntoIterator<Item = Decimal>) {
        self.push(instrument, values.into_iter().map(|v| Reply::Price(px(v))));
    }

    fn next(&self, instrument: &InstrumentRef) -> Reply {
        self.scripts
            .lock()
            .get_mut(instrument)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply::Missing)
    }
}

impl PriceSource for ScriptedPrices {
    async fn get_price(&self, instrument: &InstrumentRef) -> FeedResult<Option<Price>> {
        match self.next(instrument) {
            Reply::Price(price) => Ok(Some(price)),
            Reply::Missing => Ok(None),
            Reply::Fail => Err(FeedError::Decode("scripted failure".to_string())),
            Reply::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Ok(None)
            }
        }
    }
}

/// Records every event it receives.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(LifecycleEvent::kind).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: LifecycleEvent) {
        self.events.lock().push(event);
    }
}

/// Router that records requests and optionally rejects or delays them.
#[derive(Clone, Default)]
pub struct FakeRouter {
    pub reject: bool,
    pub delay: Option<Duration>,
    orders: Arc<Mutex<Vec<OrderRequest>>>,
}

impl FakeRouter {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().clone()
    }
}

impl OrderRouter for FakeRouter {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn place_market_order(&self, request: &OrderRequest) -> PositionResult<OrderAck> {
        self.orders.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject {
            return Err(PositionError::RoutingFailed("rejected by broker".to_string()));
        }
        Ok(OrderAck {
            order_id: format!("ORD{}", self.orders.lock().len()),
            status: "TRADED".to_string(),
        })
    }
}
