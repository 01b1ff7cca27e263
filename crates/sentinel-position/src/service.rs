//! Trade placement and paper → live promotion.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use sentinel_core::{
    ChannelName, Direction, InstrumentRef, PositionId, PositionStatus, Price, Quantity,
    TradeMode,
};
use sentinel_feed::PriceSource;
use sentinel_notify::{ChannelDecision, ChannelGate, LifecycleEvent, Notifier};

use crate::error::{PositionError, PositionResult};
use crate::position::{OpenParams, Position};
use crate::router::{OrderRequest, OrderRouter};
use crate::store::PositionStore;

/// A request to open a position.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub symbol: String,
    pub instrument: InstrumentRef,
    pub direction: Direction,
    pub quantity: u32,
    pub risk_distance: Decimal,
    /// Use the current quote when absent.
    pub entry_price: Option<Price>,
    pub mode: TradeMode,
    pub channel: ChannelName,
}

impl NewPosition {
    fn validate(&self) -> PositionResult<Quantity> {
        let quantity = Quantity::new(self.quantity)
            .map_err(|e| PositionError::InvalidPosition(e.to_string()))?;
        if self.risk_distance <= Decimal::ZERO {
            return Err(PositionError::InvalidPosition(format!(
                "risk distance must be positive, got {}",
                self.risk_distance
            )));
        }
        if let Some(entry) = self.entry_price {
            if !entry.is_positive() {
                return Err(PositionError::InvalidPosition(format!(
                    "entry price must be positive, got {entry}"
                )));
            }
        }
        Ok(quantity)
    }
}

/// Ids produced by [`PositionService::promote_to_live`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    /// The paper record, now CONVERTED.
    pub paper_id: PositionId,
    /// The new LIVE position.
    pub live_id: PositionId,
}

pub struct PositionService<P, N, R> {
    store: Arc<PositionStore>,
    prices: P,
    notifier: N,
    router: R,
    gate: Arc<ChannelGate>,
}

impl<P: PriceSource, N: Notifier, R: OrderRouter> PositionService<P, N, R> {
    pub fn new(
        store: Arc<PositionStore>,
        prices: P,
        notifier: N,
        router: R,
        gate: Arc<ChannelGate>,
    ) -> Self {
        Self {
            store,
            prices,
            notifier,
            router,
            gate,
        }
    }

    pub fn store(&self) -> &Arc<PositionStore> {
        &self.store
    }

    /// Validate, route (LIVE only), store and announce a new position.
    ///
    /// A free-channel slot is taken before quoting and routing, and given
    /// back if the position is not created.
    pub async fn create_position(&self, request: NewPosition) -> PositionResult<PositionId> {
        let quantity = request.validate()?;
        let decision = self.gate.reserve(&request.channel);

        match self.place(request, quantity, &decision).await {
            Ok(id) => Ok(id),
            Err(e) => {
                self.gate.release(&decision);
                Err(e)
            }
        }
    }

    async fn place(
        &self,
        request: NewPosition,
        quantity: Quantity,
        decision: &ChannelDecision,
    ) -> PositionResult<PositionId> {
        let entry_price = match request.entry_price {
            Some(price) => price,
            None => self.quote(&request.instrument).await?,
        };

        let position = Position::open(OpenParams {
            symbol: request.symbol,
            instrument: request.instrument,
            direction: request.direction,
            quantity,
            entry_price,
            risk_distance: request.risk_distance,
            mode: request.mode,
            channel: decision.channel.clone(),
        })?;

        if position.mode == TradeMode::Live {
            self.route(&position).await?;
        }

        Ok(self.commit(position, decision.redirected))
    }

    /// Replace an ACTIVE paper position with a live one on the premium channel.
    pub async fn promote_to_live(&self, id: &PositionId) -> PositionResult<Promotion> {
        let paper = self
            .store
            .get(id)
            .ok_or_else(|| PositionError::NotFound(id.to_string()))?;
        if paper.status != PositionStatus::Active || paper.mode != TradeMode::Paper {
            return Err(PositionError::InvalidState(format!(
                "{id} is {} {}, expected ACTIVE PAPER",
                paper.status, paper.mode
            )));
        }

        self.route(&paper).await?;

        let entry_price = match self.quote(&paper.instrument).await {
            Ok(price) => price,
            Err(e) => {
                warn!(position_id = %id, error = %e, "No quote for live entry, using paper entry");
                paper.entry_price
            }
        };

        let live = Position::open(OpenParams {
            symbol: paper.symbol.clone(),
            instrument: paper.instrument,
            direction: paper.direction,
            quantity: paper.quantity,
            entry_price,
            risk_distance: paper.risk_distance,
            mode: TradeMode::Live,
            channel: self.gate.config().premium_channel.clone(),
        })?;

        let mut converted = paper;
        converted.status = PositionStatus::Converted;
        converted.mode = TradeMode::Live;
        if !self.store.replace_if_active(converted) {
            warn!(position_id = %id, "Paper position closed while promoting");
        }

        let live_id = self.commit(live, false);
        info!(paper_id = %id, live_id = %live_id, "Paper position promoted to live");
        Ok(Promotion {
            paper_id: id.clone(),
            live_id,
        })
    }

    /// ACTIVE positions in store order.
    pub fn list_active_positions(&self) -> Vec<Position> {
        self.store.active()
    }

    async fn quote(&self, instrument: &InstrumentRef) -> PositionResult<Price> {
        match self.prices.get_price(instrument).await {
            Ok(Some(price)) if price.is_positive() => Ok(price),
            Ok(_) => Err(PositionError::PriceUnavailable(instrument.to_string())),
            Err(e) => Err(PositionError::PriceUnavailable(format!("{instrument}: {e}"))),
        }
    }

    async fn route(&self, position: &Position) -> PositionResult<()> {
        let request = OrderRequest {
            symbol: position.symbol.clone(),
            instrument: position.instrument,
            direction: position.direction,
            quantity: position.quantity,
        };
        self.router.place_market_order(&request).await?;
        Ok(())
    }

    /// Store, persist and announce.
    fn commit(&self, position: Position, redirected: bool) -> PositionId {
        let id = position.id.clone();
        let summary = position.summary();

        info!(
            position_id = %id,
            symbol = %position.symbol,
            direction = %position.direction,
            quantity = position.quantity.get(),
            mode = %position.mode,
            channel = %position.channel,
            entry = %position.entry_price,
            stop_loss = %position.stop_loss_price,
            redirected,
            "Position opened"
        );

        self.store.put(position);
        // Failure is logged by the store and retried by the monitor.
        let _ = self.store.flush();

        self.notifier.notify(LifecycleEvent::Added {
            channel: summary.channel.clone(),
            position_id: id.clone(),
            symbol: summary.symbol.clone(),
            direction: summary.direction,
            mode: summary.mode,
            redirected,
        });
        self.notifier.notify(LifecycleEvent::Active { summary });
        id
    }
}
