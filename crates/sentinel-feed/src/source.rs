//! Price source trait and in-memory implementations.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

use sentinel_core::{InstrumentRef, Price};

use crate::error::FeedResult;

/// Source of last-traded prices.
///
/// `Ok(None)` means the source answered but has no usable quote; `Err`
/// means the source itself failed. Callers bound the call with their own
/// timeout.
pub trait PriceSource: Send + Sync {
    fn get_price(
        &self,
        instrument: &InstrumentRef,
    ) -> impl Future<Output = FeedResult<Option<Price>>> + Send;
}

impl<P: PriceSource> PriceSource for Arc<P> {
    fn get_price(
        &self,
        instrument: &InstrumentRef,
    ) -> impl Future<Output = FeedResult<Option<Price>>> + Send {
        (**self).get_price(instrument)
    }
}

/// Cached last-traded price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub price: Price,
    pub received_at: Instant,
}

/// Last-traded-price cache written by the market feed.
///
/// Quotes older than `max_age` are treated as missing so a dead feed
/// cannot keep serving a frozen price.
#[derive(Debug)]
pub struct LtpCache {
    quotes: DashMap<InstrumentRef, Quote>,
    max_age: Duration,
}

impl LtpCache {
    #[must_use]
    pub fn new(max_age: Duration) -> Self {
        Self {
            quotes: DashMap::new(),
            max_age,
        }
    }

    /// Store a quote. Zero or negative prices are ignored.
    pub fn update(&self, instrument: InstrumentRef, price: Price) {
        if !price.is_positive() {
            trace!(%instrument, %price, "Ignoring non-positive quote");
            return;
        }
        self.quotes.insert(
            instrument,
            Quote {
                price,
                received_at: Instant::now(),
            },
        );
    }

    /// Fresh quote for `instrument`, if any.
    pub fn latest(&self, instrument: &InstrumentRef) -> Option<Price> {
        self.latest_at(instrument, Instant::now())
    }

    fn latest_at(&self, instrument: &InstrumentRef, now: Instant) -> Option<Price> {
        let quote = *self.quotes.get(instrument)?;
        if now.saturating_duration_since(quote.received_at) > self.max_age {
            return None;
        }
        Some(quote.price)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl PriceSource for LtpCache {
    async fn get_price(&self, instrument: &InstrumentRef) -> FeedResult<Option<Price>> {
        Ok(self.latest(instrument))
    }
}

/// Queries `primary`, then `secondary` when the primary has no quote or fails.
#[derive(Debug)]
pub struct FallbackSource<A, B> {
    primary: A,
    secondary: B,
}

impl<A, B> FallbackSource<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }
}

impl<A: PriceSource, B: PriceSource> PriceSource for FallbackSource<A, B> {
    async fn get_price(&self, instrument: &InstrumentRef) -> FeedResult<Option<Price>> {
        match self.primary.get_price(instrument).await {
            Ok(Some(price)) => Ok(Some(price)),
            Ok(None) | Err(_) => self.secondary.get_price(instrument).await,
        }
    }
}
