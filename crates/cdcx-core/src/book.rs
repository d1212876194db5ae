//! Order-book snapshots.
//!
//! `OrderBookSnapshot` holds levels in the market's native quote currency.
//! `NormalizedBook` holds the same levels with every price also expressed in
//! the common unit, which is what cross-market comparisons operate on.
//! Both are immutable once built; a decision needs a fresh fetch.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::MarketRef;
use crate::{Price, Size};

/// One price level in native quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Price,
    pub volume: Size,
}

impl OrderBookLevel {
    pub fn new(price: Price, volume: Size) -> Self {
        Self { price, volume }
    }

    /// A level is usable when both price and volume are positive.
    pub fn is_valid(&self) -> bool {
        self.price.is_positive() && self.volume.is_positive()
    }
}

/// Order book of one market at one point in time.
///
/// Invariant: `bid_levels` descending by price, `ask_levels` ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: String,
    pub bid_levels: Vec<OrderBookLevel>,
    pub ask_levels: Vec<OrderBookLevel>,
    pub fetched_at: DateTime<Utc>,
}

impl OrderBookSnapshot {
    /// Build a snapshot from unsorted levels.
    ///
    /// Invalid levels (zero/negative price or volume) are dropped and both
    /// sides are sorted best-first.
    pub fn from_unsorted(
        symbol: impl Into<String>,
        bids: impl IntoIterator<Item = OrderBookLevel>,
        asks: impl IntoIterator<Item = OrderBookLevel>,
    ) -> Self {
        let mut bid_levels: Vec<_> = bids.into_iter().filter(|l| l.is_valid()).collect();
        let mut ask_levels: Vec<_> = asks.into_iter().filter(|l| l.is_valid()).collect();
        bid_levels.sort_by(|a, b| b.price.cmp(&a.price));
        ask_levels.sort_by(|a, b| a.price.cmp(&b.price));

        Self {
            symbol: symbol.into(),
            bid_levels,
            ask_levels,
            fetched_at: Utc::now(),
        }
    }

    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bid_levels.first()
    }

    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.ask_levels.first()
    }

    /// best ask - best bid.
    pub fn spread(&self) -> Option<Price> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    /// Spread as a percentage of the best ask.
    pub fn spread_pct(&self) -> Option<Decimal> {
        let ask = self.best_ask()?.price;
        if ask.is_zero() {
            return None;
        }
        Some(self.spread()?.inner() / ask.inner() * Decimal::ONE_HUNDRED)
    }

    pub fn total_bid_volume(&self) -> Size {
        self.bid_levels
            .iter()
            .fold(Size::ZERO, |acc, l| acc + l.volume)
    }

    pub fn total_ask_volume(&self) -> Size {
        self.ask_levels
            .iter()
            .fold(Size::ZERO, |acc, l| acc + l.volume)
    }

    /// Keep only the best `max_levels` on each side.
    pub fn truncated(mut self, max_levels: usize) -> Self {
        self.bid_levels.truncate(max_levels);
        self.ask_levels.truncate(max_levels);
        self
    }
}

/// A level with its price converted into the common unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedLevel {
    /// Native price.
    pub price: Price,
    pub volume: Size,
    /// Price in the common unit.
    pub price_common: Price,
    /// Volume of this level plus all better levels on the same side.
    pub cumulative_volume: Size,
    /// volume * price_common.
    pub volume_common: Decimal,
}

impl NormalizedLevel {
    /// Attach running cumulative volume to already-sorted `(level, price_common)` pairs.
    pub fn accumulate(levels: impl IntoIterator<Item = (OrderBookLevel, Price)>) -> Vec<Self> {
        let mut cumulative = Size::ZERO;
        levels
            .into_iter()
            .map(|(level, price_common)| {
                cumulative = cumulative + level.volume;
                Self {
                    price: level.price,
                    volume: level.volume,
                    price_common,
                    cumulative_volume: cumulative,
                    volume_common: level.volume.notional(price_common),
                }
            })
            .collect()
    }
}

/// Order book with common-unit prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedBook {
    pub market: MarketRef,
    pub bid_levels: Vec<NormalizedLevel>,
    pub ask_levels: Vec<NormalizedLevel>,
    pub fetched_at: DateTime<Utc>,
}

impl NormalizedBook {
    pub fn best_bid(&self) -> Option<&NormalizedLevel> {
        self.bid_levels.first()
    }

    pub fn best_ask(&self) -> Option<&NormalizedLevel> {
        self.ask_levels.first()
    }
}
