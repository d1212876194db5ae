//! Markets and candidate groups.
//!
//! Naming follows the trading view rather than the exchange's field names:
//! the exchange calls the quote currency `base_currency_short_name` and the
//! traded coin `target_currency_short_name`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::Size;

/// Lightweight reference to a market, enough to fetch its book and place orders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketRef {
    /// Order symbol (e.g., "XRPUSDT").
    pub symbol: String,
    /// Trading pair id used by market-data endpoints (e.g., "B-XRP_USDT").
    pub pair: String,
    /// Quote currency prices are denominated in (e.g., "USDT").
    pub quote_currency: String,
}

impl MarketRef {
    pub fn new(
        symbol: impl Into<String>,
        pair: impl Into<String>,
        quote_currency: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            pair: pair.into(),
            quote_currency: quote_currency.into(),
        }
    }
}

impl fmt::Display for MarketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// A tradeable spot market, snapshotted once per analysis cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub symbol: String,
    /// Trading pair id used by market-data endpoints.
    pub trading_pair_id: String,
    pub quote_currency: String,
    /// Coin being traded.
    pub target_currency: String,
    pub min_quantity: Size,
    pub min_notional: Decimal,
    pub active: bool,
}

impl Market {
    /// Reference used by providers and clients.
    pub fn to_ref(&self) -> MarketRef {
        MarketRef {
            symbol: self.symbol.clone(),
            pair: self.trading_pair_id.clone(),
            quote_currency: self.quote_currency.clone(),
        }
    }
}

/// Markets of one target coin across at least two quote currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateGroup {
    pub target_currency: String,
    pub markets: Vec<Market>,
    pub last_updated: DateTime<Utc>,
}

impl CandidateGroup {
    /// Distinct quote currencies in this group.
    pub fn quote_currencies(&self) -> BTreeSet<&str> {
        self.markets
            .iter()
            .map(|m| m.quote_currency.as_str())
            .collect()
    }

    /// A group is usable only with two or more distinct quotes.
    pub fn is_tradeable(&self) -> bool {
        self.quote_currencies().len() >= 2
    }
}
