//! Exchange payload parsing.
//!
//! The public order-book endpoint returns each side as a map of
//! price string to volume, where the volume is sometimes a string and
//! sometimes a JSON number:
//!
//! ```json
//! {"bids": {"88.12": "150.5", "88.10": 20}, "asks": {"88.20": "10"}}
//! ```
//!
//! Entries that do not parse are dropped rather than failing the book.

use std::collections::HashMap;

use cdcx_core::{OrderBookLevel, OrderBookSnapshot, Price, Size};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{FeedError, FeedResult};

/// Raw order book as returned by the exchange.
#[derive(Debug, Default, Deserialize)]
pub struct RawOrderBook {
    #[serde(default)]
    pub bids: HashMap<String, Value>,
    #[serde(default)]
    pub asks: HashMap<String, Value>,
}

/// One row of the ticker endpoint. Only the fields this crate reads.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTicker {
    pub market: String,
    #[serde(default)]
    pub last_price: Value,
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

fn parse_side(symbol: &str, side: &str, raw: &HashMap<String, Value>) -> Vec<OrderBookLevel> {
    raw.iter()
        .filter_map(|(price_str, volume)| {
            let price = Price::parse_non_negative(price_str).ok();
            let volume = decimal_from_value(volume).map(Size::new);
            match (price, volume) {
                (Some(price), Some(volume)) => Some(OrderBookLevel::new(price, volume)),
                _ => {
                    debug!(%symbol, side, price = %price_str, "Skipping unparseable book level");
                    None
                }
            }
        })
        .collect()
}

/// Convert a raw book into a sorted snapshot.
pub fn parse_order_book(symbol: &str, raw: &RawOrderBook) -> OrderBookSnapshot {
    let bids = parse_side(symbol, "bid", &raw.bids);
    let asks = parse_side(symbol, "ask", &raw.asks);
    OrderBookSnapshot::from_unsorted(symbol, bids, asks)
}

/// Find the last price of `market` in ticker rows.
pub fn parse_ticker_price(rows: &[RawTicker], market: &str) -> FeedResult<Decimal> {
    let row = rows
        .iter()
        .find(|r| r.market == market)
        .ok_or_else(|| FeedError::RateUnavailable(format!("no ticker for {market}")))?;

    let price = decimal_from_value(&row.last_price).ok_or_else(|| {
        FeedError::ParseError(format!("bad last_price for {market}: {}", row.last_price))
    })?;

    if price <= Decimal::ZERO {
        return Err(FeedError::InvalidData(format!(
            "non-positive last_price for {market}: {price}"
        )));
    }
    Ok(price)
}
