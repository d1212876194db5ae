//! Market-data provider trait.
//!
//! Provides a trait-based abstraction over the exchange's public market data,
//! so detection, depth analysis and revalidation can run against a mock.
//! Every method may fail transiently; callers skip the affected candidate.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cdcx_core::{Market, MarketRef, OrderBookSnapshot};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::error::{FeedError, FeedResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Read-only access to exchange market data.
pub trait MarketDataProvider: Send + Sync {
    /// All markets currently listed as active.
    fn list_active_markets(&self) -> BoxFuture<'_, FeedResult<Vec<Market>>>;

    /// Fresh order book for one market.
    fn get_order_book<'a>(
        &'a self,
        market: &'a MarketRef,
    ) -> BoxFuture<'a, FeedResult<OrderBookSnapshot>>;

    /// Last traded price of a ticker symbol (e.g., "USDTINR").
    fn get_last_price<'a>(&'a self, pair_symbol: &'a str) -> BoxFuture<'a, FeedResult<Decimal>>;
}

/// Shared provider handle.
pub type DynMarketData = Arc<dyn MarketDataProvider>;

/// Mock provider for testing.
///
/// Books and prices are scripted per symbol; every call is counted.
#[derive(Debug, Default)]
pub struct MockMarketData {
    markets: Mutex<Vec<Market>>,
    /// Book per market symbol. `Err` simulates a fetch failure.
    books: Mutex<HashMap<String, Result<OrderBookSnapshot, String>>>,
    prices: Mutex<HashMap<String, Decimal>>,
    price_delay: Mutex<Option<Duration>>,
    market_calls: AtomicUsize,
    book_calls: Mutex<Vec<String>>,
    price_calls: Mutex<Vec<String>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_markets(&self, markets: Vec<Market>) {
        *self.markets.lock() = markets;
    }

    pub fn set_book(&self, book: OrderBookSnapshot) {
        self.books.lock().insert(book.symbol.clone(), Ok(book));
    }

    /// Make fetching `symbol`'s book fail.
    pub fn fail_book(&self, symbol: &str, error: &str) {
        self.books
            .lock()
            .insert(symbol.to_string(), Err(error.to_string()));
    }

    pub fn set_price(&self, pair_symbol: &str, price: Decimal) {
        self.prices.lock().insert(pair_symbol.to_string(), price);
    }

    /// Delay every price lookup (to widen race windows in concurrency tests).
    pub fn set_price_delay(&self, delay: Duration) {
        *self.price_delay.lock() = Some(delay);
    }

    pub fn market_calls(&self) -> usize {
        self.market_calls.load(Ordering::SeqCst)
    }

    pub fn book_calls(&self) -> Vec<String> {
        self.book_calls.lock().clone()
    }

    pub fn price_calls(&self) -> Vec<String> {
        self.price_calls.lock().clone()
    }
}

impl MarketDataProvider for MockMarketData {
    fn list_active_markets(&self) -> BoxFuture<'_, FeedResult<Vec<Market>>> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        let markets = self.markets.lock().clone();
        Box::pin(async move { Ok(markets) })
    }

    fn get_order_book<'a>(
        &'a self,
        market: &'a MarketRef,
    ) -> BoxFuture<'a, FeedResult<OrderBookSnapshot>> {
        self.book_calls.lock().push(market.symbol.clone());
        let scripted = self.books.lock().get(&market.symbol).cloned();
        Box::pin(async move {
            match scripted {
                Some(Ok(book)) => Ok(book),
                Some(Err(e)) => Err(FeedError::Network(e)),
                None => Err(FeedError::MarketNotFound(market.symbol.clone())),
            }
        })
    }

    fn get_last_price<'a>(&'a self, pair_symbol: &'a str) -> BoxFuture<'a, FeedResult<Decimal>> {
        self.price_calls.lock().push(pair_symbol.to_string());
        let price = self.prices.lock().get(pair_symbol).copied();
        let delay = *self.price_delay.lock();
        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            price.ok_or_else(|| FeedError::RateUnavailable(pair_symbol.to_string()))
        })
    }
}
