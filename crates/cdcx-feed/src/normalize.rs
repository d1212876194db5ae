//! Order-book normalization into the common unit.

use std::sync::Arc;

use cdcx_core::{MarketRef, NormalizedBook, NormalizedLevel, OrderBookSnapshot};
use tracing::debug;

use crate::error::FeedResult;
use crate::provider::DynMarketData;
use crate::rate_oracle::RateOracle;

/// Default number of levels kept per side.
pub const DEFAULT_MAX_LEVELS: usize = 10;

/// Fetches books and converts every level through the [`RateOracle`].
///
/// All levels of one book share the market's quote currency, so a single
/// rate lookup converts the whole book. If that lookup fails the book is
/// unavailable for this cycle.
#[derive(Clone)]
pub struct BookNormalizer {
    provider: DynMarketData,
    oracle: Arc<RateOracle>,
    max_levels: usize,
}

impl BookNormalizer {
    pub fn new(provider: DynMarketData, oracle: Arc<RateOracle>, max_levels: usize) -> Self {
        Self {
            provider,
            oracle,
            max_levels: max_levels.max(1),
        }
    }

    pub fn oracle(&self) -> &Arc<RateOracle> {
        &self.oracle
    }

    pub fn provider(&self) -> &DynMarketData {
        &self.provider
    }

    /// Convert an already-fetched snapshot.
    pub async fn normalize(
        &self,
        market: &MarketRef,
        snapshot: OrderBookSnapshot,
    ) -> FeedResult<NormalizedBook> {
        let snapshot = snapshot.truncated(self.max_levels);
        let rate = self.oracle.rate_to_common(&market.quote_currency).await?;

        let convert = |levels: &[cdcx_core::OrderBookLevel]| {
            NormalizedLevel::accumulate(levels.iter().map(|l| (*l, l.price * rate)))
        };
        let bid_levels = convert(&snapshot.bid_levels);
        let ask_levels = convert(&snapshot.ask_levels);

        debug!(
            market = %market,
            %rate,
            bids = bid_levels.len(),
            asks = ask_levels.len(),
            "Book normalized"
        );

        Ok(NormalizedBook {
            market: market.clone(),
            bid_levels,
            ask_levels,
            fetched_at: snapshot.fetched_at,
        })
    }

    /// Fetch a fresh book and normalize it.
    pub async fn fetch_normalized(&self, market: &MarketRef) -> FeedResult<NormalizedBook> {
        let snapshot = self.provider.get_order_book(market).await?;
        self.normalize(market, snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use crate::provider::MockMarketData;
    use crate::rate_oracle::MemoryRateStore;
    use cdcx_core::{OrderBookLevel, Price, Size};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn lvl(p: Decimal, v: Decimal) -> OrderBookLevel {
        OrderBookLevel::new(Price::new(p), Size::new(v))
    }

    fn setup(max_levels: usize) -> (Arc<MockMarketData>, BookNormalizer) {
        let mock = Arc::new(MockMarketData::new());
        let oracle = Arc::new(RateOracle::new(
            mock.clone(),
            Arc::new(MemoryRateStore::new()),
            "INR",
        ));
        let normalizer = BookNormalizer::new(mock.clone(), oracle, max_levels);
        (mock, normalizer)
    }

    #[tokio::test]
    async fn test_fetch_normalized_converts_and_truncates() {
        let (mock, normalizer) = setup(2);
        mock.set_price("USDTINR", dec!(80));
        mock.set_book(OrderBookSnapshot::from_unsorted(
            "XRPUSDT",
            vec![lvl(dec!(0.50), dec!(10)), lvl(dec!(0.49), dec!(20)), lvl(dec!(0.48), dec!(5))],
            vec![lvl(dec!(0.51), dec!(7))],
        ));

        let market = MarketRef::new("XRPUSDT", "B-XRP_USDT", "USDT");
        let book = normalizer.fetch_normalized(&market).await.unwrap();

        assert_eq!(book.bid_levels.len(), 2);
        let best = book.best_bid().unwrap();
        assert_eq!(best.price_common.inner(), dec!(40));
        assert_eq!(book.bid_levels[1].cumulative_volume.inner(), dec!(30));
        assert_eq!(book.best_ask().unwrap().price_common.inner(), dec!(40.8));
    }

    #[tokio::test]
    async fn test_missing_rate_makes_book_unavailable() {
        let (mock, normalizer) = setup(10);
        mock.set_book(OrderBookSnapshot::from_unsorted(
            "XRPBTC",
            vec![lvl(dec!(0.00001), dec!(10))],
            vec![],
        ));

        let market = MarketRef::new("XRPBTC", "B-XRP_BTC", "BTC");
        let err = normalizer.fetch_normalized(&market).await.unwrap_err();
        assert!(matches!(err, FeedError::RateUnavailable(_)));
    }
}
