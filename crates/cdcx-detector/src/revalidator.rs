//! Decision-time revalidation.
//!
//! Runs right after the execution lock is acquired. Both books are fetched
//! again and only the top of book is priced, since a market order consumes
//! the top first. Any failure yields a non-viable result with a reason;
//! nothing is propagated.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cdcx_core::{ArbitrageOpportunity, Price, Size};
use cdcx_feed::BookNormalizer;
use cdcx_telemetry::Metrics;

use crate::config::RevalidationConfig;

/// Category of a rejection, used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectKind {
    DataError,
    NoPrice,
    NoArbitrage,
    LowVolume,
    LowMargin,
}

impl RejectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataError => "data_error",
            Self::NoPrice => "no_price",
            Self::NoArbitrage => "no_arbitrage",
            Self::LowVolume => "low_volume",
            Self::LowMargin => "low_margin",
        }
    }
}

/// Opportunity re-priced against fresh books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealTimeOpportunity {
    pub opportunity: ArbitrageOpportunity,
    /// Best ask on the buy market, common unit.
    pub buy_price: Price,
    /// Best bid on the sell market, common unit.
    pub sell_price: Price,
    /// Best ask on the buy market, native quote currency.
    pub buy_price_native: Price,
    /// Per-unit net margin, common unit.
    pub expected_margin: Decimal,
    pub margin_pct: Decimal,
    /// Tradeable volume: min(ask volume, bid volume, max clip). Zero when rejected.
    pub volume: Size,
    pub viable: bool,
    pub reason: String,
    pub reject_kind: Option<RejectKind>,
    pub checked_at: DateTime<Utc>,
}

impl RealTimeOpportunity {
    fn rejected(opportunity: &ArbitrageOpportunity, kind: RejectKind, reason: String) -> Self {
        Self {
            opportunity: opportunity.clone(),
            buy_price: Price::ZERO,
            sell_price: Price::ZERO,
            buy_price_native: Price::ZERO,
            expected_margin: Decimal::ZERO,
            margin_pct: Decimal::ZERO,
            volume: Size::ZERO,
            viable: false,
            reason,
            reject_kind: Some(kind),
            checked_at: Utc::now(),
        }
    }
}

/// Re-prices opportunities against fresh books.
#[derive(Clone)]
pub struct Revalidator {
    normalizer: BookNormalizer,
    config: RevalidationConfig,
}

impl Revalidator {
    pub fn new(normalizer: BookNormalizer, config: RevalidationConfig) -> Self {
        Self { normalizer, config }
    }

    pub fn config(&self) -> &RevalidationConfig {
        &self.config
    }

    pub async fn revalidate(&self, opp: &ArbitrageOpportunity) -> RealTimeOpportunity {
        let result = self.check(opp).await;
        match result.reject_kind {
            Some(kind) => {
                Metrics::revalidation_rejected(kind.as_str());
                warn!(id = %opp.id(), reason = %result.reason, "Opportunity no longer viable");
            }
            None => info!(
                id = %opp.id(),
                buy = %result.buy_price,
                sell = %result.sell_price,
                margin_pct = %result.margin_pct.round_dp(2),
                volume = %result.volume,
                "Opportunity revalidated"
            ),
        }
        result
    }

    async fn check(&self, opp: &ArbitrageOpportunity) -> RealTimeOpportunity {
        let (buy_book, sell_book) = tokio::join!(
            self.normalizer.fetch_normalized(&opp.buy_market),
            self.normalizer.fetch_normalized(&opp.sell_market)
        );

        let buy_book = match buy_book {
            Ok(b) => b,
            Err(e) => {
                return RealTimeOpportunity::rejected(
                    opp,
                    RejectKind::DataError,
                    format!("buy market data error: {e}"),
                )
            }
        };
        let sell_book = match sell_book {
            Ok(b) => b,
            Err(e) => {
                return RealTimeOpportunity::rejected(
                    opp,
                    RejectKind::DataError,
                    format!("sell market data error: {e}"),
                )
            }
        };

        let (ask, bid) = match (buy_book.best_ask(), sell_book.best_bid()) {
            (Some(a), Some(b)) if a.price_common.is_positive() && b.price_common.is_positive() => {
                (*a, *b)
            }
            _ => {
                return RealTimeOpportunity::rejected(
                    opp,
                    RejectKind::NoPrice,
                    "no valid prices available".to_string(),
                )
            }
        };

        let buy = ask.price_common.inner();
        let sell = bid.price_common.inner();
        if sell <= buy {
            return RealTimeOpportunity::rejected(
                opp,
                RejectKind::NoArbitrage,
                format!("no arbitrage: sell {sell} <= buy {buy}"),
            );
        }

        let gross = sell - buy;
        let fee = (buy + sell) * self.config.fee_rate / Decimal::TWO;
        let expected_margin = gross - fee;
        let margin_pct = expected_margin / buy * Decimal::ONE_HUNDRED;

        let mut result = RealTimeOpportunity {
            opportunity: opp.clone(),
            buy_price: ask.price_common,
            sell_price: bid.price_common,
            buy_price_native: ask.price,
            expected_margin,
            margin_pct,
            volume: Size::ZERO,
            viable: false,
            reason: String::new(),
            reject_kind: None,
            checked_at: Utc::now(),
        };

        let max_volume = ask.volume.min(bid.volume);
        if max_volume.inner() < self.config.min_volume {
            result.reason = format!(
                "insufficient volume: {} < {}",
                max_volume,
                self.config.min_volume
            );
            result.reject_kind = Some(RejectKind::LowVolume);
            return result;
        }

        if margin_pct < self.config.stop_loss_pct {
            result.reason = format!(
                "margin too low: {}% < {}%",
                margin_pct.round_dp(2),
                self.config.stop_loss_pct
            );
            result.reject_kind = Some(RejectKind::LowMargin);
            return result;
        }

        result.volume = max_volume.min(Size::new(self.config.max_clip_volume));
        result.viable = true;
        result.reason = "profitable at top of book".to_string();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdcx_core::{MarketRef, OrderBookLevel, OrderBookSnapshot};
    use cdcx_feed::{MemoryRateStore, MockMarketData, RateOracle};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn lvl(p: Decimal, v: Decimal) -> OrderBookLevel {
        OrderBookLevel::new(Price::new(p), Size::new(v))
    }

    fn opportunity() -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            target_currency: "XRP".into(),
            buy_market: MarketRef::new("XRPUSDT", "B-XRP_USDT", "USDT"),
            sell_market: MarketRef::new("XRPINR", "I-XRP_INR", "INR"),
            buy_price_common: Price::new(dec!(100)),
            sell_price_common: Price::new(dec!(110)),
            gross_margin: dec!(10),
            gross_margin_pct: dec!(10),
            fee_estimate: dec!(4.2),
            net_margin: dec!(5.8),
            net_margin_pct: dec!(5.8),
            viable: true,
            computed_at: Utc::now(),
        }
    }

    fn setup(buy_ask: (Decimal, Decimal), sell_bid: (Decimal, Decimal)) -> (Arc<MockMarketData>, Revalidator) {
        let mock = Arc::new(MockMarketData::new());
        mock.set_price("USDTINR", dec!(100));
        mock.set_book(OrderBookSnapshot::from_unsorted(
            "XRPUSDT",
            vec![],
            vec![lvl(buy_ask.0, buy_ask.1)],
        ));
        mock.set_book(OrderBookSnapshot::from_unsorted(
            "XRPINR",
            vec![lvl(sell_bid.0, sell_bid.1)],
            vec![],
        ));
        let oracle = Arc::new(RateOracle::new(
            mock.clone(),
            Arc::new(MemoryRateStore::new()),
            "INR",
        ));
        let normalizer = BookNormalizer::new(mock.clone(), oracle, 10);
        (mock, Revalidator::new(normalizer, RevalidationConfig::default()))
    }

    #[tokio::test]
    async fn test_viable_and_clipped() {
        // ask 1.00 USDT = 100 INR, bid 110 INR
        let (_, r) = setup((dec!(1.00), dec!(8000)), (dec!(110), dec!(6000)));

        let rt = r.revalidate(&opportunity()).await;

        assert!(rt.viable, "{}", rt.reason);
        assert_eq!(rt.buy_price.inner(), dec!(100));
        assert_eq!(rt.buy_price_native.inner(), dec!(1.00));
        // fee = 210 * 0.02 / 2 = 2.1, net = 7.9
        assert_eq!(rt.expected_margin, dec!(7.9));
        assert_eq!(rt.margin_pct, dec!(7.9));
        assert_eq!(rt.volume.inner(), dec!(5000));
    }

    #[tokio::test]
    async fn test_rejects_no_arbitrage() {
        let (_, r) = setup((dec!(1.20), dec!(8000)), (dec!(110), dec!(6000)));
        let rt = r.revalidate(&opportunity()).await;
        assert!(!rt.viable);
        assert_eq!(rt.reject_kind, Some(RejectKind::NoArbitrage));
        assert!(rt.reason.starts_with("no arbitrage: sell 110 <= buy"));
        assert!(rt.volume.is_zero());
    }

    #[tokio::test]
    async fn test_rejects_low_volume() {
        let (_, r) = setup((dec!(1.00), dec!(500)), (dec!(110), dec!(6000)));
        let rt = r.revalidate(&opportunity()).await;
        assert_eq!(rt.reject_kind, Some(RejectKind::LowVolume));
        assert_eq!(rt.reason, "insufficient volume: 500 < 1000");
    }

    #[tokio::test]
    async fn test_rejects_low_margin() {
        // 104 vs 100: gross 4, fee 2.04, net 1.96%
        let (_, r) = setup((dec!(1.00), dec!(8000)), (dec!(104), dec!(6000)));
        let rt = r.revalidate(&opportunity()).await;
        assert_eq!(rt.reject_kind, Some(RejectKind::LowMargin));
        assert_eq!(rt.reason, "margin too low: 1.96% < 3%");
    }

    #[tokio::test]
    async fn test_fetch_failure_is_non_viable() {
        let (mock, r) = setup((dec!(1.00), dec!(8000)), (dec!(110), dec!(6000)));
        mock.fail_book("XRPINR", "connection reset");

        let rt = r.revalidate(&opportunity()).await;

        assert!(!rt.viable);
        assert_eq!(rt.reject_kind, Some(RejectKind::DataError));
        assert!(rt.reason.starts_with("sell market data error:"));
    }

    #[tokio::test]
    async fn test_empty_side_has_no_price() {
        let (mock, r) = setup((dec!(1.00), dec!(8000)), (dec!(110), dec!(6000)));
        mock.set_book(OrderBookSnapshot::from_unsorted("XRPINR", vec![], vec![]));

        let rt = r.revalidate(&opportunity()).await;
        assert_eq!(rt.reason, "no valid prices available");
    }
}
