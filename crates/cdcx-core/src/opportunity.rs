//! Arbitrage opportunity between two markets of the same coin.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::market::MarketRef;
use crate::Price;

/// Buy on `buy_market` at its best ask, sell on `sell_market` at its best bid.
///
/// All prices and margins are in the common unit. Derived and disposable:
/// recomputed whenever prices are refreshed.
///
/// Invariant: `viable` implies `net_margin_pct >= ` the configured minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub target_currency: String,
    pub buy_market: MarketRef,
    pub sell_market: MarketRef,
    pub buy_price_common: Price,
    pub sell_price_common: Price,
    /// Per-unit sell - buy.
    pub gross_margin: Decimal,
    pub gross_margin_pct: Decimal,
    pub fee_estimate: Decimal,
    /// Per-unit gross margin minus fee estimate.
    pub net_margin: Decimal,
    pub net_margin_pct: Decimal,
    pub viable: bool,
    pub computed_at: DateTime<Utc>,
}

impl ArbitrageOpportunity {
    /// Stable identifier used in logs and file names.
    pub fn id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.target_currency, self.buy_market.symbol, self.sell_market.symbol
        )
    }

    pub fn rating(&self) -> OpportunityRating {
        OpportunityRating::from_net_margin_pct(self.net_margin_pct)
    }
}

/// Human-facing quality bucket by net margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityRating {
    Marginal,
    Good,
    VeryGood,
    Excellent,
}

impl OpportunityRating {
    pub fn from_net_margin_pct(pct: Decimal) -> Self {
        if pct >= Decimal::from(5) {
            Self::Excellent
        } else if pct >= Decimal::new(35, 1) {
            Self::VeryGood
        } else if pct >= Decimal::new(25, 1) {
            Self::Good
        } else {
            Self::Marginal
        }
    }
}

impl fmt::Display for OpportunityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marginal => write!(f, "MARGINAL"),
            Self::Good => write!(f, "GOOD"),
            Self::VeryGood => write!(f, "VERY GOOD"),
            Self::Excellent => write!(f, "EXCELLENT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rating_buckets() {
        assert_eq!(
            OpportunityRating::from_net_margin_pct(dec!(5)),
            OpportunityRating::Excellent
        );
        assert_eq!(
            OpportunityRating::from_net_margin_pct(dec!(3.5)),
            OpportunityRating::VeryGood
        );
        assert_eq!(
            OpportunityRating::from_net_margin_pct(dec!(2.99)),
            OpportunityRating::Good
        );
        assert_eq!(
            OpportunityRating::from_net_margin_pct(dec!(-1)),
            OpportunityRating::Marginal
        );
    }

    #[test]
    fn test_id() {
        let opp = ArbitrageOpportunity {
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
        };
        assert_eq!(opp.id(), "XRP_XRPUSDT_XRPINR");
        assert_eq!(opp.rating(), OpportunityRating::Excellent);
    }
}
