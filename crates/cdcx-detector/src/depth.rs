//! Order-book depth profitability.
//!
//! [`simulate`] walks the buy market's asks (cheapest first) against the
//! sell market's bids (richest first), like merging two sorted streams.
//! Each step trades the smaller of the two remaining level volumes. The
//! walk stops at the first step whose net margin falls below the
//! threshold: asks only get dearer and bids only get cheaper further in,
//! so no later step can do better.
//!
//! Per step, with prices in the common unit:
//!
//! ```text
//! gross      = bid - ask
//! fee        = volume * ask * fee_rate
//! net_profit = gross * volume - fee
//! net_pct    = net_profit / (volume * ask) * 100
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cdcx_core::{ArbitrageOpportunity, MarketRef, NormalizedBook, NormalizedLevel, Price, Size};
use cdcx_feed::BookNormalizer;
use cdcx_telemetry::Metrics;

use crate::config::DetectorConfig;
use crate::error::DetectorResult;

/// One simulated buy+sell step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedFill {
    /// 1-based.
    pub fill_number: usize,
    /// Ask price, common unit.
    pub buy_price: Price,
    /// Bid price, common unit.
    pub sell_price: Price,
    pub volume: Size,
    /// volume * buy_price.
    pub notional: Decimal,
    pub gross_margin: Decimal,
    pub fee: Decimal,
    pub net_profit: Decimal,
    pub net_margin_pct: Decimal,
    pub cumulative_volume: Size,
    pub cumulative_profit: Decimal,
}

/// Which side ran out of levels first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BottleneckSide {
    Buy,
    Sell,
    /// The walk ended on margin, not on volume.
    None,
}

impl fmt::Display for BottleneckSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Why the walk ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    AsksExhausted,
    BidsExhausted,
    NoGrossMargin { buy_price: Price, sell_price: Price },
    MarginBelowThreshold {
        net_margin_pct: Decimal,
        min_net_margin_pct: Decimal,
    },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsksExhausted => write!(f, "buy side asks exhausted"),
            Self::BidsExhausted => write!(f, "sell side bids exhausted"),
            Self::NoGrossMargin {
                buy_price,
                sell_price,
            } => write!(f, "no gross margin: sell {sell_price} <= buy {buy_price}"),
            Self::MarginBelowThreshold {
                net_margin_pct,
                min_net_margin_pct,
            } => write!(
                f,
                "net margin {}% < {}%",
                net_margin_pct.round_dp(2).normalize(),
                min_net_margin_pct.normalize()
            ),
        }
    }
}

/// Output of one depth walk.
///
/// Invariants: `max_profitable_fills == fills.len()`, and
/// `fills[i].net_margin_pct` is non-increasing in `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSimulationResult {
    pub buy_market: MarketRef,
    pub sell_market: MarketRef,
    pub fills: Vec<SimulatedFill>,
    pub max_profitable_fills: usize,
    pub total_volume: Size,
    pub total_profit: Decimal,
    pub bottleneck_side: BottleneckSide,
    pub stop_reason: StopReason,
}

impl DepthSimulationResult {
    /// At least one fill cleared the threshold.
    pub fn viable(&self) -> bool {
        !self.fills.is_empty()
    }

    pub fn rating(&self) -> DepthRating {
        DepthRating::from_fill_count(self.max_profitable_fills)
    }
}

fn usable(level: &&NormalizedLevel) -> bool {
    level.volume.is_positive() && level.price_common.is_positive()
}

/// Walk `buy_book`'s asks against `sell_book`'s bids.
///
/// `fee_rate` is a fraction (0.02 = 2%); `min_net_margin_pct` is in percent.
/// Pure: no I/O, no shared state.
pub fn simulate(
    buy_book: &NormalizedBook,
    sell_book: &NormalizedBook,
    fee_rate: Decimal,
    min_net_margin_pct: Decimal,
) -> DepthSimulationResult {
    let asks: Vec<&NormalizedLevel> = buy_book.ask_levels.iter().filter(usable).collect();
    let bids: Vec<&NormalizedLevel> = sell_book.bid_levels.iter().filter(usable).collect();

    let mut ai = 0;
    let mut bi = 0;
    let mut ask_left = asks.first().map(|l| l.volume).unwrap_or(Size::ZERO);
    let mut bid_left = bids.first().map(|l| l.volume).unwrap_or(Size::ZERO);

    let mut fills: Vec<SimulatedFill> = Vec::new();
    let mut cumulative_volume = Size::ZERO;
    let mut cumulative_profit = Decimal::ZERO;

    let (bottleneck_side, stop_reason) = loop {
        // Asks are checked first, so running out of both at once reports the buy side
        if ai >= asks.len() {
            break (BottleneckSide::Buy, StopReason::AsksExhausted);
        }
        if bi >= bids.len() {
            break (BottleneckSide::Sell, StopReason::BidsExhausted);
        }

        let ask = asks[ai];
        let bid = bids[bi];
        let volume = ask_left.min(bid_left);

        let gross_margin = bid.price_common.inner() - ask.price_common.inner();
        if gross_margin <= Decimal::ZERO {
            break (
                BottleneckSide::None,
                StopReason::NoGrossMargin {
                    buy_price: ask.price_common,
                    sell_price: bid.price_common,
                },
            );
        }

        let notional = volume.notional(ask.price_common);
        let fee = notional * fee_rate;
        let net_profit = gross_margin * volume.inner() - fee;
        let net_margin_pct = net_profit / notional * Decimal::ONE_HUNDRED;

        debug!(
            fill = fills.len() + 1,
            %volume,
            buy = %ask.price_common,
            sell = %bid.price_common,
            %net_margin_pct,
            "Depth step"
        );

        if net_margin_pct < min_net_margin_pct {
            break (
                BottleneckSide::None,
                StopReason::MarginBelowThreshold {
                    net_margin_pct,
                    min_net_margin_pct,
                },
            );
        }

        cumulative_volume = cumulative_volume + volume;
        cumulative_profit += net_profit;
        fills.push(SimulatedFill {
            fill_number: fills.len() + 1,
            buy_price: ask.price_common,
            sell_price: bid.price_common,
            volume,
            notional,
            gross_margin,
            fee,
            net_profit,
            net_margin_pct,
            cumulative_volume,
            cumulative_profit,
        });

        ask_left = ask_left - volume;
        bid_left = bid_left - volume;
        if ask_left.is_zero() {
            ai += 1;
            ask_left = asks.get(ai).map(|l| l.volume).unwrap_or(Size::ZERO);
        }
        if bid_left.is_zero() {
            bi += 1;
            bid_left = bids.get(bi).map(|l| l.volume).unwrap_or(Size::ZERO);
        }
    };

    DepthSimulationResult {
        buy_market: buy_book.market.clone(),
        sell_market: sell_book.market.clone(),
        max_profitable_fills: fills.len(),
        total_volume: cumulative_volume,
        total_profit: cumulative_profit,
        fills,
        bottleneck_side,
        stop_reason,
    }
}

/// Quality bucket by number of profitable fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthRating {
    Poor,
    Good,
    Excellent,
}

impl DepthRating {
    pub fn from_fill_count(fills: usize) -> Self {
        match fills {
            n if n >= 5 => Self::Excellent,
            n if n >= 3 => Self::Good,
            _ => Self::Poor,
        }
    }
}

impl fmt::Display for DepthRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poor => write!(f, "poor"),
            Self::Good => write!(f, "good"),
            Self::Excellent => write!(f, "excellent"),
        }
    }
}

/// Depth analysis of one opportunity, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthAnalysis {
    pub opportunity: ArbitrageOpportunity,
    pub simulation: DepthSimulationResult,
    pub rating: DepthRating,
    pub analyzed_at: DateTime<Utc>,
}

/// Fetches both books of an opportunity and runs [`simulate`].
#[derive(Clone)]
pub struct DepthAnalyzer {
    normalizer: BookNormalizer,
    config: DetectorConfig,
}

impl DepthAnalyzer {
    pub fn new(normalizer: BookNormalizer, config: DetectorConfig) -> Self {
        Self { normalizer, config }
    }

    pub async fn analyze(&self, opportunity: &ArbitrageOpportunity) -> DetectorResult<DepthAnalysis> {
        let buy_book = self
            .normalizer
            .fetch_normalized(&opportunity.buy_market)
            .await?;
        let sell_book = self
            .normalizer
            .fetch_normalized(&opportunity.sell_market)
            .await?;

        let simulation = simulate(
            &buy_book,
            &sell_book,
            self.config.fee_rate,
            self.config.min_net_margin_pct,
        );
        Metrics::depth_analyzed(simulation.max_profitable_fills);

        info!(
            currency = %opportunity.target_currency,
            buy = %opportunity.buy_market,
            sell = %opportunity.sell_market,
            fills = simulation.max_profitable_fills,
            total_profit = %simulation.total_profit,
            bottleneck = %simulation.bottleneck_side,
            stop = %simulation.stop_reason,
            "Depth analyzed"
        );

        Ok(DepthAnalysis {
            rating: simulation.rating(),
            opportunity: opportunity.clone(),
            simulation,
            analyzed_at: Utc::now(),
        })
    }

    /// Analyze every viable opportunity, keeping results with at least one fill.
    /// Fetch failures skip the opportunity.
    pub async fn analyze_all(&self, opportunities: &[ArbitrageOpportunity]) -> Vec<DepthAnalysis> {
        let viable: Vec<_> = opportunities.iter().filter(|o| o.viable).collect();
        if viable.is_empty() {
            warn!("No viable opportunities to analyze");
            return Vec::new();
        }

        let mut analyses = Vec::new();
        for opp in viable {
            match self.analyze(opp).await {
                Ok(a) if a.simulation.viable() => analyses.push(a),
                Ok(_) => debug!(id = %opp.id(), "No profitable depth"),
                Err(e) => {
                    Metrics::fetch_error("depth");
                    warn!(id = %opp.id(), error = %e, "Depth analysis skipped");
                }
            }
        }
        analyses
    }
}
