//! Top-of-book opportunity detector.
//!
//! For each candidate group, every market's book is fetched and its best
//! bid/ask converted to the common unit. Markets too thin on either side
//! are dropped; every ordered (buy, sell) pair of the remaining markets
//! becomes an [`ArbitrageOpportunity`].

use chrono::Utc;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use cdcx_core::{ArbitrageOpportunity, CandidateGroup, MarketRef, NormalizedBook, Price};
use cdcx_feed::BookNormalizer;
use cdcx_telemetry::Metrics;

use crate::config::DetectorConfig;
use crate::error::{DetectorError, DetectorResult};

/// Best prices of one market, common unit.
#[derive(Debug, Clone)]
struct Quote {
    market: MarketRef,
    bid: Price,
    ask: Price,
}

impl Quote {
    /// Best-level prices, if both sides carry at least `min_liquidity`.
    fn from_book(book: &NormalizedBook, min_liquidity: Decimal) -> Option<Self> {
        let bid = book.best_bid()?;
        let ask = book.best_ask()?;
        let bid_liquidity = bid.volume_common;
        let ask_liquidity = ask.volume_common;

        if bid_liquidity < min_liquidity || ask_liquidity < min_liquidity {
            debug!(
                market = %book.market,
                %bid_liquidity,
                %ask_liquidity,
                "Low liquidity"
            );
            return None;
        }
        Some(Self {
            market: book.market.clone(),
            bid: bid.price_common,
            ask: ask.price_common,
        })
    }
}

/// Price one (buy, sell) pair.
///
/// Fees are estimated on both legs: `(buy_ask + sell_bid) * fee_rate`.
pub fn evaluate_pair(
    target_currency: &str,
    buy_market: MarketRef,
    buy_ask: Price,
    sell_market: MarketRef,
    sell_bid: Price,
    config: &DetectorConfig,
) -> ArbitrageOpportunity {
    let gross_margin = sell_bid.inner() - buy_ask.inner();
    let fee_estimate = (buy_ask.inner() + sell_bid.inner()) * config.fee_rate;
    let net_margin = gross_margin - fee_estimate;

    let gross_margin_pct = sell_bid.pct_from(buy_ask).unwrap_or_default();
    let net_margin_pct = if buy_ask.is_positive() {
        net_margin / buy_ask.inner() * Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    };

    let viable = buy_ask.is_positive() && net_margin_pct >= config.min_net_margin_pct;

    ArbitrageOpportunity {
        target_currency: target_currency.to_string(),
        buy_market,
        sell_market,
        buy_price_common: buy_ask,
        sell_price_common: sell_bid,
        gross_margin,
        gross_margin_pct,
        fee_estimate,
        net_margin,
        net_margin_pct,
        viable,
        computed_at: Utc::now(),
    }
}

/// Detects opportunities across the markets of each group.
#[derive(Clone)]
pub struct OpportunityDetector {
    normalizer: BookNormalizer,
    config: DetectorConfig,
}

impl OpportunityDetector {
    pub fn new(normalizer: BookNormalizer, config: DetectorConfig) -> Self {
        Self { normalizer, config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Evaluate every ordered pair of liquid markets in `group`.
    ///
    /// Markets whose book cannot be fetched or converted are skipped.
    /// Fewer than two liquid markets is an error for this group only.
    pub async fn detect_group(&self, group: &CandidateGroup) -> DetectorResult<Vec<ArbitrageOpportunity>> {
        let refs: Vec<MarketRef> = group.markets.iter().map(|m| m.to_ref()).collect();
        let books = join_all(refs.iter().map(|r| self.normalizer.fetch_normalized(r))).await;

        let mut quotes = Vec::with_capacity(refs.len());
        for (market, book) in refs.iter().zip(books) {
            match book {
                Ok(book) => {
                    if let Some(q) = Quote::from_book(&book, self.config.min_liquidity) {
                        quotes.push(q);
                    }
                }
                Err(e) => {
                    Metrics::fetch_error("order_book");
                    warn!(%market, error = %e, "Skipping market");
                }
            }
        }

        if quotes.len() < 2 {
            return Err(DetectorError::InsufficientLiquidity {
                currency: group.target_currency.clone(),
                liquid: quotes.len(),
            });
        }

        let mut opportunities = Vec::new();
        for buy in &quotes {
            for sell in &quotes {
                if buy.market == sell.market {
                    continue;
                }
                let opp = evaluate_pair(
                    &group.target_currency,
                    buy.market.clone(),
                    buy.ask,
                    sell.market.clone(),
                    sell.bid,
                    &self.config,
                );
                Metrics::opportunity_evaluated(&opp.target_currency, opp.viable);
                if opp.viable {
                    info!(
                        currency = %opp.target_currency,
                        buy = %opp.buy_market,
                        sell = %opp.sell_market,
                        net_margin_pct = %opp.net_margin_pct.round_dp(2),
                        rating = %opp.rating(),
                        "Viable opportunity"
                    );
                }
                opportunities.push(opp);
            }
        }
        Ok(opportunities)
    }

    /// Run [`Self::detect_group`] over every group, skipping failed groups.
    pub async fn detect_all(&self, groups: &[CandidateGroup]) -> Vec<ArbitrageOpportunity> {
        let mut all = Vec::new();
        let mut with_viable = 0usize;
        for group in groups {
            match self.detect_group(group).await {
                Ok(opps) => {
                    if opps.iter().any(|o| o.viable) {
                        with_viable += 1;
                    }
                    all.extend(opps);
                }
                Err(e) => debug!(currency = %group.target_currency, error = %e, "Group skipped"),
            }
        }
        info!(
            groups = groups.len(),
            with_viable,
            opportunities = all.len(),
            "Detection complete"
        );
        all
    }
}
