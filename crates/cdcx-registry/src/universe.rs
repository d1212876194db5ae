//! Candidate-group building.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cdcx_core::{CandidateGroup, Market};
use cdcx_feed::DynMarketData;

use crate::error::RegistryResult;

/// Which quote currencies may take part in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    pub valid_currencies: Vec<String>,
    /// Ignore `valid_currencies` and accept every quote currency.
    pub enable_all_pairs: bool,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            valid_currencies: ["INR", "USDT", "BTC", "ETH", "BNB", "BUSD", "USDC"]
                .into_iter()
                .map(String::from)
                .collect(),
            enable_all_pairs: false,
        }
    }
}

impl UniverseConfig {
    pub fn accepts(&self, quote_currency: &str) -> bool {
        self.enable_all_pairs
            || self
                .valid_currencies
                .iter()
                .any(|c| c.eq_ignore_ascii_case(quote_currency))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.enable_all_pairs && self.valid_currencies.len() < 2 {
            return Err(
                "universe.valid_currencies needs at least 2 entries unless enable_all_pairs is set"
                    .to_string(),
            );
        }
        Ok(())
    }
}

/// Group markets into candidate groups.
///
/// Keeps active markets whose quote currency is accepted, groups them by
/// target coin, and retains groups with two or more distinct quote
/// currencies. Output is ordered by target coin.
pub fn group_markets(markets: Vec<Market>, config: &UniverseConfig) -> Vec<CandidateGroup> {
    let mut by_target: BTreeMap<String, Vec<Market>> = BTreeMap::new();
    for market in markets {
        if !market.active || !config.accepts(&market.quote_currency) {
            continue;
        }
        by_target
            .entry(market.target_currency.clone())
            .or_default()
            .push(market);
    }

    let now = Utc::now();
    by_target
        .into_iter()
        .map(|(target_currency, markets)| CandidateGroup {
            target_currency,
            markets,
            last_updated: now,
        })
        .filter(|g| {
            let keep = g.is_tradeable();
            if !keep {
                debug!(currency = %g.target_currency, "Skipping group with a single quote currency");
            }
            keep
        })
        .collect()
}

/// Builds the tradeable universe from the market-data provider.
#[derive(Clone)]
pub struct UniverseBuilder {
    provider: DynMarketData,
    config: UniverseConfig,
}

impl UniverseBuilder {
    pub fn new(provider: DynMarketData, config: UniverseConfig) -> Self {
        Self { provider, config }
    }

    /// Fetch the market list and group it. Provider errors propagate;
    /// an empty universe is not an error.
    pub async fn build(&self) -> RegistryResult<Vec<CandidateGroup>> {
        let markets = self.provider.list_active_markets().await?;
        let total = markets.len();
        let groups = group_markets(markets, &self.config);

        info!(
            markets = total,
            groups = groups.len(),
            all_pairs = self.config.enable_all_pairs,
            "Universe built"
        );
        Ok(groups)
    }
}
