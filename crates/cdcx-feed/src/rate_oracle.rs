//! Quote-currency to common-unit conversion.
//!
//! Every cross-market comparison needs prices in one unit. The oracle
//! looks up `{CURRENCY}{COMMON}` (e.g. "USDTINR") on the ticker, caches
//! the rate for a TTL, and makes sure concurrent misses for the same pair
//! issue a single upstream fetch.
//!
//! # Concurrency
//!
//! Readers go straight to the [`RateStore`], which must never hand out a
//! torn entry. On a miss the caller takes a per-pair async lock, re-checks
//! the store, and only then fetches. Other pairs are not blocked.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use cdcx_core::Price;

use crate::error::{FeedError, FeedResult};
use crate::provider::DynMarketData;

/// Default cache lifetime.
pub const DEFAULT_RATE_TTL: Duration = Duration::from_secs(300);

/// One cached conversion rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCacheEntry {
    /// e.g. "USDTINR".
    pub currency_pair: String,
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
}

impl RateCacheEntry {
    pub fn new(currency_pair: impl Into<String>, rate: Decimal, fetched_at: DateTime<Utc>) -> Self {
        Self {
            currency_pair: currency_pair.into(),
            rate,
            fetched_at,
        }
    }

    /// Valid while `now - fetched_at < ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        match age.to_std() {
            Ok(age) => age < ttl,
            // fetched_at in the future: clock skew, treat as fresh
            Err(_) => true,
        }
    }
}

/// Backing store for cached rates.
pub trait RateStore: Send + Sync {
    fn get(&self, currency_pair: &str) -> Option<RateCacheEntry>;
    fn put(&self, entry: RateCacheEntry);
    /// Every entry, fresh or not.
    fn entries(&self) -> Vec<RateCacheEntry>;
}

pub type DynRateStore = Arc<dyn RateStore>;

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    entries: DashMap<String, RateCacheEntry>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RateStore for MemoryRateStore {
    fn get(&self, currency_pair: &str) -> Option<RateCacheEntry> {
        self.entries.get(currency_pair).map(|e| e.value().clone())
    }

    fn put(&self, entry: RateCacheEntry) {
        self.entries.insert(entry.currency_pair.clone(), entry);
    }

    fn entries(&self) -> Vec<RateCacheEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }
}

/// TTL-cached rate oracle.
pub struct RateOracle {
    provider: DynMarketData,
    store: DynRateStore,
    common_currency: String,
    ttl: Duration,
    inflight: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl RateOracle {
    pub fn new(provider: DynMarketData, store: DynRateStore, common_currency: impl Into<String>) -> Self {
        Self {
            provider,
            store,
            common_currency: common_currency.into(),
            ttl: DEFAULT_RATE_TTL,
            inflight: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn common_currency(&self) -> &str {
        &self.common_currency
    }

    pub fn store(&self) -> &DynRateStore {
        &self.store
    }

    fn pair_for(&self, currency: &str) -> String {
        format!("{}{}", currency.to_ascii_uppercase(), self.common_currency)
    }

    fn fresh(&self, pair: &str) -> Option<Decimal> {
        self.store
            .get(pair)
            .filter(|e| e.is_fresh(Utc::now(), self.ttl))
            .map(|e| e.rate)
    }

    /// Units of the common currency per one unit of `currency`.
    pub async fn rate_to_common(&self, currency: &str) -> FeedResult<Decimal> {
        if currency.eq_ignore_ascii_case(&self.common_currency) {
            return Ok(Decimal::ONE);
        }

        let pair = self.pair_for(currency);
        if let Some(rate) = self.fresh(&pair) {
            return Ok(rate);
        }

        let lock = self.inflight.entry(pair.clone()).or_default().clone();
        let _guard = lock.lock().await;

        // Another task may have filled the cache while we waited
        if let Some(rate) = self.fresh(&pair) {
            return Ok(rate);
        }

        let rate = match self.provider.get_last_price(&pair).await {
            Ok(rate) => rate,
            Err(e) => {
                warn!(%pair, error = %e, "Rate fetch failed");
                return Err(FeedError::RateUnavailable(format!("{pair}: {e}")));
            }
        };
        if rate <= Decimal::ZERO {
            return Err(FeedError::RateUnavailable(format!(
                "{pair}: non-positive rate {rate}"
            )));
        }

        debug!(%pair, %rate, "Rate cached");
        self.store.put(RateCacheEntry::new(pair, rate, Utc::now()));
        Ok(rate)
    }

    /// Convert a price quoted in `currency` into the common unit.
    pub async fn convert_to_common(&self, price: Price, currency: &str) -> FeedResult<Price> {
        let rate = self.rate_to_common(currency).await?;
        Ok(price * rate)
    }
}

impl std::fmt::Debug for RateOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateOracle")
            .field("common_currency", &self.common_currency)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
