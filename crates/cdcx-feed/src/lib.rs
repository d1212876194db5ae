//! Market data access for cdcx-arb.
//!
//! - [`MarketDataProvider`]: the narrow interface the engine reads the exchange through
//! - [`parser`]: exchange order-book and ticker payloads into typed snapshots
//! - [`RateOracle`]: TTL-cached conversion of quote-currency prices into the common unit
//! - [`BookNormalizer`]: native snapshots into common-unit [`cdcx_core::NormalizedBook`]s

pub mod error;
pub mod normalize;
pub mod parser;
pub mod provider;
pub mod rate_oracle;

pub use error::{FeedError, FeedResult};
pub use normalize::{BookNormalizer, DEFAULT_MAX_LEVELS};
pub use parser::{parse_order_book, parse_ticker_price, RawOrderBook, RawTicker};
pub use provider::{BoxFuture, DynMarketData, MarketDataProvider, MockMarketData};
pub use rate_oracle::{
    DynRateStore, MemoryRateStore, RateCacheEntry, RateOracle, RateStore, DEFAULT_RATE_TTL,
};
