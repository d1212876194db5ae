//! Market discovery for cdcx-arb.
//!
//! Fetches market metadata, order books and tickers from the CoinDCX
//! public REST API, and groups active markets into candidate groups
//! (one target coin quoted in two or more currencies).

pub mod client;
pub mod error;
pub mod universe;

pub use client::{CoinDcxPublicClient, RawMarketDetail};
pub use error::{RegistryError, RegistryResult};
pub use universe::{group_markets, UniverseBuilder, UniverseConfig};
