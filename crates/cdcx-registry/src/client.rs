//! HTTP client for the CoinDCX public API.
//!
//! Three endpoints are used:
//! - `GET {api}/exchange/v1/markets_details`: market metadata
//! - `GET {public}/market_data/orderbook?pair=...`: order book by trading pair id
//! - `GET {api}/exchange/ticker`: last prices, used for rate conversion

use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use cdcx_core::{Market, MarketRef, OrderBookSnapshot, Size};
use cdcx_feed::{
    parse_order_book, parse_ticker_price, BoxFuture, FeedResult, MarketDataProvider, RawOrderBook,
    RawTicker,
};

use crate::error::{RegistryError, RegistryResult};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_API_URL: &str = "https://api.coindcx.com";
pub const DEFAULT_PUBLIC_URL: &str = "https://public.coindcx.com";

/// Raw entry of `markets_details`. Only the fields the engine reads.
///
/// The exchange calls the quote currency the "base" currency.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMarketDetail {
    #[serde(default)]
    pub coindcx_name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub pair: String,
    #[serde(default)]
    pub base_currency_short_name: String,
    #[serde(default)]
    pub target_currency_short_name: String,
    #[serde(default)]
    pub min_quantity: Option<Decimal>,
    #[serde(default)]
    pub min_notional: Option<Decimal>,
    #[serde(default)]
    pub status: String,
}

impl RawMarketDetail {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Convert into a [`Market`]. Entries without a symbol or pair id are unusable.
    pub fn to_market(&self) -> Option<Market> {
        let symbol = if self.symbol.is_empty() {
            &self.coindcx_name
        } else {
            &self.symbol
        };
        if symbol.is_empty() || self.pair.is_empty() {
            return None;
        }
        Some(Market {
            symbol: symbol.clone(),
            trading_pair_id: self.pair.clone(),
            quote_currency: self.base_currency_short_name.clone(),
            target_currency: self.target_currency_short_name.clone(),
            min_quantity: Size::new(self.min_quantity.unwrap_or_default()),
            min_notional: self.min_notional.unwrap_or_default(),
            active: self.is_active(),
        })
    }
}

/// Client for the public (unsigned) endpoints.
#[derive(Debug, Clone)]
pub struct CoinDcxPublicClient {
    client: Client,
    api_url: String,
    public_url: String,
}

impl CoinDcxPublicClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_url` - e.g. "https://api.coindcx.com"
    /// * `public_url` - e.g. "https://public.coindcx.com"
    pub fn new(api_url: impl Into<String>, public_url: impl Into<String>) -> RegistryResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RegistryError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> RegistryResult<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::HttpClient(format!("HTTP {status}: {body}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::HttpClient(format!("Failed to read response: {e}")))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch every market the exchange lists, active or not.
    pub async fn fetch_market_details(&self) -> RegistryResult<Vec<RawMarketDetail>> {
        let url = format!("{}/exchange/v1/markets_details", self.api_url);
        info!(%url, "Fetching market details");
        let details: Vec<RawMarketDetail> = self.get_json(&url).await?;
        debug!(count = details.len(), "Market details received");
        Ok(details)
    }

    pub async fn fetch_order_book(&self, market: &MarketRef) -> RegistryResult<OrderBookSnapshot> {
        let url = format!(
            "{}/market_data/orderbook?pair={}",
            self.public_url, market.pair
        );
        let raw: RawOrderBook = self.get_json(&url).await?;
        Ok(parse_order_book(&market.symbol, &raw))
    }

    pub async fn fetch_ticker(&self) -> RegistryResult<Vec<RawTicker>> {
        let url = format!("{}/exchange/ticker", self.api_url);
        self.get_json(&url).await
    }
}

impl MarketDataProvider for CoinDcxPublicClient {
    fn list_active_markets(&self) -> BoxFuture<'_, FeedResult<Vec<Market>>> {
        Box::pin(async move {
            let details = self.fetch_market_details().await?;
            Ok(details
                .iter()
                .filter(|d| d.is_active())
                .filter_map(RawMarketDetail::to_market)
                .collect())
        })
    }

    fn get_order_book<'a>(
        &'a self,
        market: &'a MarketRef,
    ) -> BoxFuture<'a, FeedResult<OrderBookSnapshot>> {
        Box::pin(async move { Ok(self.fetch_order_book(market).await?) })
    }

    fn get_last_price<'a>(&'a self, pair_symbol: &'a str) -> BoxFuture<'a, FeedResult<Decimal>> {
        Box::pin(async move {
            let rows = self.fetch_ticker().await?;
            parse_ticker_price(&rows, pair_symbol)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const DETAILS: &str = r#"[
        {
            "coindcx_name": "XRPUSDT",
            "base_currency_short_name": "USDT",
            "target_currency_short_name": "XRP",
            "min_quantity": 0.1,
            "min_notional": 0.5,
            "symbol": "XRPUSDT",
            "pair": "B-XRP_USDT",
            "status": "active",
            "max_leverage": null
        },
        {
            "coindcx_name": "XRPINR",
            "base_currency_short_name": "INR",
            "target_currency_short_name": "XRP",
            "min_quantity": "1",
            "symbol": "",
            "pair": "I-XRP_INR",
            "status": "active"
        },
        {
            "coindcx_name": "OLDINR",
            "base_currency_short_name": "INR",
            "target_currency_short_name": "OLD",
            "symbol": "OLDINR",
            "pair": "I-OLD_INR",
            "status": "inactive"
        }
    ]"#;

    #[test]
    fn test_market_detail_conversion() {
        let details: Vec<RawMarketDetail> = serde_json::from_str(DETAILS).unwrap();
        assert_eq!(details.len(), 3);

        let usdt = details[0].to_market().unwrap();
        assert_eq!(usdt.symbol, "XRPUSDT");
        assert_eq!(usdt.quote_currency, "USDT");
        assert_eq!(usdt.target_currency, "XRP");
        assert_eq!(usdt.min_quantity.inner(), dec!(0.1));
        assert_eq!(usdt.min_notional, dec!(0.5));
        assert!(usdt.active);

        // Empty symbol falls back to coindcx_name
        let inr = details[1].to_market().unwrap();
        assert_eq!(inr.symbol, "XRPINR");
        assert_eq!(inr.min_notional, Decimal::ZERO);

        assert!(!details[2].is_active());
    }

    #[test]
    fn test_detail_without_pair_is_unusable() {
        let detail: RawMarketDetail =
            serde_json::from_str(r#"{"symbol": "ABCINR", "status": "active"}"#).unwrap();
        assert!(detail.to_market().is_none());
    }

    #[test]
    fn test_client_trims_base_urls() {
        let client = CoinDcxPublicClient::new("https://api.example.com/", DEFAULT_PUBLIC_URL).unwrap();
        assert_eq!(client.api_url, "https://api.example.com");
        assert_eq!(client.public_url, DEFAULT_PUBLIC_URL);
    }
}
