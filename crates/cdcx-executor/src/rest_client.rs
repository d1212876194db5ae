//! Signed HTTP client for the CoinDCX trading API.
//!
//! Every request is a POST with a JSON body carrying a `timestamp` in unix
//! milliseconds. The body is signed by [`RequestSigner`] and sent with the
//! `X-AUTH-APIKEY` and `X-AUTH-SIGNATURE` headers.

use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use cdcx_core::{
    ClientOrderId, OrderId, OrderSide, OrderStatus, OrderStatusReport, OrderType, Price, Size,
};
use cdcx_feed::BoxFuture;

use crate::error::{ExecutorError, ExecutorResult};
use crate::signer::RequestSigner;
use crate::trading::{Balance, TradingClient};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const CREATE_ORDER_PATH: &str = "/exchange/v1/orders/create";
const ORDER_STATUS_PATH: &str = "/exchange/v1/orders/status";
const CANCEL_ORDER_PATH: &str = "/exchange/v1/orders/cancel";
const BALANCES_PATH: &str = "/exchange/v1/users/balances";

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    #[serde(default)]
    orders: Vec<CreatedOrder>,
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: Value,
}

/// Raw `orders/status` response. Quantities may be strings or numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total_quantity: Option<Decimal>,
    #[serde(default)]
    pub remaining_quantity: Option<Decimal>,
    #[serde(default)]
    pub avg_price: Option<Decimal>,
    #[serde(default)]
    pub fee_amount: Option<Decimal>,
}

impl RawOrderStatus {
    /// Filled quantity is `total - remaining`, floored at zero.
    pub fn to_report(&self) -> OrderStatusReport {
        let total = self.total_quantity.unwrap_or_default();
        let remaining = self.remaining_quantity.unwrap_or_default();
        let filled = (total - remaining).max(Decimal::ZERO);
        OrderStatusReport {
            status: OrderStatus::from_wire(&self.status),
            filled_quantity: Size::new(filled),
            avg_price: Price::new(self.avg_price.unwrap_or_default()),
            fee_amount: self.fee_amount.unwrap_or_default(),
        }
    }
}

fn order_id_from(value: &Value) -> Option<OrderId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(OrderId::new(s.clone())),
        Value::Number(n) => Some(OrderId::new(n.to_string())),
        _ => None,
    }
}

/// Signed client for order placement, status and balances.
#[derive(Debug, Clone)]
pub struct CoinDcxTradingClient {
    client: Client,
    api_url: String,
    signer: RequestSigner,
}

impl CoinDcxTradingClient {
    pub fn new(api_url: impl Into<String>, signer: RequestSigner) -> ExecutorResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ExecutorError::ConnectionError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            signer,
        })
    }

    /// Add the timestamp, sign, send, and decode.
    async fn post_signed<T: DeserializeOwned>(&self, path: &str, mut body: Value) -> ExecutorResult<T> {
        if let Value::Object(map) = &mut body {
            map.insert(
                "timestamp".to_string(),
                json!(chrono::Utc::now().timestamp_millis()),
            );
        }
        let payload = serde_json::to_string(&body)?;
        let signature = self.signer.sign(&payload)?;
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-AUTH-APIKEY", self.signer.api_key())
            .header("X-AUTH-SIGNATURE", signature)
            .body(payload)
            .send()
            .await
            .map_err(|e| ExecutorError::ConnectionError(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExecutorError::ConnectionError(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(ExecutorError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl TradingClient for CoinDcxTradingClient {
    fn submit_order<'a>(
        &'a self,
        side: OrderSide,
        order_type: OrderType,
        symbol: &'a str,
        quantity: Size,
    ) -> BoxFuture<'a, ExecutorResult<OrderId>> {
        Box::pin(async move {
            let client_order_id = ClientOrderId::new();
            let body = json!({
                "side": side.to_string(),
                "order_type": order_type.to_string(),
                "market": symbol,
                "total_quantity": quantity.inner().normalize().to_string(),
                "client_order_id": client_order_id.as_str(),
            });
            info!(%side, symbol, %quantity, %client_order_id, "Submitting order");

            let response: CreateOrderResponse = self
                .post_signed(CREATE_ORDER_PATH, body)
                .await
                .map_err(|e| ExecutorError::SubmissionFailed(e.to_string()))?;

            response
                .orders
                .first()
                .and_then(|o| order_id_from(&o.id))
                .ok_or_else(|| ExecutorError::InvalidResponse("no order id in response".to_string()))
        })
    }

    fn get_order_status<'a>(
        &'a self,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, ExecutorResult<OrderStatusReport>> {
        Box::pin(async move {
            let raw: RawOrderStatus = self
                .post_signed(ORDER_STATUS_PATH, json!({ "id": order_id.as_str() }))
                .await
                .map_err(|e| ExecutorError::StatusQuery(e.to_string()))?;
            let report = raw.to_report();
            debug!(%order_id, status = %report.status, filled = %report.filled_quantity, "Order status");
            Ok(report)
        })
    }

    fn cancel_order<'a>(&'a self, order_id: &'a OrderId) -> BoxFuture<'a, ExecutorResult<()>> {
        Box::pin(async move {
            let _: Value = self
                .post_signed(CANCEL_ORDER_PATH, json!({ "id": order_id.as_str() }))
                .await?;
            info!(%order_id, "Order cancelled");
            Ok(())
        })
    }

    fn get_balances(&self) -> BoxFuture<'_, ExecutorResult<Vec<Balance>>> {
        Box::pin(async move { self.post_signed(BALANCES_PATH, json!({})).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_report_from_raw() {
        let raw: RawOrderStatus = serde_json::from_str(
            r#"{
                "id": "ead19992-43fd-11e8-b027-bb815bcb14ed",
                "market": "XRPUSDT",
                "status": "partially_filled",
                "total_quantity": 100,
                "remaining_quantity": "40.5",
                "avg_price": 0.5123,
                "fee_amount": "0.02"
            }"#,
        )
        .unwrap();

        let report = raw.to_report();
        assert_eq!(report.status, OrderStatus::PartiallyFilled);
        assert_eq!(report.filled_quantity.inner(), dec!(59.5));
        assert_eq!(report.avg_price.inner(), dec!(0.5123));
        assert_eq!(report.fee_amount, dec!(0.02));
    }

    #[test]
    fn test_status_report_missing_fields() {
        let raw: RawOrderStatus =
            serde_json::from_str(r#"{"status": "open", "avg_price": null}"#).unwrap();
        let report = raw.to_report();
        assert_eq!(report.status, OrderStatus::Open);
        assert!(report.filled_quantity.is_zero());
        assert!(report.avg_price.is_zero());
    }

    #[test]
    fn test_order_id_accepts_string_or_number() {
        assert_eq!(order_id_from(&json!("abc")), Some(OrderId::new("abc")));
        assert_eq!(order_id_from(&json!(42)), Some(OrderId::new("42")));
        assert_eq!(order_id_from(&json!("")), None);
        assert_eq!(order_id_from(&Value::Null), None);
    }

    #[test]
    fn test_create_response_shape() {
        let resp: CreateOrderResponse =
            serde_json::from_str(r#"{"orders":[{"id":"o-1","status":"init"}]}"#).unwrap();
        assert_eq!(order_id_from(&resp.orders[0].id), Some(OrderId::new("o-1")));
    }

    #[test]
    fn test_balance_shape() {
        let balances: Vec<Balance> = serde_json::from_str(
            r#"[{"currency":"USDT","balance":"125.5","locked_balance":0}]"#,
        )
        .unwrap();
        assert_eq!(balances[0].balance, dec!(125.5));
    }
}
