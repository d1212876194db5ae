//! Order-related types and identifiers.
//!
//! Only immediate-execution (market) orders are placed by this system.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Price, Size};

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order type. Wire names follow the exchange (`market_order`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderType {
    #[default]
    #[serde(rename = "market_order")]
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market_order"),
        }
    }
}

/// Exchange-assigned order id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client order ID sent with every order so retries can be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `cdcx_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().simple().to_string()[..8];
        Self(format!("cdcx_{ts}_{uuid_short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order status as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Init,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    PartiallyCancelled,
    Rejected,
    /// Any status string this crate does not know. Treated as non-terminal.
    Unknown(String),
}

impl OrderStatus {
    /// Parse the exchange's status string.
    pub fn from_wire(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "init" => Self::Init,
            "open" => Self::Open,
            "partially_filled" => Self::PartiallyFilled,
            "filled" => Self::Filled,
            "cancelled" | "canceled" => Self::Cancelled,
            "partially_cancelled" => Self::PartiallyCancelled,
            "rejected" => Self::Rejected,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns true if the order will not change any more.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::PartiallyCancelled | Self::Rejected
        )
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Open => write!(f, "open"),
            Self::PartiallyFilled => write!(f, "partially_filled"),
            Self::Filled => write!(f, "filled"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::PartiallyCancelled => write!(f, "partially_cancelled"),
            Self::Rejected => write!(f, "rejected"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// Result of one order-status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub status: OrderStatus,
    pub filled_quantity: Size,
    /// Average fill price in the market's native quote currency.
    pub avg_price: Price,
    /// Fee charged, in the market's native quote currency.
    pub fee_amount: Decimal,
}

impl OrderStatusReport {
    /// Report of an order that has not filled anything yet.
    pub fn pending() -> Self {
        Self {
            status: OrderStatus::Open,
            filled_quantity: Size::ZERO,
            avg_price: Price::ZERO,
            fee_amount: Decimal::ZERO,
        }
    }
}
