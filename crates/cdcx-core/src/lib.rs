//! Core domain types for the CoinDCX cross-market arbitrage engine.
//!
//! This crate provides the types shared by every other crate:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `Market`, `MarketRef`, `CandidateGroup`: The tradeable universe
//! - `OrderBookSnapshot`, `NormalizedBook`: Order-book snapshots (native and common unit)
//! - `ArbitrageOpportunity`: A priced buy/sell market pair
//! - `OrderSide`, `OrderStatus`, `OrderStatusReport`: Trading enums
//! - `ExecutionAttempt`, `ExecutionResult`: Execution records

pub mod book;
pub mod decimal;
pub mod error;
pub mod execution;
pub mod market;
pub mod opportunity;
pub mod order;

pub use book::{NormalizedBook, NormalizedLevel, OrderBookLevel, OrderBookSnapshot};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{CandidateGroup, Market, MarketRef};
pub use opportunity::{ArbitrageOpportunity, OpportunityRating};
pub use order::{ClientOrderId, OrderId, OrderSide, OrderStatus, OrderStatusReport, OrderType};

// Execution types
pub use execution::{AttemptStatus, ExecutionAttempt, ExecutionResult};
