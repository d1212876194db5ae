//! Execution records.
//!
//! This module provides types for:
//! - The per-attempt state machine (`AttemptStatus`)
//! - One buy/sell leg pair and its outcome (`ExecutionAttempt`)
//! - Run-level aggregation (`ExecutionResult`)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::market::MarketRef;
use crate::order::OrderId;
use crate::{Price, Size};

// ============================================================================
// Attempt State Machine
// ============================================================================

/// State of one execution attempt.
///
/// ```text
/// Created -> BuySubmitted -> BuyFilled -> SellSubmitted -> SellFilled
///    |            |                            |
///    v            v                            v
/// NonViable   BuyAborted               RecoverySubmitted -> RecoveryFilled
///                                              |
///                                              v
///                                        RecoveryFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    #[default]
    Created,
    /// Revalidation rejected the opportunity; nothing was submitted.
    NonViable,
    BuySubmitted,
    /// Buy failed or timed out. No position is held.
    BuyAborted,
    BuyFilled,
    SellSubmitted,
    SellFilled,
    RecoverySubmitted,
    RecoveryFilled,
    /// Inventory could not be liquidated. Needs manual intervention.
    RecoveryFailed,
}

impl AttemptStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NonViable
                | Self::BuyAborted
                | Self::SellFilled
                | Self::RecoveryFilled
                | Self::RecoveryFailed
        )
    }

    /// Sell or recovery leg filled. Profit may still be negative.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::SellFilled | Self::RecoveryFilled)
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(&self, next: AttemptStatus) -> bool {
        use AttemptStatus::*;
        matches!(
            (self, next),
            (Created, NonViable)
                | (Created, BuySubmitted)
                | (BuySubmitted, BuyFilled)
                | (BuySubmitted, BuyAborted)
                | (BuyFilled, SellSubmitted)
                | (BuyFilled, RecoverySubmitted)
                | (SellSubmitted, SellFilled)
                | (SellSubmitted, RecoverySubmitted)
                | (RecoverySubmitted, RecoveryFilled)
                | (RecoverySubmitted, RecoveryFailed)
        )
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::NonViable => "non_viable",
            Self::BuySubmitted => "buy_submitted",
            Self::BuyAborted => "buy_aborted",
            Self::BuyFilled => "buy_filled",
            Self::SellSubmitted => "sell_submitted",
            Self::SellFilled => "sell_filled",
            Self::RecoverySubmitted => "recovery_submitted",
            Self::RecoveryFilled => "recovery_filled",
            Self::RecoveryFailed => "recovery_failed",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// ExecutionAttempt
// ============================================================================

/// One buy+sell leg pair.
///
/// Native prices and fees are kept as reported by the exchange; profit and
/// margin are in the common unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub currency: String,
    pub buy_market: MarketRef,
    pub sell_market: MarketRef,
    pub planned_volume: Size,
    /// Net margin at revalidation time.
    pub expected_margin_pct: Decimal,
    pub buy_order_id: Option<OrderId>,
    pub sell_order_id: Option<OrderId>,
    /// Symbol used for the recovery sell, if one was submitted.
    pub recovery_symbol: Option<String>,
    pub recovery_order_id: Option<OrderId>,
    pub executed_volume: Size,
    pub actual_buy_price: Price,
    /// Price of whichever leg actually sold (sell or recovery).
    pub actual_sell_price: Price,
    pub buy_fee: Decimal,
    pub sell_fee: Decimal,
    pub actual_profit: Option<Decimal>,
    pub actual_margin_pct: Option<Decimal>,
    /// Capital deployed on the buy leg, in the funding currency.
    pub investment: Decimal,
    pub status: AttemptStatus,
    /// Every status this attempt went through, in order.
    pub history: Vec<AttemptStatus>,
    /// Unix milliseconds.
    pub started_at: u64,
    pub buy_submitted_at: Option<u64>,
    pub ended_at: Option<u64>,
    pub error_reason: Option<String>,
}

impl ExecutionAttempt {
    pub fn new(
        currency: impl Into<String>,
        buy_market: MarketRef,
        sell_market: MarketRef,
        planned_volume: Size,
        expected_margin_pct: Decimal,
        started_at: u64,
    ) -> Self {
        Self {
            currency: currency.into(),
            buy_market,
            sell_market,
            planned_volume,
            expected_margin_pct,
            buy_order_id: None,
            sell_order_id: None,
            recovery_symbol: None,
            recovery_order_id: None,
            executed_volume: Size::ZERO,
            actual_buy_price: Price::ZERO,
            actual_sell_price: Price::ZERO,
            buy_fee: Decimal::ZERO,
            sell_fee: Decimal::ZERO,
            actual_profit: None,
            actual_margin_pct: None,
            investment: Decimal::ZERO,
            status: AttemptStatus::Created,
            history: vec![AttemptStatus::Created],
            started_at,
            buy_submitted_at: None,
            ended_at: None,
            error_reason: None,
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, next: AttemptStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.history.push(next);
        Ok(())
    }

    /// Whether a buy order was ever sent.
    pub fn submitted_buy(&self) -> bool {
        self.buy_order_id.is_some()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.ended_at.map(|end| end.saturating_sub(self.started_at))
    }
}

// ============================================================================
// ExecutionResult
// ============================================================================

/// Aggregate over one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub attempts: Vec<ExecutionAttempt>,
    /// Sum of known profits of successful attempts, common unit.
    pub total_profit: Decimal,
    /// Sum of capital deployed, funding currency.
    pub total_investment: Decimal,
    /// Successful attempts over attempts that submitted a buy, in percent.
    pub success_rate: Decimal,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Aggregate finished attempts.
    pub fn summarize(
        attempts: Vec<ExecutionAttempt>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let total_profit = attempts
            .iter()
            .filter(|a| a.status.is_success())
            .filter_map(|a| a.actual_profit)
            .sum();
        let total_investment = attempts.iter().map(|a| a.investment).sum();

        let executed = attempts.iter().filter(|a| a.submitted_buy()).count();
        let successful = attempts.iter().filter(|a| a.status.is_success()).count();
        let success_rate = if executed == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(successful as u64) / Decimal::from(executed as u64)
                * Decimal::ONE_HUNDRED
        };

        Self {
            attempts,
            total_profit,
            total_investment,
            success_rate,
            started_at,
            ended_at,
        }
    }

    pub fn successful_count(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.status.is_success())
            .count()
    }

    /// Attempts that left inventory the engine could not sell.
    pub fn needs_manual_intervention(&self) -> impl Iterator<Item = &ExecutionAttempt> {
        self.attempts
            .iter()
            .filter(|a| a.status == AttemptStatus::RecoveryFailed)
    }
}
