//! Account readiness check run before any trading.
//!
//! The funding balance must cover `min_required`. A configured maximum
//! position above 90% of the balance is capped to 80% of it.

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::error::{ExecutorError, ExecutorResult};
use crate::trading::DynTradingClient;

/// Outcome of a successful readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    pub funding_currency: String,
    pub available: Decimal,
    /// Position limit to trade with, possibly capped.
    pub max_position: Decimal,
    pub capped: bool,
}

pub struct AccountReadiness {
    client: DynTradingClient,
    funding_currency: String,
    min_required: Decimal,
}

impl AccountReadiness {
    pub fn new(client: DynTradingClient, funding_currency: impl Into<String>, min_required: Decimal) -> Self {
        Self {
            client,
            funding_currency: funding_currency.into(),
            min_required,
        }
    }

    pub async fn check(&self, max_position: Decimal) -> ExecutorResult<ReadinessReport> {
        let balances = self.client.get_balances().await?;
        let available = balances
            .iter()
            .find(|b| b.currency.eq_ignore_ascii_case(&self.funding_currency))
            .map(|b| b.balance)
            .unwrap_or_default();

        if available < self.min_required {
            return Err(ExecutorError::NotReady(format!(
                "insufficient {} balance: {} < {}",
                self.funding_currency, available, self.min_required
            )));
        }

        let (max_position, capped) = cap_position(max_position, available);
        if capped {
            warn!(
                currency = %self.funding_currency,
                %available,
                %max_position,
                "Max position exceeds 90% of balance, capped to 80%"
            );
        }
        info!(currency = %self.funding_currency, %available, %max_position, "Account ready");

        Ok(ReadinessReport {
            funding_currency: self.funding_currency.clone(),
            available,
            max_position,
            capped,
        })
    }
}

/// Cap `max_position` to 80% of `available` when it exceeds 90% of it.
pub fn cap_position(max_position: Decimal, available: Decimal) -> (Decimal, bool) {
    let ceiling = available * Decimal::new(9, 1);
    if max_position > ceiling {
        (available * Decimal::new(8, 1), true)
    } else {
        (max_position, false)
    }
}
