//! Trading API client trait.
//!
//! Provides a trait-based abstraction over order placement and status
//! queries, so the attempt state machine can run against a scripted mock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cdcx_core::{OrderId, OrderSide, OrderStatus, OrderStatusReport, OrderType, Price, Size};
use cdcx_feed::BoxFuture;

use crate::error::{ExecutorError, ExecutorResult};

/// Balance of one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    /// Available (unlocked) amount.
    pub balance: Decimal,
    #[serde(default)]
    pub locked_balance: Decimal,
}

/// Order placement and status queries.
///
/// Every method may fail transiently. Status failures during polling are
/// retried by the caller until its deadline.
pub trait TradingClient: Send + Sync {
    fn submit_order<'a>(
        &'a self,
        side: OrderSide,
        order_type: OrderType,
        symbol: &'a str,
        quantity: Size,
    ) -> BoxFuture<'a, ExecutorResult<OrderId>>;

    fn get_order_status<'a>(
        &'a self,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, ExecutorResult<OrderStatusReport>>;

    fn cancel_order<'a>(&'a self, order_id: &'a OrderId) -> BoxFuture<'a, ExecutorResult<()>>;

    fn get_balances(&self) -> BoxFuture<'_, ExecutorResult<Vec<Balance>>>;
}

/// Shared trading client handle.
pub type DynTradingClient = Arc<dyn TradingClient>;

/// Order recorded by [`MockTradingClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedOrder {
    pub id: OrderId,
    pub side: OrderSide,
    pub symbol: String,
    pub quantity: Size,
}

/// One scripted status response.
#[derive(Debug, Clone)]
pub enum StatusStep {
    Report(OrderStatusReport),
    /// Filled for the full submitted quantity.
    FillAll { avg_price: Price, fee: Decimal },
    Error(String),
}

/// Mock trading client for testing.
///
/// Status responses are scripted per (side, symbol). Each poll consumes
/// one step; the last step repeats. Every call is recorded.
#[derive(Debug, Default)]
pub struct MockTradingClient {
    submit_failures: Mutex<HashMap<(OrderSide, String), String>>,
    scripts: Mutex<HashMap<(OrderSide, String), VecDeque<StatusStep>>>,
    cursors: Mutex<HashMap<OrderId, VecDeque<StatusStep>>>,
    orders: Mutex<Vec<SubmittedOrder>>,
    cancels: Mutex<Vec<OrderId>>,
    balances: Mutex<Vec<Balance>>,
    status_calls: AtomicUsize,
    next_id: AtomicU64,
}

impl MockTradingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make submitting `side` on `symbol` fail.
    pub fn fail_submit(&self, side: OrderSide, symbol: &str, error: &str) {
        self.submit_failures
            .lock()
            .insert((side, symbol.to_string()), error.to_string());
    }

    pub fn script_status(&self, side: OrderSide, symbol: &str, steps: Vec<StatusStep>) {
        self.scripts
            .lock()
            .insert((side, symbol.to_string()), steps.into());
    }

    /// Shorthand: every `side` order on `symbol` fills at once.
    pub fn fill_all(&self, side: OrderSide, symbol: &str, avg_price: Price, fee: Decimal) {
        self.script_status(side, symbol, vec![StatusStep::FillAll { avg_price, fee }]);
    }

    pub fn set_balance(&self, currency: &str, balance: Decimal) {
        let mut balances = self.balances.lock();
        balances.retain(|b| b.currency != currency);
        balances.push(Balance {
            currency: currency.to_string(),
            balance,
            locked_balance: Decimal::ZERO,
        });
    }

    pub fn orders(&self) -> Vec<SubmittedOrder> {
        self.orders.lock().clone()
    }

    pub fn orders_for(&self, side: OrderSide, symbol: &str) -> Vec<SubmittedOrder> {
        self.orders
            .lock()
            .iter()
            .filter(|o| o.side == side && o.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn cancels(&self) -> Vec<OrderId> {
        self.cancels.lock().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Build a report with an explicit status.
    pub fn report(status: OrderStatus, filled: Decimal, avg_price: Decimal) -> OrderStatusReport {
        OrderStatusReport {
            status,
            filled_quantity: Size::new(filled),
            avg_price: Price::new(avg_price),
            fee_amount: Decimal::ZERO,
        }
    }
}

impl TradingClient for MockTradingClient {
    fn submit_order<'a>(
        &'a self,
        side: OrderSide,
        _order_type: OrderType,
        symbol: &'a str,
        quantity: Size,
    ) -> BoxFuture<'a, ExecutorResult<OrderId>> {
        Box::pin(async move {
            let key = (side, symbol.to_string());
            if let Some(err) = self.submit_failures.lock().get(&key) {
                return Err(ExecutorError::SubmissionFailed(err.clone()));
            }

            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let id = OrderId::new(format!("{side}-{symbol}-{n}"));
            let steps = self.scripts.lock().get(&key).cloned().unwrap_or_default();
            self.cursors.lock().insert(id.clone(), steps);
            self.orders.lock().push(SubmittedOrder {
                id: id.clone(),
                side,
                symbol: symbol.to_string(),
                quantity,
            });
            Ok(id)
        })
    }

    fn get_order_status<'a>(
        &'a self,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, ExecutorResult<OrderStatusReport>> {
        Box::pin(async move {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let quantity = self
                .orders
                .lock()
                .iter()
                .find(|o| &o.id == order_id)
                .map(|o| o.quantity)
                .ok_or_else(|| ExecutorError::StatusQuery(format!("unknown order {order_id}")))?;

            let step = {
                let mut cursors = self.cursors.lock();
                let steps = cursors.entry(order_id.clone()).or_default();
                if steps.len() > 1 {
                    steps.pop_front()
                } else {
                    steps.front().cloned()
                }
            };

            match step {
                Some(StatusStep::Report(r)) => Ok(r),
                Some(StatusStep::FillAll { avg_price, fee }) => Ok(OrderStatusReport {
                    status: OrderStatus::Filled,
                    filled_quantity: quantity,
                    avg_price,
                    fee_amount: fee,
                }),
                Some(StatusStep::Error(e)) => Err(ExecutorError::StatusQuery(e)),
                None => Ok(OrderStatusReport::pending()),
            }
        })
    }

    fn cancel_order<'a>(&'a self, order_id: &'a OrderId) -> BoxFuture<'a, ExecutorResult<()>> {
        Box::pin(async move {
            self.cancels.lock().push(order_id.clone());
            Ok(())
        })
    }

    fn get_balances(&self) -> BoxFuture<'_, ExecutorResult<Vec<Balance>>> {
        Box::pin(async move { Ok(self.balances.lock().clone()) })
    }
}
