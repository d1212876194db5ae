//! Serialized two-leg execution for cdcx-arb.
//!
//! Buys on one market and sells on another with market orders, one attempt
//! at a time across the whole process.
//!
//! # Key Components
//!
//! - [`ExecutionCoordinator`]: single execution lock, revalidation, budget admission
//! - [`RunCoordinator`]: batch runs and the live detection loop
//! - [`AttemptRunner`]: buy / sell / recovery state machine
//! - [`FillPoller`]: bounded fill confirmation
//! - [`TradingClient`]: order API abstraction, [`CoinDcxTradingClient`] for the real exchange
//! - [`ShutdownLatch`], [`PositionBudget`]: run-level safety controls
//! - [`ExecutionLedger`]: per-run attempt record
//! - [`AccountReadiness`]: balance check before trading
//!
//! # Dispatch (in `ExecutionCoordinator::dispatch`)
//!
//! 1. Shutdown -> Skipped::Shutdown
//! 2. Buy market not in funding currency -> Skipped::UnsupportedBuyMarket
//! 3. (lock acquired) Shutdown -> Skipped::Shutdown
//! 4. Budget admission -> Skipped::Budget
//! 5. Revalidation -> NonViable
//! 6. Budget clip -> Skipped::ZeroVolume
//! 7. (all passed) -> AttemptRunner::run -> Executed

pub mod attempt;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod poller;
pub mod ready;
pub mod rest_client;
pub mod risk;
pub mod signer;
pub mod trading;

// Attempt state machine
pub use attempt::{AttemptConfig, AttemptRunner};

// Time
pub use clock::{Clock, DynClock, ManualClock, SystemClock};

// Coordination
pub use coordinator::{
    DispatchOutcome, ExecutionCoordinator, ExecutionSettings, LiveSettings, RunCoordinator,
    SkipReason,
};

// Error types
pub use error::{ExecutorError, ExecutorResult};

pub use ledger::{AttemptSink, ExecutionLedger};
pub use poller::{FillPoller, PollOutcome};
pub use ready::{cap_position, AccountReadiness, ReadinessReport};

// Trading API
pub use rest_client::{CoinDcxTradingClient, RawOrderStatus};
pub use signer::RequestSigner;
pub use trading::{
    Balance, DynTradingClient, MockTradingClient, StatusStep, SubmittedOrder, TradingClient,
};

// Risk management
pub use risk::{BudgetRefusal, PositionBudget, ShutdownLatch};
