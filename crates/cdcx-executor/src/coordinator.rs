//! Serialized execution and the run loops built on it.
//!
//! [`ExecutionCoordinator`] owns the single execution lock shared by every
//! execution path that goes through it, clones included. Two separately
//! constructed coordinators do not exclude each other; the application
//! runs at most one at a time. Each dispatch:
//!
//! 1. Shutdown and funding-market checks (before the lock)
//! 2. Acquire the lock; it stays held for the whole attempt
//! 3. Shutdown and budget admission
//! 4. Revalidate against fresh books
//! 5. Clip volume to the remaining budget
//! 6. Run the attempt, record it, wait the inter-order delay
//!
//! The critical section runs in its own task, so dropping a caller never
//! abandons an attempt that already holds inventory.
//!
//! [`RunCoordinator`] drives batch runs over a saved opportunity list and
//! the live loop that detects per currency group concurrently.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use cdcx_core::{
    ArbitrageOpportunity, AttemptStatus, CandidateGroup, ExecutionAttempt, ExecutionResult, Size,
};
use cdcx_detector::{OpportunityDetector, RealTimeOpportunity, Revalidator};
use cdcx_telemetry::Metrics;

use crate::attempt::AttemptRunner;
use crate::clock::DynClock;
use crate::ledger::ExecutionLedger;
use crate::risk::{BudgetRefusal, PositionBudget, ShutdownLatch};

/// Quantity step of a budget-clipped volume.
const VOLUME_STEP: Size = Size(Decimal::from_parts(1, 0, 0, false, 8));

// ============================================================================
// Outcomes
// ============================================================================

/// Why a dispatch did not run an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Shutdown,
    Budget(BudgetRefusal),
    /// Buy market is not quoted in the funding currency.
    UnsupportedBuyMarket { quote: String },
    RateUnavailable(String),
    /// Nothing left to trade after clipping to the budget.
    ZeroVolume,
    TaskFailed(String),
}

impl SkipReason {
    /// Whether later opportunities in the same queue would be skipped too.
    pub fn stops_dispatch(&self) -> bool {
        matches!(self, Self::Shutdown | Self::Budget(_))
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => write!(f, "shutdown requested"),
            Self::Budget(r) => write!(f, "{r}"),
            Self::UnsupportedBuyMarket { quote } => {
                write!(f, "buy market quoted in {quote}, not the funding currency")
            }
            Self::RateUnavailable(e) => write!(f, "rate unavailable: {e}"),
            Self::ZeroVolume => write!(f, "no volume left within budget"),
            Self::TaskFailed(e) => write!(f, "execution task failed: {e}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Executed(ExecutionAttempt),
    NonViable(RealTimeOpportunity),
    Skipped(SkipReason),
}

// ============================================================================
// ExecutionCoordinator
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub funding_currency: String,
    /// Wait after each attempt, still inside the lock.
    pub delay_between_orders: Duration,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            funding_currency: "USDT".to_string(),
            delay_between_orders: Duration::from_secs(2),
        }
    }
}

#[derive(Clone)]
pub struct ExecutionCoordinator {
    revalidator: Revalidator,
    runner: AttemptRunner,
    /// The execution lock. Guards the budget so admission and accounting
    /// happen in the same critical section as the attempt.
    budget: Arc<Mutex<PositionBudget>>,
    ledger: Arc<ExecutionLedger>,
    latch: Arc<ShutdownLatch>,
    settings: ExecutionSettings,
}

impl ExecutionCoordinator {
    pub fn new(
        revalidator: Revalidator,
        runner: AttemptRunner,
        budget: PositionBudget,
        ledger: Arc<ExecutionLedger>,
        latch: Arc<ShutdownLatch>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            revalidator,
            runner,
            budget: Arc::new(Mutex::new(budget)),
            ledger,
            latch,
            settings,
        }
    }

    pub fn ledger(&self) -> &Arc<ExecutionLedger> {
        &self.ledger
    }

    pub fn latch(&self) -> &Arc<ShutdownLatch> {
        &self.latch
    }

    pub fn clock(&self) -> &DynClock {
        self.runner.clock()
    }

    /// Budget snapshot. Waits for the execution lock.
    pub async fn budget(&self) -> PositionBudget {
        self.budget.lock().await.clone()
    }

    pub async fn dispatch(&self, opp: &ArbitrageOpportunity) -> DispatchOutcome {
        if self.latch.is_triggered() {
            return DispatchOutcome::Skipped(SkipReason::Shutdown);
        }
        if opp.buy_market.quote_currency != self.settings.funding_currency {
            debug!(id = %opp.id(), quote = %opp.buy_market.quote_currency, "Not a funding-currency buy market");
            return DispatchOutcome::Skipped(SkipReason::UnsupportedBuyMarket {
                quote: opp.buy_market.quote_currency.clone(),
            });
        }

        let this = self.clone();
        let opp = opp.clone();
        match tokio::spawn(async move { this.execute_exclusive(opp).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Execution task failed");
                DispatchOutcome::Skipped(SkipReason::TaskFailed(e.to_string()))
            }
        }
    }

    async fn execute_exclusive(&self, opp: ArbitrageOpportunity) -> DispatchOutcome {
        let waiting = Instant::now();
        let mut budget = self.budget.lock().await;
        let waited = waiting.elapsed();
        Metrics::lock_wait(waited.as_secs_f64());
        info!(id = %opp.id(), waited_ms = waited.as_millis() as u64, "Execution lock acquired");

        if self.latch.is_triggered() {
            return DispatchOutcome::Skipped(SkipReason::Shutdown);
        }
        if let Err(refusal) = budget.admit() {
            info!(id = %opp.id(), %refusal, "Attempt not admitted");
            return DispatchOutcome::Skipped(SkipReason::Budget(refusal));
        }

        let rt = self.revalidator.revalidate(&opp).await;
        if !rt.viable {
            self.ledger.record(self.non_viable_attempt(&rt));
            return DispatchOutcome::NonViable(rt);
        }

        let volume = match self.clip_to_budget(&rt, budget.remaining()).await {
            Ok(v) => v,
            Err(reason) => {
                warn!(id = %opp.id(), %reason, "Attempt skipped");
                return DispatchOutcome::Skipped(reason);
            }
        };

        let attempt = self.runner.run(&rt, volume).await;
        budget.record(attempt.investment);
        Metrics::investment_set(budget.invested().to_f64().unwrap_or_default());
        self.ledger.record(attempt.clone());

        self.clock().sleep(self.settings.delay_between_orders).await;
        DispatchOutcome::Executed(attempt)
    }

    /// Largest volume whose cost fits the remaining budget.
    ///
    /// The budget is in the funding currency; it is valued in the common
    /// unit through the rate oracle and divided by the common buy price.
    async fn clip_to_budget(&self, rt: &RealTimeOpportunity, remaining: Decimal) -> Result<Size, SkipReason> {
        if !rt.buy_price.is_positive() {
            return Err(SkipReason::ZeroVolume);
        }
        let rate = self
            .runner
            .oracle()
            .rate_to_common(&self.settings.funding_currency)
            .await
            .map_err(|e| SkipReason::RateUnavailable(e.to_string()))?;

        let affordable =
            Size::new(remaining * rate / rt.buy_price.inner()).round_down_to_step(VOLUME_STEP);
        let volume = rt.volume.min(affordable);
        if !volume.is_positive() {
            return Err(SkipReason::ZeroVolume);
        }
        if volume < rt.volume {
            info!(
                planned = %rt.volume,
                clipped = %volume,
                %remaining,
                "Volume clipped to remaining budget"
            );
        }
        Ok(volume)
    }

    fn non_viable_attempt(&self, rt: &RealTimeOpportunity) -> ExecutionAttempt {
        let o = &rt.opportunity;
        let now = self.clock().now_ms();
        let mut attempt = ExecutionAttempt::new(
            o.target_currency.clone(),
            o.buy_market.clone(),
            o.sell_market.clone(),
            Size::ZERO,
            rt.margin_pct,
            now,
        );
        if let Err(e) = attempt.advance(AttemptStatus::NonViable) {
            error!(error = %e, "Illegal attempt transition");
        }
        attempt.error_reason = Some(rt.reason.clone());
        attempt.ended_at = Some(now);
        Metrics::attempt_finished(&attempt.status.to_string());
        attempt
    }
}

// ============================================================================
// RunCoordinator
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSettings {
    pub scan_interval: Duration,
    /// Stop after this many cycles. `None` runs until shutdown.
    pub max_cycles: Option<u64>,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            max_cycles: None,
        }
    }
}

/// Claim on one currency group. Released on drop.
struct ActiveJob {
    active: Arc<DashSet<String>>,
    currency: String,
}

impl ActiveJob {
    fn claim(active: &Arc<DashSet<String>>, currency: &str) -> Option<Self> {
        active.insert(currency.to_string()).then(|| Self {
            active: active.clone(),
            currency: currency.to_string(),
        })
    }
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        self.active.remove(&self.currency);
    }
}

/// Highest net margin first.
fn sort_by_margin(opps: &mut [ArbitrageOpportunity]) {
    opps.sort_by(|a, b| b.net_margin_pct.cmp(&a.net_margin_pct));
}

/// Dispatch `queue` in order until something stops the run.
async fn dispatch_queue(executor: &ExecutionCoordinator, queue: &[ArbitrageOpportunity]) {
    for opp in queue {
        if let DispatchOutcome::Skipped(reason) = executor.dispatch(opp).await {
            if reason.stops_dispatch() {
                info!(%reason, remaining = queue.len(), "Dispatch stopped");
                break;
            }
            debug!(id = %opp.id(), %reason, "Opportunity skipped");
        }
    }
}

pub struct RunCoordinator {
    detector: OpportunityDetector,
    executor: ExecutionCoordinator,
    active: Arc<DashSet<String>>,
    settings: LiveSettings,
}

impl RunCoordinator {
    pub fn new(detector: OpportunityDetector, executor: ExecutionCoordinator, settings: LiveSettings) -> Self {
        Self {
            detector,
            executor,
            active: Arc::new(DashSet::new()),
            settings,
        }
    }

    pub fn executor(&self) -> &ExecutionCoordinator {
        &self.executor
    }

    /// Execute a saved opportunity list, best margin first.
    pub async fn run_batch(&self, opportunities: &[ArbitrageOpportunity]) -> ExecutionResult {
        let mut queue: Vec<ArbitrageOpportunity> =
            opportunities.iter().filter(|o| o.viable).cloned().collect();
        sort_by_margin(&mut queue);
        info!(
            loaded = opportunities.len(),
            viable = queue.len(),
            "Batch execution started"
        );

        dispatch_queue(&self.executor, &queue).await;
        self.executor.ledger().summarize()
    }

    /// Detect and execute every `scan_interval` until shutdown or `max_cycles`.
    ///
    /// `after_cycle` runs once per cycle after its tasks are dispatched.
    /// On exit the loop waits for every in-flight group task.
    pub async fn run_live<F>(&self, groups: &[CandidateGroup], mut after_cycle: F) -> ExecutionResult
    where
        F: FnMut(u64),
    {
        let latch = self.executor.latch().clone();
        let clock = self.executor.clock().clone();
        let mut tasks = JoinSet::new();
        let mut cycle = 0u64;
        let reached_max = |cycle: u64| self.settings.max_cycles.is_some_and(|max| cycle >= max);

        info!(
            groups = groups.len(),
            scan_interval_secs = self.settings.scan_interval.as_secs(),
            max_cycles = ?self.settings.max_cycles,
            "Live loop started"
        );

        while !latch.is_triggered() && !reached_max(cycle) {
            cycle += 1;
            let mut spawned = 0usize;
            for group in groups {
                if self.spawn_group(&mut tasks, group.clone()) {
                    spawned += 1;
                }
            }

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Group task failed");
                }
            }
            Metrics::cycle_completed();
            after_cycle(cycle);
            info!(cycle, spawned, in_flight = tasks.len(), "Cycle dispatched");

            if reached_max(cycle) {
                break;
            }
            tokio::select! {
                _ = clock.sleep(self.settings.scan_interval) => {}
                _ = latch.wait() => break,
            }
        }

        info!(cycles = cycle, in_flight = tasks.len(), "Live loop stopping, waiting for in-flight tasks");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Group task failed");
            }
        }
        self.executor.ledger().summarize()
    }

    /// Spawn detection and dispatch for one group unless it is still active.
    fn spawn_group(&self, tasks: &mut JoinSet<()>, group: CandidateGroup) -> bool {
        let Some(job) = ActiveJob::claim(&self.active, &group.target_currency) else {
            debug!(currency = %group.target_currency, "Group still in progress, skipped");
            return false;
        };
        let detector = self.detector.clone();
        let executor = self.executor.clone();

        tasks.spawn(async move {
            let _job = job;
            let mut viable: Vec<ArbitrageOpportunity> = match detector.detect_group(&group).await {
                Ok(opps) => opps.into_iter().filter(|o| o.viable).collect(),
                Err(e) => {
                    debug!(currency = %group.target_currency, error = %e, "Group skipped");
                    return;
                }
            };
            if viable.is_empty() {
                return;
            }
            sort_by_margin(&mut viable);
            dispatch_queue(&executor, &viable).await;
        });
        true
    }
}
