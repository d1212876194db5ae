//! End-to-end execution tests against scripted market data and a scripted
//! trading API.
//!
//! Rates: 1 USDT = 100 INR. Unless a test says otherwise the XRP books are
//! ask 1.00 USDT (100 INR) on XRPUSDT and bid 110 INR on XRPINR.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use cdcx_core::{
    ArbitrageOpportunity, AttemptStatus, CandidateGroup, Market, MarketRef, OrderBookLevel,
    OrderBookSnapshot, OrderSide, OrderStatus, Price, Size,
};
use cdcx_detector::{DetectorConfig, OpportunityDetector, RevalidationConfig, Revalidator};
use cdcx_executor::{
    AttemptConfig, AttemptRunner, BudgetRefusal, Clock, DispatchOutcome, DynClock,
    ExecutionCoordinator, ExecutionLedger, ExecutionSettings, FillPoller, LiveSettings,
    ManualClock, MockTradingClient, PositionBudget, RunCoordinator, ShutdownLatch, SkipReason,
    StatusStep,
};
use cdcx_feed::{BookNormalizer, BoxFuture, MemoryRateStore, MockMarketData, RateOracle};

struct Harness {
    market: Arc<MockMarketData>,
    trading: Arc<MockTradingClient>,
    latch: Arc<ShutdownLatch>,
    normalizer: BookNormalizer,
    coordinator: ExecutionCoordinator,
}

/// Manual clock that triggers the shutdown latch on its `trip_at`-th sleep.
struct TripClock {
    inner: ManualClock,
    latch: Arc<ShutdownLatch>,
    sleeps: AtomicU32,
    trip_at: u32,
}

impl Clock for TripClock {
    fn now_ms(&self) -> u64 {
        self.inner.now_ms()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        if self.sleeps.fetch_add(1, Ordering::SeqCst) + 1 == self.trip_at {
            self.latch.trigger("signal during fill polling");
        }
        self.inner.sleep(duration)
    }
}

fn harness(max_position: Decimal, max_orders: usize) -> Harness {
    harness_with_clock(max_position, max_orders, |_| -> DynClock {
        Arc::new(ManualClock::new(1_700_000_000_000))
    })
}

fn harness_with_clock(
    max_position: Decimal,
    max_orders: usize,
    make_clock: impl FnOnce(Arc<ShutdownLatch>) -> DynClock,
) -> Harness {
    let market = Arc::new(MockMarketData::new());
    market.set_price("USDTINR", dec!(100));
    let trading = Arc::new(MockTradingClient::new());
    let latch = Arc::new(ShutdownLatch::new());
    let clock = make_clock(latch.clone());

    let oracle = Arc::new(RateOracle::new(
        market.clone(),
        Arc::new(MemoryRateStore::new()),
        "INR",
    ));
    let normalizer = BookNormalizer::new(market.clone(), oracle.clone(), 10);
    let revalidator = Revalidator::new(
        normalizer.clone(),
        RevalidationConfig {
            min_volume: dec!(10),
            ..Default::default()
        },
    );
    let poller = FillPoller::new(trading.clone(), clock.clone(), Duration::from_secs(1));
    let runner = AttemptRunner::new(
        trading.clone(),
        poller,
        oracle,
        clock,
        AttemptConfig::default(),
    );
    let coordinator = ExecutionCoordinator::new(
        revalidator,
        runner,
        PositionBudget::new(max_position, max_orders),
        Arc::new(ExecutionLedger::new()),
        latch.clone(),
        ExecutionSettings::default(),
    );

    Harness {
        market,
        trading,
        latch,
        normalizer,
        coordinator,
    }
}

fn lvl(p: Decimal, v: Decimal) -> OrderBookLevel {
    OrderBookLevel::new(Price::new(p), Size::new(v))
}

fn set_books(market: &MockMarketData, coin: &str, sell_bid: Decimal) {
    market.set_book(OrderBookSnapshot::from_unsorted(
        &format!("{coin}USDT"),
        vec![lvl(dec!(0.99), dec!(8000))],
        vec![lvl(dec!(1.00), dec!(8000))],
    ));
    market.set_book(OrderBookSnapshot::from_unsorted(
        &format!("{coin}INR"),
        vec![lvl(sell_bid, dec!(6000))],
        vec![lvl(sell_bid + dec!(1), dec!(6000))],
    ));
}

fn opportunity(coin: &str, net_margin_pct: Decimal) -> ArbitrageOpportunity {
    ArbitrageOpportunity {
        target_currency: coin.to_string(),
        buy_market: MarketRef::new(format!("{coin}USDT"), format!("B-{coin}_USDT"), "USDT"),
        sell_market: MarketRef::new(format!("{coin}INR"), format!("I-{coin}_INR"), "INR"),
        buy_price_common: Price::new(dec!(100)),
        sell_price_common: Price::new(dec!(110)),
        gross_margin: dec!(10),
        gross_margin_pct: dec!(10),
        fee_estimate: dec!(4.2),
        net_margin: net_margin_pct,
        net_margin_pct,
        viable: true,
        computed_at: Utc::now(),
    }
}

fn executed(outcome: DispatchOutcome) -> cdcx_core::ExecutionAttempt {
    match outcome {
        DispatchOutcome::Executed(a) => a,
        other => panic!("expected an executed attempt, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sell_filled_profit_in_common_unit() {
    let h = harness(dec!(100), 5);
    set_books(&h.market, "XRP", dec!(110));
    h.trading
        .fill_all(OrderSide::Buy, "XRPUSDT", Price::new(dec!(1.00)), Decimal::ZERO);
    h.trading
        .fill_all(OrderSide::Sell, "XRPINR", Price::new(dec!(110)), Decimal::ZERO);

    let a = executed(h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await);

    assert_eq!(a.status, AttemptStatus::SellFilled);
    // 100 USDT budget at 1.00 USDT per coin
    assert_eq!(a.planned_volume.inner(), dec!(100));
    assert_eq!(a.executed_volume.inner(), dec!(100));
    assert_eq!(a.investment, dec!(100));
    // 100 * 110 - 100 * 1.00 * 100
    assert_eq!(a.actual_profit, Some(dec!(1000)));
    assert_eq!(a.actual_margin_pct, Some(dec!(10)));
    assert!(a.recovery_order_id.is_none());
    assert_eq!(
        a.history,
        vec![
            AttemptStatus::Created,
            AttemptStatus::BuySubmitted,
            AttemptStatus::BuyFilled,
            AttemptStatus::SellSubmitted,
            AttemptStatus::SellFilled,
        ]
    );
    assert_eq!(h.coordinator.budget().await.invested(), dec!(100));
}

#[tokio::test]
async fn test_sell_rejected_triggers_single_recovery() {
    let h = harness(dec!(100), 5);
    set_books(&h.market, "XRP", dec!(110));
    h.trading
        .fill_all(OrderSide::Buy, "XRPUSDT", Price::new(dec!(1.00)), Decimal::ZERO);
    h.trading
        .fail_submit(OrderSide::Sell, "XRPINR", "market suspended");
    h.trading
        .fill_all(OrderSide::Sell, "XRPUSDT", Price::new(dec!(0.99)), Decimal::ZERO);

    let a = executed(h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await);

    assert_eq!(a.status, AttemptStatus::RecoveryFilled);
    assert!(a.executed_volume.is_positive());
    let recovery = h.trading.orders_for(OrderSide::Sell, "XRPUSDT");
    assert_eq!(recovery.len(), 1);
    assert_eq!(recovery[0].quantity, a.executed_volume);
    assert_eq!(a.recovery_symbol.as_deref(), Some("XRPUSDT"));
    // Loss is kept, not coerced into a failure
    assert_eq!(a.actual_profit, Some(dec!(-100)));
    assert!(a
        .error_reason
        .as_deref()
        .unwrap()
        .starts_with("sell order placement failed"));
}

#[tokio::test]
async fn test_sell_timeout_cancels_and_recovers() {
    let h = harness(dec!(100), 5);
    set_books(&h.market, "XRP", dec!(110));
    h.trading
        .fill_all(OrderSide::Buy, "XRPUSDT", Price::new(dec!(1.00)), Decimal::ZERO);
    // XRPINR sell is unscripted and stays open past the deadline
    h.trading
        .fill_all(OrderSide::Sell, "XRPUSDT", Price::new(dec!(0.99)), Decimal::ZERO);

    let a = executed(h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await);

    assert_eq!(a.status, AttemptStatus::RecoveryFilled);
    assert_eq!(
        a.history,
        vec![
            AttemptStatus::Created,
            AttemptStatus::BuySubmitted,
            AttemptStatus::BuyFilled,
            AttemptStatus::SellSubmitted,
            AttemptStatus::RecoverySubmitted,
            AttemptStatus::RecoveryFilled,
        ]
    );
    assert_eq!(h.trading.cancels(), vec![a.sell_order_id.clone().unwrap()]);
    let recovery = h.trading.orders_for(OrderSide::Sell, "XRPUSDT");
    assert_eq!(recovery.len(), 1);
    assert_eq!(recovery[0].quantity, a.executed_volume);
    assert_eq!(h.trading.orders_for(OrderSide::Sell, "XRPINR").len(), 1);
    assert!(a
        .error_reason
        .as_deref()
        .unwrap()
        .starts_with("sell order not filled within 30s"));
    assert_eq!(a.actual_profit, Some(dec!(-100)));
}

#[tokio::test]
async fn test_recovery_failure_needs_manual_intervention() {
    let h = harness(dec!(100), 5);
    set_books(&h.market, "XRP", dec!(110));
    h.trading
        .fill_all(OrderSide::Buy, "XRPUSDT", Price::new(dec!(1.00)), Decimal::ZERO);
    let rejected = MockTradingClient::report(OrderStatus::Rejected, dec!(0), dec!(0));
    h.trading.script_status(
        OrderSide::Sell,
        "XRPINR",
        vec![StatusStep::Report(rejected.clone())],
    );
    h.trading
        .script_status(OrderSide::Sell, "XRPUSDT", vec![StatusStep::Report(rejected)]);

    let a = executed(h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await);

    assert_eq!(a.status, AttemptStatus::RecoveryFailed);
    assert!(a.actual_profit.is_none());
    assert_eq!(h.trading.orders_for(OrderSide::Sell, "XRPUSDT").len(), 1);

    let result = h.coordinator.ledger().summarize();
    assert_eq!(result.needs_manual_intervention().count(), 1);
    assert_eq!(result.success_rate, Decimal::ZERO);
}

#[tokio::test]
async fn test_buy_cancelled_with_partial_fill_is_abort() {
    let h = harness(dec!(100), 5);
    set_books(&h.market, "XRP", dec!(110));
    let partial = MockTradingClient::report(OrderStatus::Cancelled, dec!(3), dec!(1.00));
    h.trading
        .script_status(OrderSide::Buy, "XRPUSDT", vec![StatusStep::Report(partial)]);

    let a = executed(h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await);

    assert_eq!(a.status, AttemptStatus::BuyAborted);
    assert_eq!(a.executed_volume, Size::ZERO);
    assert!(a.error_reason.as_deref().unwrap().contains("partial fill 3"));
    // The 3 coins bought are held and counted against the budget
    assert_eq!(a.investment, dec!(3));
    assert_eq!(h.coordinator.budget().await.invested(), dec!(3));
    assert!(h.trading.orders_for(OrderSide::Sell, "XRPINR").is_empty());
    assert!(h.trading.orders_for(OrderSide::Sell, "XRPUSDT").is_empty());
    assert!(a.recovery_symbol.is_none());
}

#[tokio::test]
async fn test_buy_timeout_cancels_and_never_sells() {
    let h = harness(dec!(100), 5);
    set_books(&h.market, "XRP", dec!(110));
    // Unscripted orders stay open

    let a = executed(h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await);

    assert_eq!(a.status, AttemptStatus::BuyAborted);
    assert_eq!(a.error_reason.as_deref(), Some("buy order not filled within 30s"));
    assert_eq!(h.trading.orders().len(), 1);
    assert_eq!(h.trading.cancels(), vec![a.buy_order_id.clone().unwrap()]);
    assert_eq!(h.coordinator.budget().await.invested(), Decimal::ZERO);
}

#[tokio::test]
async fn test_non_viable_is_recorded_without_orders() {
    let h = harness(dec!(100), 5);
    set_books(&h.market, "XRP", dec!(101));

    let outcome = h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await;

    let DispatchOutcome::NonViable(rt) = outcome else {
        panic!("expected non-viable");
    };
    assert!(rt.reason.starts_with("margin too low"));
    assert!(h.trading.orders().is_empty());

    let attempts = h.coordinator.ledger().attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::NonViable);
    assert_eq!(attempts[0].error_reason.as_deref(), Some(rt.reason.as_str()));
}

#[tokio::test]
async fn test_shutdown_prevents_new_attempts() {
    let h = harness(dec!(100), 5);
    set_books(&h.market, "XRP", dec!(110));
    h.latch.trigger("test");

    let outcome = h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await;

    assert!(matches!(outcome, DispatchOutcome::Skipped(SkipReason::Shutdown)));
    assert!(h.trading.orders().is_empty());
    assert!(h.market.book_calls().is_empty());
}

#[tokio::test]
async fn test_shutdown_during_attempt_lets_it_finish() {
    // First sleep is the buy leg's first fill poll
    let h = harness_with_clock(dec!(1000), 5, |latch| -> DynClock {
        Arc::new(TripClock {
            inner: ManualClock::new(1_700_000_000_000),
            latch,
            sleeps: AtomicU32::new(0),
            trip_at: 1,
        })
    });
    set_books(&h.market, "XRP", dec!(110));
    h.trading
        .fill_all(OrderSide::Buy, "XRPUSDT", Price::new(dec!(1.00)), Decimal::ZERO);
    h.trading
        .fill_all(OrderSide::Sell, "XRPINR", Price::new(dec!(110)), Decimal::ZERO);

    let a = executed(h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await);

    assert!(h.latch.is_triggered());
    assert!(a.status.is_terminal());
    assert_eq!(a.status, AttemptStatus::SellFilled);
    assert!(a.ended_at.is_some());
    assert_eq!(h.coordinator.ledger().attempts().len(), 1);

    let next = h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await;
    assert!(matches!(next, DispatchOutcome::Skipped(SkipReason::Shutdown)));
    assert_eq!(h.trading.orders().len(), 2);
}

#[tokio::test]
async fn test_volume_clipped_to_budget_step() {
    // 33.333333337 USDT at 1.00 USDT per coin, cut to eight decimals
    let h = harness(dec!(33.333333337), 5);
    set_books(&h.market, "XRP", dec!(110));
    h.trading
        .fill_all(OrderSide::Buy, "XRPUSDT", Price::new(dec!(1.00)), Decimal::ZERO);
    h.trading
        .fill_all(OrderSide::Sell, "XRPINR", Price::new(dec!(110)), Decimal::ZERO);

    let a = executed(h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await);

    assert_eq!(a.planned_volume, Size::new(dec!(33.33333333)));
    assert_eq!(
        h.trading.orders_for(OrderSide::Buy, "XRPUSDT")[0].quantity,
        Size::new(dec!(33.33333333))
    );
}

#[tokio::test]
async fn test_budget_exhaustion_stops_admission() {
    let h = harness(dec!(100), 5);
    set_books(&h.market, "XRP", dec!(110));
    h.trading
        .fill_all(OrderSide::Buy, "XRPUSDT", Price::new(dec!(1.00)), Decimal::ZERO);
    h.trading
        .fill_all(OrderSide::Sell, "XRPINR", Price::new(dec!(110)), Decimal::ZERO);

    executed(h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await);
    let second = h.coordinator.dispatch(&opportunity("XRP", dec!(5.8))).await;

    assert!(matches!(
        second,
        DispatchOutcome::Skipped(SkipReason::Budget(BudgetRefusal::PositionLimit { .. }))
    ));
    assert_eq!(h.trading.orders_for(OrderSide::Buy, "XRPUSDT").len(), 1);
}

#[tokio::test]
async fn test_non_funding_buy_market_is_skipped() {
    let h = harness(dec!(100), 5);
    let mut opp = opportunity("XRP", dec!(5.8));
    opp.buy_market = MarketRef::new("XRPBTC", "B-XRP_BTC", "BTC");

    let outcome = h.coordinator.dispatch(&opp).await;

    assert!(matches!(
        outcome,
        DispatchOutcome::Skipped(SkipReason::UnsupportedBuyMarket { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatch_is_single_flight() {
    let h = harness(dec!(1000000), 10);
    let coins = ["XRP", "ADA", "DOGE", "TRX"];
    for coin in coins {
        set_books(&h.market, coin, dec!(110));
        h.trading.script_status(
            OrderSide::Buy,
            &format!("{coin}USDT"),
            vec![
                StatusStep::Report(MockTradingClient::report(OrderStatus::Open, dec!(0), dec!(0))),
                StatusStep::FillAll {
                    avg_price: Price::new(dec!(1.00)),
                    fee: Decimal::ZERO,
                },
            ],
        );
        h.trading.fill_all(
            OrderSide::Sell,
            &format!("{coin}INR"),
            Price::new(dec!(110)),
            Decimal::ZERO,
        );
    }

    let handles: Vec<_> = coins
        .iter()
        .map(|coin| {
            let coordinator = h.coordinator.clone();
            let opp = opportunity(coin, dec!(5.8));
            tokio::spawn(async move { coordinator.dispatch(&opp).await })
        })
        .collect();
    for handle in handles {
        executed(handle.await.unwrap());
    }

    let mut attempts = h.coordinator.ledger().attempts();
    assert_eq!(attempts.len(), 4);
    attempts.sort_by_key(|a| a.buy_submitted_at);
    for pair in attempts.windows(2) {
        let prev_end = pair[0].ended_at.unwrap();
        let next_start = pair[1].buy_submitted_at.unwrap();
        assert!(
            next_start >= prev_end,
            "{} started at {} before {} ended at {}",
            pair[1].currency,
            next_start,
            pair[0].currency,
            prev_end
        );
    }
}

#[tokio::test]
async fn test_run_batch_prefers_highest_margin() {
    let h = harness(dec!(1000), 1);
    for coin in ["XRP", "ADA"] {
        set_books(&h.market, coin, dec!(110));
        h.trading.fill_all(
            OrderSide::Buy,
            &format!("{coin}USDT"),
            Price::new(dec!(1.00)),
            Decimal::ZERO,
        );
        h.trading.fill_all(
            OrderSide::Sell,
            &format!("{coin}INR"),
            Price::new(dec!(110)),
            Decimal::ZERO,
        );
    }
    let mut skipped = opportunity("DOGE", dec!(9));
    skipped.viable = false;
    let run = RunCoordinator::new(
        OpportunityDetector::new(h.normalizer.clone(), DetectorConfig::default()),
        h.coordinator.clone(),
        LiveSettings::default(),
    );

    let result = run
        .run_batch(&[opportunity("XRP", dec!(3)), opportunity("ADA", dec!(7)), skipped])
        .await;

    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.attempts[0].currency, "ADA");
    assert_eq!(result.success_rate, dec!(100));
    // 1000 USDT budget buys 1000 coins at 1.00
    assert_eq!(result.total_investment, dec!(1000));
}

fn market(coin: &str, quote: &str) -> Market {
    Market {
        symbol: format!("{coin}{quote}"),
        trading_pair_id: format!("B-{coin}_{quote}"),
        quote_currency: quote.to_string(),
        target_currency: coin.to_string(),
        min_quantity: Size::ONE,
        min_notional: Decimal::ZERO,
        active: true,
    }
}

#[tokio::test]
async fn test_run_live_detects_and_executes() {
    let h = harness(dec!(100), 1);
    set_books(&h.market, "XRP", dec!(110));
    h.trading
        .fill_all(OrderSide::Buy, "XRPUSDT", Price::new(dec!(1.00)), Decimal::ZERO);
    h.trading
        .fill_all(OrderSide::Sell, "XRPINR", Price::new(dec!(110)), Decimal::ZERO);
    let groups = vec![CandidateGroup {
        target_currency: "XRP".into(),
        markets: vec![market("XRP", "USDT"), market("XRP", "INR")],
        last_updated: Utc::now(),
    }];
    let run = RunCoordinator::new(
        OpportunityDetector::new(h.normalizer.clone(), DetectorConfig::default()),
        h.coordinator.clone(),
        LiveSettings {
            scan_interval: Duration::from_secs(30),
            max_cycles: Some(2),
        },
    );
    let cycles = Arc::new(Mutex::new(Vec::new()));

    let result = {
        let cycles = cycles.clone();
        run.run_live(&groups, move |c| cycles.lock().push(c)).await
    };

    assert_eq!(*cycles.lock(), vec![1, 2]);
    // Order limit of one: the second cycle cannot start another attempt
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.attempts[0].status, AttemptStatus::SellFilled);
    assert_eq!(result.attempts[0].sell_market.symbol, "XRPINR");
}

#[tokio::test]
async fn test_run_live_exits_at_once_after_shutdown() {
    let h = harness(dec!(100), 1);
    h.latch.trigger("stop");
    let run = RunCoordinator::new(
        OpportunityDetector::new(h.normalizer.clone(), DetectorConfig::default()),
        h.coordinator.clone(),
        LiveSettings::default(),
    );
    let mut cycles = 0;

    let result = run.run_live(&[], |_| cycles += 1).await;

    assert_eq!(cycles, 0);
    assert!(result.attempts.is_empty());
}
