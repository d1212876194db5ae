//! Command pipeline tests: pairs -> detect -> depth -> execute, and live,
//! against scripted market data and a scripted trading API.
//!
//! Rates: 1 USDT = 100 INR. XRP asks 1.00 USDT (100 INR) on XRPUSDT and
//! bids 110 INR on XRPINR.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use cdcx_bot::{AppConfig, AppError, Application};
use cdcx_core::{
    AttemptStatus, Market, OrderBookLevel, OrderBookSnapshot, OrderSide, Price, Size,
};
use cdcx_executor::{ExecutorError, ManualClock, MockTradingClient};
use cdcx_feed::MockMarketData;
use cdcx_persistence::{read_journal, PersistenceError};

fn market(coin: &str, quote: &str) -> Market {
    Market {
        symbol: format!("{coin}{quote}"),
        trading_pair_id: format!("B-{coin}_{quote}"),
        quote_currency: quote.to_string(),
        target_currency: coin.to_string(),
        min_quantity: Size::new(dec!(0.1)),
        min_notional: dec!(1),
        active: true,
    }
}

fn lvl(p: Decimal, v: Decimal) -> OrderBookLevel {
    OrderBookLevel::new(Price::new(p), Size::new(v))
}

fn scripted_market() -> Arc<MockMarketData> {
    let mock = Arc::new(MockMarketData::new());
    mock.set_markets(vec![
        market("XRP", "USDT"),
        market("XRP", "INR"),
        // single-quote coin, never grouped
        market("SOL", "INR"),
    ]);
    mock.set_price("USDTINR", dec!(100));
    mock.set_book(OrderBookSnapshot::from_unsorted(
        "XRPUSDT",
        vec![lvl(dec!(0.99), dec!(8000))],
        vec![lvl(dec!(1.00), dec!(8000))],
    ));
    mock.set_book(OrderBookSnapshot::from_unsorted(
        "XRPINR",
        vec![lvl(dec!(110), dec!(6000))],
        vec![lvl(dec!(111), dec!(6000))],
    ));
    mock
}

fn scripted_trading(usdt: Decimal) -> Arc<MockTradingClient> {
    let trading = Arc::new(MockTradingClient::new());
    trading.set_balance("USDT", usdt);
    trading.fill_all(OrderSide::Buy, "XRPUSDT", Price::new(dec!(1.00)), Decimal::ZERO);
    trading.fill_all(OrderSide::Sell, "XRPINR", Price::new(dec!(110)), Decimal::ZERO);
    trading
}

fn application(dir: &TempDir, mock: Arc<MockMarketData>) -> Application {
    let mut config = AppConfig::default();
    config.persistence.data_dir = dir.path().join("data").display().to_string();
    config.live.max_cycles = Some(1);
    Application::with_provider(config, mock).unwrap()
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(1_700_000_000_000))
}

fn files_starting_with(dir: &Path, prefix: &str) -> Vec<std::path::PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect()
}

#[tokio::test]
async fn test_pipeline_pairs_detect_depth_execute() {
    let dir = TempDir::new().unwrap();
    let app = application(&dir, scripted_market());
    let data = app.data_dir().to_path_buf();

    let groups = app.pairs().await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].target_currency, "XRP");
    assert!(data.join("arbitrage_pairs.json").exists());

    let opportunities = app.detect().await.unwrap();
    let viable: Vec<_> = opportunities.iter().filter(|o| o.viable).collect();
    assert_eq!(viable.len(), 1);
    assert_eq!(viable[0].buy_market.symbol, "XRPUSDT");
    assert_eq!(viable[0].sell_market.symbol, "XRPINR");
    // (110 - 100 - (100 + 110) * 0.02) / 100
    assert_eq!(viable[0].net_margin_pct, dec!(5.8));
    assert!(data.join("arbitrage_opportunities.json").exists());

    let analyses = app.depth().await.unwrap();
    assert_eq!(analyses.len(), 1);
    assert!(data.join("depth_analysis.json").exists());

    let trading = scripted_trading(dec!(1000));
    let result = tokio_test::assert_ok!(app.execute(trading.clone(), clock()).await);

    assert_eq!(result.attempts.len(), 1);
    let attempt = &result.attempts[0];
    assert_eq!(attempt.status, AttemptStatus::SellFilled);
    // 100 USDT budget at 1.00 USDT per coin
    assert_eq!(attempt.executed_volume, Size::new(dec!(100)));
    assert_eq!(result.total_investment, dec!(100));
    assert_eq!(result.total_profit, dec!(1000));
    assert_eq!(result.success_rate, dec!(100));
    assert_eq!(trading.orders().len(), 2);

    assert_eq!(files_starting_with(&data, "execution_log_batch_").len(), 1);
    let journals = files_starting_with(&data, "attempts_");
    assert_eq!(journals.len(), 1);
    assert_eq!(read_journal(&journals[0]).unwrap().len(), 1);

    let rates = fs::read_to_string(data.join("exchange_rates.json")).unwrap();
    assert!(rates.contains("USDTINR"));
}

#[tokio::test]
async fn test_execute_refused_on_low_balance() {
    let dir = TempDir::new().unwrap();
    let app = application(&dir, scripted_market());
    app.pairs().await.unwrap();
    app.detect().await.unwrap();

    let trading = scripted_trading(dec!(5));
    let err = app.execute(trading.clone(), clock()).await.unwrap_err();

    assert!(matches!(err, AppError::Executor(ExecutorError::NotReady(_))));
    assert!(trading.orders().is_empty());
    assert!(files_starting_with(app.data_dir(), "execution_log_").is_empty());
}

#[tokio::test]
async fn test_detect_requires_saved_pairs() {
    let dir = TempDir::new().unwrap();
    let app = application(&dir, scripted_market());

    let err = app.detect().await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Persistence(PersistenceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_live_builds_universe_and_executes() {
    let dir = TempDir::new().unwrap();
    let mock = scripted_market();
    let app = application(&dir, mock.clone());

    let trading = scripted_trading(dec!(1000));
    let result = app.live(trading.clone(), clock()).await.unwrap();

    assert_eq!(mock.market_calls(), 1);
    assert!(app.data_dir().join("arbitrage_pairs.json").exists());
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.attempts[0].status, AttemptStatus::SellFilled);
    assert_eq!(files_starting_with(app.data_dir(), "execution_log_live_").len(), 1);

    let rates = fs::read_to_string(app.data_dir().join("exchange_rates.json")).unwrap();
    assert!(rates.contains("USDTINR"));
}

#[tokio::test]
async fn test_live_after_shutdown_starts_nothing() {
    let dir = TempDir::new().unwrap();
    let app = application(&dir, scripted_market());
    app.pairs().await.unwrap();
    app.latch().trigger("test");

    let trading = scripted_trading(dec!(1000));
    let result = app.live(trading.clone(), clock()).await.unwrap();

    assert!(result.attempts.is_empty());
    assert!(trading.orders().is_empty());
    assert_eq!(files_starting_with(app.data_dir(), "execution_log_live_").len(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_do_not_overlap() {
    let dir = TempDir::new().unwrap();
    let app = application(&dir, scripted_market());
    app.pairs().await.unwrap();
    app.detect().await.unwrap();
    let trading = scripted_trading(dec!(1000));
    let clock = clock();

    let (first, second) = tokio::join!(
        app.execute(trading.clone(), clock.clone()),
        app.execute(trading.clone(), clock.clone()),
    );

    let mut attempts: Vec<_> = first
        .unwrap()
        .attempts
        .into_iter()
        .chain(second.unwrap().attempts)
        .collect();
    assert_eq!(attempts.len(), 2);
    attempts.sort_by_key(|a| a.buy_submitted_at);
    assert!(attempts[1].buy_submitted_at.unwrap() >= attempts[0].ended_at.unwrap());
    assert_eq!(trading.orders().len(), 4);
}
