//! Application wiring and commands.
//!
//! One [`Application`] owns the shared market-data stack (provider, rate
//! oracle backed by the on-disk cache, book normalizer) and the artifact
//! store. Each command builds what it needs on top of it. Trading commands
//! hold the run lock for their whole run, so only one execution coordinator
//! is ever active per application.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use cdcx_core::{ArbitrageOpportunity, CandidateGroup, ExecutionResult};
use cdcx_detector::{DepthAnalysis, DepthAnalyzer, OpportunityDetector, Revalidator};
use cdcx_executor::{
    AccountReadiness, AttemptRunner, CoinDcxTradingClient, DynClock, DynTradingClient,
    ExecutionCoordinator, ExecutionLedger, FillPoller, PositionBudget, RequestSigner,
    RunCoordinator, ShutdownLatch,
};
use cdcx_feed::{BookNormalizer, DynMarketData, RateOracle};
use cdcx_persistence::{
    AttemptJournal, Artifacts, FileRateStore, JsonFileStore, PersistenceError,
};
use cdcx_registry::{CoinDcxPublicClient, UniverseBuilder};

use crate::config::{AppConfig, Credentials};
use crate::error::AppResult;

pub struct Application {
    config: AppConfig,
    provider: DynMarketData,
    rates: Arc<FileRateStore>,
    oracle: Arc<RateOracle>,
    normalizer: BookNormalizer,
    artifacts: Artifacts,
    data_dir: PathBuf,
    latch: Arc<ShutdownLatch>,
    run_lock: Mutex<()>,
}

impl Application {
    /// Create the application against the live CoinDCX public API.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let client = CoinDcxPublicClient::new(&config.api.api_url, &config.api.public_url)?;
        Self::with_provider(config, Arc::new(client))
    }

    pub fn with_provider(config: AppConfig, provider: DynMarketData) -> AppResult<Self> {
        let data_dir = PathBuf::from(&config.persistence.data_dir);
        let store = JsonFileStore::new(&data_dir)?;
        let rates = Arc::new(FileRateStore::load(data_dir.join(&config.rates.cache_file)));
        let oracle = Arc::new(
            RateOracle::new(
                provider.clone(),
                rates.clone(),
                config.rates.common_currency.clone(),
            )
            .with_ttl(config.rates.cache_ttl()),
        );
        let normalizer = BookNormalizer::new(
            provider.clone(),
            oracle.clone(),
            config.detector.max_order_levels,
        );

        info!(
            data_dir = %data_dir.display(),
            common_currency = %config.rates.common_currency,
            cached_rates = rates.len(),
            "Application initialized"
        );

        Ok(Self {
            config,
            provider,
            rates,
            oracle,
            normalizer,
            artifacts: Artifacts::new(Arc::new(store)),
            data_dir,
            latch: Arc::new(ShutdownLatch::new()),
            run_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// Triggered on Ctrl-C; stops new attempts and cycles.
    pub fn latch(&self) -> &Arc<ShutdownLatch> {
        &self.latch
    }

    /// Signed trading client from `COINDCX_API_KEY` / `COINDCX_API_SECRET`.
    pub fn trading_client(&self) -> AppResult<DynTradingClient> {
        let creds = Credentials::from_env()?;
        let signer = RequestSigner::new(creds.api_key, creds.api_secret);
        let client = CoinDcxTradingClient::new(&self.config.api.api_url, signer)?;
        Ok(Arc::new(client))
    }

    fn detector(&self) -> OpportunityDetector {
        OpportunityDetector::new(self.normalizer.clone(), self.config.detector.clone())
    }

    fn save_rates(&self) {
        if let Err(e) = self.rates.save() {
            warn!(error = %e, "Failed to save rate cache");
        }
    }

    /// Build the market universe and save it.
    pub async fn pairs(&self) -> AppResult<Vec<CandidateGroup>> {
        let builder = UniverseBuilder::new(self.provider.clone(), self.config.universe.clone());
        let groups = builder.build().await?;
        self.artifacts.save_pairs(&groups)?;
        Ok(groups)
    }

    /// Detect top-of-book opportunities over the saved universe.
    pub async fn detect(&self) -> AppResult<Vec<ArbitrageOpportunity>> {
        let groups = self.artifacts.load_pairs()?;
        let opportunities = self.detector().detect_all(&groups).await;
        self.artifacts.save_opportunities(&opportunities)?;
        self.save_rates();

        let viable = opportunities.iter().filter(|o| o.viable).count();
        info!(opportunities = opportunities.len(), viable, "Detect finished");
        Ok(opportunities)
    }

    /// Depth analysis of the saved viable opportunities.
    pub async fn depth(&self) -> AppResult<Vec<DepthAnalysis>> {
        let opportunities = self.artifacts.load_opportunities()?;
        let analyzer = DepthAnalyzer::new(self.normalizer.clone(), self.config.detector.clone());
        let analyses = analyzer.analyze_all(&opportunities).await;
        self.artifacts.save_depth(&analyses)?;
        self.save_rates();

        for a in &analyses {
            info!(
                id = %a.opportunity.id(),
                fills = a.simulation.max_profitable_fills,
                total_volume = %a.simulation.total_volume,
                total_profit = %a.simulation.total_profit,
                rating = ?a.rating,
                "Depth analysis"
            );
        }
        Ok(analyses)
    }

    /// Execute the saved opportunities once, best margin first.
    pub async fn execute(&self, client: DynTradingClient, clock: DynClock) -> AppResult<ExecutionResult> {
        let opportunities = self.artifacts.load_opportunities()?;
        let _run = self.run_lock.lock().await;
        let run = self.run_coordinator(client, clock).await?;

        let result = run.run_batch(&opportunities).await;
        self.finish_run("batch", &result)?;
        Ok(result)
    }

    /// Detect and execute every scan interval until shutdown.
    ///
    /// Uses the saved universe, building and saving one first if none exists.
    pub async fn live(&self, client: DynTradingClient, clock: DynClock) -> AppResult<ExecutionResult> {
        let groups = match self.artifacts.load_pairs() {
            Ok(groups) if !groups.is_empty() => groups,
            Ok(_) | Err(PersistenceError::NotFound(_)) => self.pairs().await?,
            Err(e) => return Err(e.into()),
        };
        let _run = self.run_lock.lock().await;
        let run = self.run_coordinator(client, clock).await?;

        let rates = self.rates.clone();
        let result = run
            .run_live(&groups, |cycle| {
                if let Err(e) = rates.save() {
                    warn!(cycle, error = %e, "Failed to save rate cache");
                }
            })
            .await;
        self.finish_run("live", &result)?;
        Ok(result)
    }

    /// Readiness check, then the execution stack sized by its report.
    async fn run_coordinator(
        &self,
        client: DynTradingClient,
        clock: DynClock,
    ) -> AppResult<RunCoordinator> {
        let exec = &self.config.execution;
        let readiness = AccountReadiness::new(
            client.clone(),
            exec.funding_currency.clone(),
            exec.min_required_usdt,
        );
        let report = readiness.check(exec.max_position_usdt).await?;

        let journal = AttemptJournal::new(&self.data_dir)?;
        let ledger = ExecutionLedger::new().with_sink(Arc::new(journal));

        let poller = FillPoller::new(client.clone(), clock.clone(), exec.poll_interval());
        let runner = AttemptRunner::new(
            client,
            poller,
            self.oracle.clone(),
            clock,
            exec.attempt_config(),
        );
        let coordinator = ExecutionCoordinator::new(
            Revalidator::new(self.normalizer.clone(), self.config.revalidation.clone()),
            runner,
            PositionBudget::new(report.max_position, exec.max_orders_per_run),
            Arc::new(ledger),
            self.latch.clone(),
            exec.settings(),
        );

        Ok(RunCoordinator::new(
            self.detector(),
            coordinator,
            self.config.live.settings(),
        ))
    }

    fn finish_run(&self, label: &str, result: &ExecutionResult) -> AppResult<()> {
        self.artifacts.save_execution_log(label, result, Utc::now())?;
        self.save_rates();
        info!(
            label,
            attempts = result.attempts.len(),
            total_profit = %result.total_profit,
            total_investment = %result.total_investment,
            success_rate = %result.success_rate,
            shutdown = self.latch.is_triggered(),
            "Run finished"
        );
        Ok(())
    }
}
