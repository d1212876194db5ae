//! Application configuration.
//!
//! Loaded from TOML. Every field has a default, so a partial file (or an
//! empty one) is valid. A handful of environment variables override the
//! file, and API credentials only ever come from the environment.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cdcx_detector::{DetectorConfig, RevalidationConfig};
use cdcx_executor::{AttemptConfig, ExecutionSettings, LiveSettings};
use cdcx_registry::UniverseConfig;

use crate::error::{AppError, AppResult};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const CONFIG_PATH_ENV: &str = "CDCX_CONFIG";
pub const API_KEY_ENV: &str = "COINDCX_API_KEY";
pub const API_SECRET_ENV: &str = "COINDCX_API_SECRET";

/// Exchange endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub api_url: String,
    pub public_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: cdcx_registry::client::DEFAULT_API_URL.to_string(),
            public_url: cdcx_registry::client::DEFAULT_PUBLIC_URL.to_string(),
        }
    }
}

/// Conversion-rate cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatesConfig {
    pub cache_ttl_secs: u64,
    /// File name under `persistence.data_dir`.
    pub cache_file: String,
    pub common_currency: String,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            cache_file: "exchange_rates.json".to_string(),
            common_currency: "INR".to_string(),
        }
    }
}

impl RatesConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Order placement and run limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Total funding-currency budget of one run.
    pub max_position_usdt: Decimal,
    /// Minimum funding balance to start trading.
    pub min_required_usdt: Decimal,
    pub order_timeout_secs: u64,
    pub recovery_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub delay_between_orders_ms: u64,
    pub max_orders_per_run: usize,
    pub funding_currency: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_position_usdt: Decimal::from(100),
            min_required_usdt: Decimal::from(10),
            order_timeout_secs: 30,
            recovery_timeout_secs: 15,
            poll_interval_ms: 1000,
            delay_between_orders_ms: 2000,
            max_orders_per_run: 5,
            funding_currency: "USDT".to_string(),
        }
    }
}

impl ExecutionConfig {
    pub fn attempt_config(&self) -> AttemptConfig {
        AttemptConfig {
            order_timeout: Duration::from_secs(self.order_timeout_secs),
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
            funding_currency: self.funding_currency.clone(),
        }
    }

    pub fn settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            funding_currency: self.funding_currency.clone(),
            delay_between_orders: Duration::from_millis(self.delay_between_orders_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_position_usdt <= Decimal::ZERO {
            return Err(format!(
                "execution.max_position_usdt ({}) must be positive",
                self.max_position_usdt
            ));
        }
        if self.min_required_usdt.is_sign_negative() {
            return Err(format!(
                "execution.min_required_usdt ({}) must be non-negative",
                self.min_required_usdt
            ));
        }
        if self.order_timeout_secs == 0 || self.recovery_timeout_secs == 0 {
            return Err("execution timeouts must be at least 1 second".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("execution.poll_interval_ms must be positive".to_string());
        }
        if self.max_orders_per_run == 0 {
            return Err("execution.max_orders_per_run must be at least 1".to_string());
        }
        if self.funding_currency.is_empty() {
            return Err("execution.funding_currency must not be empty".to_string());
        }
        Ok(())
    }
}

/// Live loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub scan_interval_secs: u64,
    /// Stop after this many cycles. Runs until shutdown if unset.
    pub max_cycles: Option<u64>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            max_cycles: None,
        }
    }
}

impl LiveConfig {
    pub fn settings(&self) -> LiveSettings {
        LiveSettings {
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            max_cycles: self.max_cycles,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Artifacts, rate cache, execution logs and the attempt journal.
    pub data_dir: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub universe: UniverseConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub revalidation: RevalidationConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl AppConfig {
    /// Config path: CLI argument, then `CDCX_CONFIG`, then the default.
    pub fn resolve_path(cli: Option<String>) -> String {
        cli.or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Read `path`, apply environment overrides and validate.
    ///
    /// A missing file at the default path falls back to defaults; an
    /// explicitly named file must exist.
    pub fn load(path: &str) -> AppResult<Self> {
        let mut config = if Path::new(path).exists() || path != DEFAULT_CONFIG_PATH {
            Self::from_file(path)?
        } else {
            warn!(path, "Config file not found, using defaults");
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate().map_err(AppError::Config)?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// `STOP_LOSS_PCT`, `MAX_POSITION_USDT` and `MIN_NET_MARGIN`.
    ///
    /// Only positive decimals are applied; anything else is logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let positive = |key: &str| -> Option<Decimal> {
            let raw = lookup(key)?;
            match raw.trim().parse::<Decimal>() {
                Ok(v) if v > Decimal::ZERO => {
                    info!(key, value = %v, "Config override from environment");
                    Some(v)
                }
                _ => {
                    warn!(key, value = %raw, "Ignoring invalid environment override");
                    None
                }
            }
        };

        if let Some(v) = positive("STOP_LOSS_PCT") {
            self.revalidation.stop_loss_pct = v;
        }
        if let Some(v) = positive("MAX_POSITION_USDT") {
            self.execution.max_position_usdt = v;
        }
        if let Some(v) = positive("MIN_NET_MARGIN") {
            self.detector.min_net_margin_pct = v;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api.api_url.is_empty() || self.api.public_url.is_empty() {
            return Err("api urls must not be empty".to_string());
        }
        self.universe.validate()?;
        self.detector.validate()?;
        self.revalidation.validate()?;
        self.execution.validate()?;
        if self.rates.common_currency.is_empty() {
            return Err("rates.common_currency must not be empty".to_string());
        }
        if self.live.scan_interval_secs == 0 {
            return Err("live.scan_interval_secs must be positive".to_string());
        }
        if self.persistence.data_dir.is_empty() {
            return Err("persistence.data_dir must not be empty".to_string());
        }
        Ok(())
    }
}

/// Trading API credentials.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::Credentials(format!("{key} is not set")))
        };
        Ok(Self {
            api_key: get(API_KEY_ENV)?,
            api_secret: get(API_SECRET_ENV)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}
