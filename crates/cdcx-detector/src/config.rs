//! Detector configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration for detection and depth analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum net margin, in percent, for an opportunity to be viable.
    #[serde(default = "default_min_net_margin_pct")]
    pub min_net_margin_pct: Decimal,
    /// Minimum best-level liquidity in the common unit, checked on both sides.
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: Decimal,
    /// Round-trip fee as a fraction (0.02 = 2%).
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Levels kept per side when normalizing books.
    #[serde(default = "default_max_order_levels")]
    pub max_order_levels: usize,
}

fn default_min_net_margin_pct() -> Decimal {
    Decimal::from(2)
}

fn default_min_liquidity() -> Decimal {
    Decimal::from(100)
}

fn default_fee_rate() -> Decimal {
    Decimal::new(2, 2)
}

fn default_max_order_levels() -> usize {
    10
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_net_margin_pct: default_min_net_margin_pct(),
            min_liquidity: default_min_liquidity(),
            fee_rate: default_fee_rate(),
            max_order_levels: default_max_order_levels(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.fee_rate.is_sign_negative() || self.fee_rate >= Decimal::ONE {
            return Err(format!("fee_rate ({}) must be in [0, 1)", self.fee_rate));
        }
        if self.min_liquidity.is_sign_negative() {
            return Err(format!(
                "min_liquidity ({}) must be non-negative",
                self.min_liquidity
            ));
        }
        if self.max_order_levels == 0 {
            return Err("max_order_levels must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Thresholds applied at decision time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevalidationConfig {
    /// Net margin floor, in percent. Below it the opportunity is dropped.
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    /// Minimum top-of-book volume, in coin units, on the thinner side.
    #[serde(default = "default_min_volume")]
    pub min_volume: Decimal,
    /// Upper bound on the volume of one attempt.
    #[serde(default = "default_max_clip_volume")]
    pub max_clip_volume: Decimal,
    /// Round-trip fee as a fraction, split evenly between both legs.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::from(3)
}

fn default_min_volume() -> Decimal {
    Decimal::from(1000)
}

fn default_max_clip_volume() -> Decimal {
    Decimal::from(5000)
}

impl Default for RevalidationConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            min_volume: default_min_volume(),
            max_clip_volume: default_max_clip_volume(),
            fee_rate: default_fee_rate(),
        }
    }
}

impl RevalidationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_volume.is_sign_negative() {
            return Err(format!("min_volume ({}) must be non-negative", self.min_volume));
        }
        if self.max_clip_volume <= Decimal::ZERO {
            return Err(format!(
                "max_clip_volume ({}) must be positive",
                self.max_clip_volume
            ));
        }
        if self.min_volume > self.max_clip_volume {
            return Err(format!(
                "min_volume ({}) must not exceed max_clip_volume ({})",
                self.min_volume, self.max_clip_volume
            ));
        }
        if self.fee_rate.is_sign_negative() || self.fee_rate >= Decimal::ONE {
            return Err(format!("fee_rate ({}) must be in [0, 1)", self.fee_rate));
        }
        Ok(())
    }
}
