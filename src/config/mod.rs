use rust_decimal::Decimal;
use std::env;
use thiserror::Error;

/// Engine tunables. Every default matches the exchange conventions the
/// analytics were calibrated against; override via `WHALEWATCH_*` env vars.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lot sizes below this absolute value are treated as fully closed.
    pub dust_epsilon: Decimal,
    /// Maintenance margin ratio used when estimating liquidation prices.
    pub maintenance_margin_ratio: Decimal,
    /// Days without fills (and no open positions) before a whale is dormant.
    pub dormancy_days: i64,
    /// Liquidation distance (percent) below which a position is at risk.
    pub at_risk_threshold_pct: Decimal,
    /// Heatmap bucket width as a percent of the current mark.
    pub heatmap_step_pct: Decimal,
    /// Half-width of the heatmap display window as a fraction of the mark;
    /// 0.5 keeps liquidation points in [mark × 0.5, mark × 1.5].
    pub heatmap_window_pct: Decimal,
    /// Minimum significance (level notional / peak level notional) for a
    /// level to join a cluster.
    pub cluster_threshold: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dust_epsilon: Decimal::new(1, 9),             // 1e-9
            maintenance_margin_ratio: Decimal::new(3, 2), // 0.03
            dormancy_days: 7,
            at_risk_threshold_pct: Decimal::from(10),
            heatmap_step_pct: Decimal::new(5, 1),  // 0.5
            heatmap_window_pct: Decimal::new(5, 1), // 0.5
            cluster_threshold: Decimal::new(1, 1), // 0.1
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("heatmap step must be positive, got {0}")]
    NonPositiveStep(Decimal),

    #[error("cluster threshold must be in (0, 1], got {0}")]
    ThresholdOutOfRange(Decimal),

    #[error("dormancy window must be at least 1 day, got {0}")]
    DormancyTooShort(i64),

    #[error("heatmap window must be in (0, 1), got {0}")]
    WindowOutOfRange(Decimal),
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let config = Self {
            dust_epsilon: env_decimal("WHALEWATCH_DUST_EPSILON", defaults.dust_epsilon),
            maintenance_margin_ratio: env_decimal(
                "WHALEWATCH_MAINTENANCE_MARGIN_RATIO",
                defaults.maintenance_margin_ratio,
            ),
            dormancy_days: env::var("WHALEWATCH_DORMANCY_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.dormancy_days),
            at_risk_threshold_pct: env_decimal(
                "WHALEWATCH_AT_RISK_THRESHOLD_PCT",
                defaults.at_risk_threshold_pct,
            ),
            heatmap_step_pct: env_decimal("WHALEWATCH_HEATMAP_STEP_PCT", defaults.heatmap_step_pct),
            heatmap_window_pct: env_decimal(
                "WHALEWATCH_HEATMAP_WINDOW_PCT",
                defaults.heatmap_window_pct,
            ),
            cluster_threshold: env_decimal(
                "WHALEWATCH_CLUSTER_THRESHOLD",
                defaults.cluster_threshold,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heatmap_step_pct <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveStep(self.heatmap_step_pct));
        }
        if self.cluster_threshold <= Decimal::ZERO || self.cluster_threshold > Decimal::ONE {
            return Err(ConfigError::ThresholdOutOfRange(self.cluster_threshold));
        }
        if self.dormancy_days < 1 {
            return Err(ConfigError::DormancyTooShort(self.dormancy_days));
        }
        if self.heatmap_window_pct <= Decimal::ZERO || self.heatmap_window_pct >= Decimal::ONE {
            return Err(ConfigError::WindowOutOfRange(self.heatmap_window_pct));
        }
        Ok(())
    }
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
