pub mod accounting;
pub mod config;
pub mod feed;
pub mod heatmap;
pub mod metrics;
pub mod models;
pub mod risk;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::accounting::{WakeEvent, WhaleLedger};
use crate::config::EngineConfig;
use crate::feed::AccountSnapshot;
use crate::heatmap::Heatmap;
use crate::models::Fill;
use crate::risk::{CascadeReport, PositionRisk};

/// The analytics engine: position/PnL accounting, liquidation risk, and the
/// liquidation heatmap, wired in that order. Purely computational: polling,
/// delivery, and persistence live with the host.
///
/// Single-threaded by design: one batch per address runs to completion
/// before the next. Risk and heatmap computations are pure functions over
/// the frozen position set taken at call time.
#[derive(Debug, Default)]
pub struct Engine {
    pub config: EngineConfig,
    pub ledger: WhaleLedger,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ledger: WhaleLedger::new(),
        }
    }

    /// Ingest one batch of ordered fills plus the latest exchange snapshot
    /// for an address.
    pub fn process_batch(
        &mut self,
        address: &str,
        fills: &[Fill],
        snapshot: Option<&AccountSnapshot>,
        now: DateTime<Utc>,
    ) {
        self.ledger
            .process_batch(address, fills, snapshot, now, &self.config);
    }

    /// All open positions annotated with liquidation distance, sorted
    /// ascending by distance.
    pub fn analyze_risk(&self, prices: &HashMap<String, Decimal>) -> Vec<PositionRisk> {
        risk::analyze_positions(&self.ledger.open_positions(), prices, &self.config)
    }

    /// What-if: liquidations triggered by a uniform percent price move.
    pub fn predict_cascade(
        &self,
        prices: &HashMap<String, Decimal>,
        percent_move: Decimal,
    ) -> CascadeReport {
        ::metrics::counter!("whalewatch_cascade_simulations_total").increment(1);
        risk::predict_cascade(
            &self.ledger.open_positions(),
            prices,
            percent_move,
            &self.config,
        )
    }

    /// Per-asset and global liquidation heatmap with cluster detection.
    pub fn build_heatmap(&self, prices: &HashMap<String, Decimal>) -> Heatmap {
        let risks = self.analyze_risk(prices);
        heatmap::build_heatmap(&risks, &self.config)
    }

    /// Drain pending dormant-whale wake events (delivered exactly once).
    pub fn drain_wake_events(&mut self) -> Vec<WakeEvent> {
        self.ledger.drain_wake_events()
    }
}
