//! Liquidation heatmap: buckets open liquidation exposure into
//! percentage-distance price levels, per asset and globally, and detects
//! contiguous clusters of significant notional.
//!
//! Pure functions over a frozen view of risk-annotated positions; callers
//! must not mutate the position set concurrently.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::models::PositionSide;
use crate::risk::PositionRisk;

/// One price bucket of liquidation exposure for a single asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapLevel {
    /// Re-derived from the bucket key so every position in the bucket
    /// renders at the same price: current × (1 + key × step / 100).
    pub price_level: Decimal,
    pub percent_from_current: Decimal,
    pub total_notional: Decimal,
    pub long_notional: Decimal,
    pub short_notional: Decimal,
    pub position_count: u64,
}

/// Cross-asset bucket keyed purely by percent distance from the mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalLevel {
    pub percent_from_current: Decimal,
    pub total_notional: Decimal,
    pub long_notional: Decimal,
    pub short_notional: Decimal,
    pub position_count: u64,
    /// Notional contributed per asset.
    pub by_asset: HashMap<String, Decimal>,
}

/// A contiguous run of levels whose notional is a significant fraction of
/// the asset's peak level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub price_low: Decimal,
    pub price_high: Decimal,
    pub total_notional: Decimal,
    pub long_notional: Decimal,
    pub short_notional: Decimal,
    pub position_count: u64,
    pub level_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetHeatmap {
    pub asset: String,
    pub current_price: Decimal,
    /// Ascending price order.
    pub levels: Vec<HeatmapLevel>,
    /// Descending by total notional.
    pub clusters: Vec<Cluster>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Heatmap {
    pub assets: Vec<AssetHeatmap>,
    /// Ascending percent-from-current order.
    pub global: Vec<GlobalLevel>,
}

#[derive(Default)]
struct LevelAcc {
    total: Decimal,
    long: Decimal,
    short: Decimal,
    count: u64,
}

impl LevelAcc {
    fn add(&mut self, side: PositionSide, notional: Decimal) {
        self.total += notional;
        match side {
            PositionSide::Long => self.long += notional,
            PositionSide::Short => self.short += notional,
        }
        self.count += 1;
    }
}

/// Build the heatmap from risk-annotated positions.
///
/// Only positions whose liquidation point lies inside the display window
/// `[current × (1 − w), current × (1 + w)]` are bucketed. This is an
/// intentional display clip; out-of-window positions still count for risk
/// alerting upstream. Assets with nothing in the window are omitted.
pub fn build_heatmap(risks: &[PositionRisk], config: &EngineConfig) -> Heatmap {
    let step = config.heatmap_step_pct;
    let window = config.heatmap_window_pct;

    // BTreeMaps keep assets and bucket keys deterministically ordered.
    let mut per_asset: BTreeMap<String, (Decimal, BTreeMap<i64, LevelAcc>)> = BTreeMap::new();
    let mut global: BTreeMap<i64, (LevelAcc, HashMap<String, Decimal>)> = BTreeMap::new();

    for risk in risks {
        let current = risk.current_price;
        if current <= Decimal::ZERO {
            continue;
        }
        let low = current * (Decimal::ONE - window);
        let high = current * (Decimal::ONE + window);
        if risk.liquidation_price < low || risk.liquidation_price > high {
            continue;
        }

        let percent = (risk.liquidation_price - current) / current * Decimal::ONE_HUNDRED;
        let key = match (percent / step)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
        {
            Some(k) => k,
            None => continue,
        };

        let (_, buckets) = per_asset
            .entry(risk.asset.clone())
            .or_insert_with(|| (current, BTreeMap::new()));
        buckets.entry(key).or_default().add(risk.side, risk.notional);

        let (acc, by_asset) = global.entry(key).or_default();
        acc.add(risk.side, risk.notional);
        *by_asset.entry(risk.asset.clone()).or_default() += risk.notional;
    }

    let assets = per_asset
        .into_iter()
        .map(|(asset, (current, buckets))| {
            let levels: Vec<HeatmapLevel> = buckets
                .into_iter()
                .map(|(key, acc)| {
                    let percent_from_current = Decimal::from(key) * step;
                    HeatmapLevel {
                        price_level: current
                            * (Decimal::ONE + percent_from_current / Decimal::ONE_HUNDRED),
                        percent_from_current,
                        total_notional: acc.total,
                        long_notional: acc.long,
                        short_notional: acc.short,
                        position_count: acc.count,
                    }
                })
                .collect();

            let clusters = detect_clusters(&levels, config.cluster_threshold);

            AssetHeatmap {
                asset,
                current_price: current,
                levels,
                clusters,
            }
        })
        .collect();

    let global = global
        .into_iter()
        .map(|(key, (acc, by_asset))| GlobalLevel {
            percent_from_current: Decimal::from(key) * step,
            total_notional: acc.total,
            long_notional: acc.long,
            short_notional: acc.short,
            position_count: acc.count,
            by_asset,
        })
        .collect();

    Heatmap { assets, global }
}

/// Scan levels in ascending price order and group contiguous runs whose
/// significance (level notional / peak level notional) meets `threshold`.
/// A run closes on the first sub-threshold level or when levels run out.
/// Returned sorted descending by total notional.
pub fn detect_clusters(levels: &[HeatmapLevel], threshold: Decimal) -> Vec<Cluster> {
    let peak = levels
        .iter()
        .map(|l| l.total_notional)
        .max()
        .unwrap_or(Decimal::ZERO);
    if peak <= Decimal::ZERO {
        return Vec::new();
    }

    let mut clusters = Vec::new();
    let mut run: Vec<&HeatmapLevel> = Vec::new();

    for level in levels {
        let significance = level.total_notional / peak;
        if significance >= threshold {
            run.push(level);
        } else if !run.is_empty() {
            clusters.push(close_run(&run));
            run.clear();
        }
    }
    if !run.is_empty() {
        clusters.push(close_run(&run));
    }

    clusters.sort_by(|a, b| b.total_notional.cmp(&a.total_notional));
    clusters
}

fn close_run(run: &[&HeatmapLevel]) -> Cluster {
    let mut cluster = Cluster {
        price_low: run[0].price_level,
        price_high: run[run.len() - 1].price_level,
        total_notional: Decimal::ZERO,
        long_notional: Decimal::ZERO,
        short_notional: Decimal::ZERO,
        position_count: 0,
        level_count: run.len(),
    };
    for level in run {
        cluster.total_notional += level.total_notional;
        cluster.long_notional += level.long_notional;
        cluster.short_notional += level.short_notional;
        cluster.position_count += level.position_count;
    }
    cluster
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_risk(asset: &str, side: PositionSide, current: i64, liq: Decimal, notional: i64) -> PositionRisk {
        PositionRisk {
            address: "0xwhale".to_string(),
            asset: asset.to_string(),
            side,
            size: Decimal::ONE,
            entry_price: Decimal::from(current),
            leverage: Decimal::from(10),
            current_price: Decimal::from(current),
            liquidation_price: liq,
            distance_percent: (Decimal::from(current) - liq).abs() / Decimal::from(current)
                * Decimal::ONE_HUNDRED,
            is_at_risk: false,
            notional: Decimal::from(notional),
        }
    }

    fn level(price: i64, total: i64) -> HeatmapLevel {
        HeatmapLevel {
            price_level: Decimal::from(price),
            percent_from_current: Decimal::ZERO,
            total_notional: Decimal::from(total),
            long_notional: Decimal::from(total),
            short_notional: Decimal::ZERO,
            position_count: 1,
        }
    }

    #[test]
    fn test_same_bucket_key_renders_identical_level() {
        // Liq prices 45010 and 45080 both round to key 0 at a 0.5% step on
        // a 45000 mark, so they must land on one level priced at the mark.
        let risks = vec![
            make_risk("BTC", PositionSide::Long, 45_000, Decimal::from(45_010), 1_000),
            make_risk("BTC", PositionSide::Short, 45_000, Decimal::from(45_080), 2_000),
        ];
        let heatmap = build_heatmap(&risks, &EngineConfig::default());

        assert_eq!(heatmap.assets.len(), 1);
        let asset = &heatmap.assets[0];
        assert_eq!(asset.levels.len(), 1);
        let level = &asset.levels[0];
        assert_eq!(level.price_level, Decimal::from(45_000));
        assert_eq!(level.position_count, 2);
        assert_eq!(level.total_notional, Decimal::from(3_000));
        assert_eq!(level.long_notional, Decimal::from(1_000));
        assert_eq!(level.short_notional, Decimal::from(2_000));
    }

    #[test]
    fn test_display_window_clips_far_liquidations() {
        let risks = vec![
            make_risk("BTC", PositionSide::Long, 45_000, Decimal::from(44_000), 1_000),
            // 70000 > 45000 × 1.5: outside the window.
            make_risk("BTC", PositionSide::Short, 45_000, Decimal::from(70_000), 9_000),
        ];
        let heatmap = build_heatmap(&risks, &EngineConfig::default());

        let asset = &heatmap.assets[0];
        let total: Decimal = asset.levels.iter().map(|l| l.total_notional).sum();
        assert_eq!(total, Decimal::from(1_000));
    }

    #[test]
    fn test_asset_with_nothing_in_window_is_omitted() {
        let risks = vec![make_risk(
            "DOGE",
            PositionSide::Short,
            100,
            Decimal::from(300),
            5_000,
        )];
        let heatmap = build_heatmap(&risks, &EngineConfig::default());
        assert!(heatmap.assets.is_empty());
        assert!(heatmap.global.is_empty());
    }

    #[test]
    fn test_levels_ascend_in_price() {
        let risks = vec![
            make_risk("BTC", PositionSide::Long, 45_000, Decimal::from(41_850), 1_000),
            make_risk("BTC", PositionSide::Short, 45_000, Decimal::from(48_150), 1_000),
            make_risk("BTC", PositionSide::Long, 45_000, Decimal::from(44_100), 1_000),
        ];
        let heatmap = build_heatmap(&risks, &EngineConfig::default());

        let levels = &heatmap.assets[0].levels;
        assert_eq!(levels.len(), 3);
        for pair in levels.windows(2) {
            assert!(pair[0].price_level < pair[1].price_level);
        }
    }

    #[test]
    fn test_global_levels_aggregate_across_assets() {
        // Both positions liquidate 2% below their own mark: one global
        // bucket keyed by percent, with a per-asset breakdown.
        let risks = vec![
            make_risk("BTC", PositionSide::Long, 45_000, Decimal::from(44_100), 1_000),
            make_risk("ETH", PositionSide::Long, 3_000, Decimal::from(2_940), 500),
        ];
        let heatmap = build_heatmap(&risks, &EngineConfig::default());

        assert_eq!(heatmap.assets.len(), 2);
        assert_eq!(heatmap.global.len(), 1);
        let global = &heatmap.global[0];
        assert_eq!(global.percent_from_current, Decimal::from(-2));
        assert_eq!(global.total_notional, Decimal::from(1_500));
        assert_eq!(global.by_asset["BTC"], Decimal::from(1_000));
        assert_eq!(global.by_asset["ETH"], Decimal::from(500));
    }

    #[test]
    fn test_single_cluster_spans_contiguous_significant_levels() {
        // Significance profile ~[0.03, 0.67, 1.0, 0.03] at threshold 0.1:
        // the two middle levels form exactly one cluster.
        let levels = vec![
            level(41_000, 1),
            level(42_000, 20),
            level(43_000, 30),
            level(44_000, 1),
        ];
        let clusters = detect_clusters(&levels, Decimal::new(1, 1));

        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[0];
        assert_eq!(cluster.level_count, 2);
        assert_eq!(cluster.price_low, Decimal::from(42_000));
        assert_eq!(cluster.price_high, Decimal::from(43_000));
        assert_eq!(cluster.total_notional, Decimal::from(50));
    }

    #[test]
    fn test_clusters_sorted_descending_by_notional() {
        let levels = vec![
            level(41_000, 20),
            level(42_000, 1),
            level(43_000, 40),
            level(44_000, 35),
        ];
        let clusters = detect_clusters(&levels, Decimal::new(3, 1));

        assert_eq!(clusters.len(), 2);
        assert!(clusters[0].total_notional > clusters[1].total_notional);
        assert_eq!(clusters[0].total_notional, Decimal::from(75));
    }

    #[test]
    fn test_no_levels_no_clusters() {
        assert!(detect_clusters(&[], Decimal::new(1, 1)).is_empty());
    }
}
