use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::models::{Position, PositionSide};

/// One open position annotated with its liquidation risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRisk {
    pub address: String,
    pub asset: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub leverage: Decimal,
    pub current_price: Decimal,
    /// Exchange-reported when available, estimated otherwise.
    pub liquidation_price: Decimal,
    /// |current − liq| / current × 100.
    pub distance_percent: Decimal,
    pub is_at_risk: bool,
    /// Valued at the current mark.
    pub notional: Decimal,
}

/// Outcome of a hypothetical uniform price move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeReport {
    pub percent_move: Decimal,
    pub total_liquidated_notional: Decimal,
    pub liquidated_count: u64,
    /// Liquidated notional per asset.
    pub by_asset: HashMap<String, Decimal>,
}

/// Liquidation price for a position. An exchange-supplied price > 0 is
/// authoritative; otherwise it is estimated from entry price and leverage
/// with `mult = 1/leverage − maintenance_margin_ratio`, clamped at zero.
pub fn liquidation_price(position: &Position, maintenance_margin_ratio: Decimal) -> Decimal {
    if let Some(reported) = position.liquidation_price {
        if reported > Decimal::ZERO {
            return reported;
        }
    }

    let leverage = if position.leverage > Decimal::ZERO {
        position.leverage
    } else {
        Decimal::ONE
    };
    let mult = Decimal::ONE / leverage - maintenance_margin_ratio;

    let estimated = match position.side {
        PositionSide::Long => position.entry_price * (Decimal::ONE - mult),
        PositionSide::Short => position.entry_price * (Decimal::ONE + mult),
    };
    estimated.max(Decimal::ZERO)
}

/// Annotate every position with liquidation distance and notional at the
/// current mark, sorted ascending by `distance_percent`. Downstream alerting
/// reads the closest-to-liquidation positions from the front; the ordering
/// is part of the contract. Positions whose asset has no mark are skipped.
pub fn analyze_positions(
    positions: &[Position],
    prices: &HashMap<String, Decimal>,
    config: &EngineConfig,
) -> Vec<PositionRisk> {
    let mut risks: Vec<PositionRisk> = positions
        .iter()
        .filter_map(|pos| {
            let current = match prices.get(&pos.asset) {
                Some(p) if *p > Decimal::ZERO => *p,
                _ => {
                    tracing::warn!(
                        address = %pos.address,
                        asset = %pos.asset,
                        "No mark price for position — skipping risk annotation"
                    );
                    return None;
                }
            };

            let liq = liquidation_price(pos, config.maintenance_margin_ratio);
            let distance_percent = (current - liq).abs() / current * Decimal::ONE_HUNDRED;

            Some(PositionRisk {
                address: pos.address.clone(),
                asset: pos.asset.clone(),
                side: pos.side,
                size: pos.size,
                entry_price: pos.entry_price,
                leverage: pos.leverage,
                current_price: current,
                liquidation_price: liq,
                distance_percent,
                is_at_risk: distance_percent < config.at_risk_threshold_pct,
                notional: pos.notional_at(current),
            })
        })
        .collect();

    risks.sort_by(|a, b| a.distance_percent.cmp(&b.distance_percent));
    risks
}

/// Pure what-if: shift every asset's mark uniformly by `percent_move` and
/// report which open positions would cross their liquidation price. Longs
/// liquidate when the shifted price falls to or through it, shorts when it
/// rises to or through it. No side effects, no I/O.
pub fn predict_cascade(
    positions: &[Position],
    prices: &HashMap<String, Decimal>,
    percent_move: Decimal,
    config: &EngineConfig,
) -> CascadeReport {
    let shift = Decimal::ONE + percent_move / Decimal::ONE_HUNDRED;
    let mut total = Decimal::ZERO;
    let mut count = 0u64;
    let mut by_asset: HashMap<String, Decimal> = HashMap::new();

    for pos in positions {
        let current = match prices.get(&pos.asset) {
            Some(p) if *p > Decimal::ZERO => *p,
            _ => continue,
        };
        let shifted = current * shift;
        let liq = liquidation_price(pos, config.maintenance_margin_ratio);

        let liquidated = match pos.side {
            PositionSide::Long => shifted <= liq,
            PositionSide::Short => shifted >= liq,
        };
        if !liquidated {
            continue;
        }

        let notional = pos.notional_at(current);
        total += notional;
        count += 1;
        *by_asset.entry(pos.asset.clone()).or_default() += notional;
    }

    CascadeReport {
        percent_move,
        total_liquidated_notional: total,
        liquidated_count: count,
        by_asset,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_position(
        asset: &str,
        side: PositionSide,
        size: i64,
        entry: i64,
        leverage: i64,
        reported_liq: Option<Decimal>,
    ) -> Position {
        Position {
            address: "0xwhale".to_string(),
            asset: asset.to_string(),
            side,
            size: Decimal::from(size),
            entry_price: Decimal::from(entry),
            leverage: Decimal::from(leverage),
            margin_used: Decimal::ZERO,
            liquidation_price: reported_liq,
            unrealized_pnl: Decimal::ZERO,
            notional: Decimal::from(size * entry),
            last_updated: Utc::now(),
        }
    }

    fn prices(entries: &[(&str, i64)]) -> HashMap<String, Decimal> {
        entries
            .iter()
            .map(|(a, p)| (a.to_string(), Decimal::from(*p)))
            .collect()
    }

    #[test]
    fn test_estimated_long_liquidation_price() {
        // entry 45000, 10x, mmr 0.03 → mult 0.07 → 45000 × 0.93 = 41850.
        let pos = make_position("BTC", PositionSide::Long, 1, 45_000, 10, None);
        let liq = liquidation_price(&pos, Decimal::new(3, 2));
        assert_eq!(liq, Decimal::from(41_850));
    }

    #[test]
    fn test_estimated_short_liquidation_price() {
        let pos = make_position("BTC", PositionSide::Short, 1, 45_000, 10, None);
        let liq = liquidation_price(&pos, Decimal::new(3, 2));
        assert_eq!(liq, Decimal::from(48_150));
    }

    #[test]
    fn test_reported_liquidation_price_is_authoritative() {
        let pos = make_position(
            "BTC",
            PositionSide::Long,
            1,
            45_000,
            10,
            Some(Decimal::from(40_000)),
        );
        let liq = liquidation_price(&pos, Decimal::new(3, 2));
        assert_eq!(liq, Decimal::from(40_000));
    }

    #[test]
    fn test_estimate_clamps_at_zero() {
        // Sub-1x leverage makes the multiplier exceed 1; the long estimate
        // would go negative without the clamp.
        let mut pos = make_position("BTC", PositionSide::Long, 1, 45_000, 1, None);
        pos.leverage = Decimal::new(5, 1); // 0.5x
        let liq = liquidation_price(&pos, Decimal::new(3, 2));
        assert_eq!(liq, Decimal::ZERO);
    }

    #[test]
    fn test_analyze_sorted_ascending_by_distance() {
        let positions = vec![
            make_position("BTC", PositionSide::Long, 1, 45_000, 5, None),
            make_position("BTC", PositionSide::Long, 1, 45_000, 20, None),
            make_position("BTC", PositionSide::Long, 1, 45_000, 10, None),
        ];
        let risks = analyze_positions(
            &positions,
            &prices(&[("BTC", 45_000)]),
            &EngineConfig::default(),
        );

        assert_eq!(risks.len(), 3);
        for pair in risks.windows(2) {
            assert!(pair[0].distance_percent <= pair[1].distance_percent);
        }
        // 20x is closest to liquidation.
        assert_eq!(risks[0].leverage, Decimal::from(20));
    }

    #[test]
    fn test_analyze_flags_at_risk_and_values_at_mark() {
        // 20x long: liq = 45000 × (1 − 0.02) = 44100; at mark 46000 that
        // is ~4.1% away → at risk under the 10% threshold.
        let positions = vec![make_position("BTC", PositionSide::Long, 2, 45_000, 20, None)];
        let risks = analyze_positions(
            &positions,
            &prices(&[("BTC", 46_000)]),
            &EngineConfig::default(),
        );

        assert_eq!(risks.len(), 1);
        assert!(risks[0].is_at_risk);
        assert_eq!(risks[0].notional, Decimal::from(92_000));
    }

    #[test]
    fn test_analyze_skips_positions_without_marks() {
        let positions = vec![make_position("XYZ", PositionSide::Long, 1, 100, 10, None)];
        let risks = analyze_positions(&positions, &prices(&[]), &EngineConfig::default());
        assert!(risks.is_empty());
    }

    #[test]
    fn test_cascade_long_liquidated_on_drop() {
        // 10x long from 45000: liq 41850. A −10% move takes the mark from
        // 45000 to 40500, through the liquidation price.
        let positions = vec![
            make_position("BTC", PositionSide::Long, 2, 45_000, 10, None),
            make_position("BTC", PositionSide::Short, 1, 45_000, 10, None),
        ];
        let marks = prices(&[("BTC", 45_000)]);
        let report = predict_cascade(
            &positions,
            &marks,
            Decimal::from(-10),
            &EngineConfig::default(),
        );

        assert_eq!(report.liquidated_count, 1);
        assert_eq!(report.total_liquidated_notional, Decimal::from(90_000));
        assert_eq!(report.by_asset["BTC"], Decimal::from(90_000));
    }

    #[test]
    fn test_cascade_short_liquidated_on_rally() {
        // 10x short from 45000: liq 48150. +8% → 48600 crosses it.
        let positions = vec![make_position("BTC", PositionSide::Short, 1, 45_000, 10, None)];
        let marks = prices(&[("BTC", 45_000)]);
        let report = predict_cascade(
            &positions,
            &marks,
            Decimal::from(8),
            &EngineConfig::default(),
        );

        assert_eq!(report.liquidated_count, 1);
    }

    #[test]
    fn test_cascade_is_pure() {
        let positions = vec![make_position("BTC", PositionSide::Long, 1, 45_000, 10, None)];
        let marks = prices(&[("BTC", 45_000)]);
        let config = EngineConfig::default();

        let a = predict_cascade(&positions, &marks, Decimal::from(-10), &config);
        let b = predict_cascade(&positions, &marks, Decimal::from(-10), &config);

        assert_eq!(a.liquidated_count, b.liquidated_count);
        assert_eq!(a.total_liquidated_notional, b.total_liquidated_notional);
    }
}
