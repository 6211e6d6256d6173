//! Boundary normalization for external feed records.
//!
//! Pollers hand us wire-shaped JSON in whatever state the exchange sent it.
//! Every numeric field here accepts a JSON number, a numeric string, or
//! null/absent; anything unparseable becomes zero. The accounting core only
//! ever sees the strict records produced by `normalize_*`, so it never
//! branches on field presence.

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use crate::models::{Fill, Side};

// ---------------------------------------------------------------------------
// Lenient decoding
// ---------------------------------------------------------------------------

/// Accept number, numeric string, or anything else (→ zero).
fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Value(Decimal),
        Text(String),
        Other(serde_json::Value),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Value(d) => d,
        Raw::Text(s) => s.trim().parse().unwrap_or(Decimal::ZERO),
        Raw::Other(_) => Decimal::ZERO,
    })
}

// ---------------------------------------------------------------------------
// Raw wire records
// ---------------------------------------------------------------------------

/// A fill as reported by the exchange trade feed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFill {
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub size: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub fee: Decimal,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// One open position row from the exchange account snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    #[serde(default)]
    pub asset: Option<String>,
    /// Signed: positive long, negative short.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub size: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub entry_price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub leverage: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub margin_used: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub liquidation_price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub unrealized_pnl: Decimal,
}

/// The exchange account snapshot for one address.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSnapshot {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub margin_used: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub unrealized_pnl: Decimal,
    #[serde(default)]
    pub positions: Vec<RawPosition>,
}

// ---------------------------------------------------------------------------
// Strict snapshot records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SnapshotPosition {
    pub asset: String,
    /// Signed: positive long, negative short.
    pub size: Decimal,
    pub entry_price: Decimal,
    pub leverage: Decimal,
    pub margin_used: Decimal,
    /// None when the exchange sent no usable value (≤ 0 is a placeholder);
    /// the risk analyzer estimates instead.
    pub liquidation_price: Option<Decimal>,
    pub unrealized_pnl: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct AccountSnapshot {
    pub margin_used: Decimal,
    pub unrealized_pnl: Decimal,
    pub positions: Vec<SnapshotPosition>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize one raw fill. Returns None for records with no asset or an
/// unrecognized side; those are logged and counted, never propagated as
/// errors, so the rest of the batch is unaffected.
pub fn normalize_fill(raw: &RawFill) -> Option<Fill> {
    let asset = match raw.asset.as_deref() {
        Some(a) if !a.is_empty() => a.to_string(),
        _ => {
            tracing::warn!("Dropping fill with no asset");
            counter!("whalewatch_feed_records_dropped_total").increment(1);
            return None;
        }
    };

    let side = match raw.side.as_deref().and_then(Side::from_api_str) {
        Some(s) => s,
        None => {
            tracing::warn!(asset = %asset, side = ?raw.side, "Dropping fill with unrecognized side");
            counter!("whalewatch_feed_records_dropped_total").increment(1);
            return None;
        }
    };

    let timestamp = raw
        .timestamp
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(DateTime::UNIX_EPOCH);

    Some(Fill {
        asset,
        side,
        size: raw.size.abs(),
        price: raw.price,
        fee: raw.fee,
        timestamp,
    })
}

/// Normalize the account snapshot. Rows with no asset are dropped; a
/// leverage the exchange omitted (zero) defaults to 1x so downstream
/// estimation never divides by zero.
pub fn normalize_snapshot(raw: &RawSnapshot) -> AccountSnapshot {
    let positions = raw
        .positions
        .iter()
        .filter_map(|p| {
            let asset = match p.asset.as_deref() {
                Some(a) if !a.is_empty() => a.to_string(),
                _ => {
                    tracing::warn!("Dropping snapshot position with no asset");
                    counter!("whalewatch_feed_records_dropped_total").increment(1);
                    return None;
                }
            };
            Some(SnapshotPosition {
                asset,
                size: p.size,
                entry_price: p.entry_price,
                leverage: if p.leverage > Decimal::ZERO {
                    p.leverage
                } else {
                    Decimal::ONE
                },
                margin_used: p.margin_used,
                liquidation_price: (p.liquidation_price > Decimal::ZERO)
                    .then_some(p.liquidation_price),
                unrealized_pnl: p.unrealized_pnl,
            })
        })
        .collect();

    AccountSnapshot {
        margin_used: raw.margin_used,
        unrealized_pnl: raw.unrealized_pnl,
        positions,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
