use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tracked account record. Created on first observation and never deleted;
/// it transitions between active and dormant instead. Wake-ups are reported
/// through the ledger's event queue, not a flag on this record.
///
/// The stored `dormant` flag only records the last transition the ledger
/// materialized while processing a batch; readers classifying dormancy
/// between batches should use [`Whale::is_dormant_at`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Whale {
    pub address: String,
    pub first_seen: DateTime<Utc>,
    pub total_trades: u64,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub margin_used: Decimal,
    /// total_pnl / margin_used × 100 when margin is nonzero, else 0.
    pub roi: Decimal,
    /// Fraction of closing events with a positive realized contribution.
    pub win_rate: Decimal,
    pub active_positions: u64,
    pub last_active: DateTime<Utc>,
    pub dormant: bool,
    pub dormant_since: Option<DateTime<Utc>>,
}

impl Whale {
    pub fn new(address: &str, first_seen: DateTime<Utc>) -> Self {
        Self {
            address: address.to_string(),
            first_seen,
            total_trades: 0,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            margin_used: Decimal::ZERO,
            roi: Decimal::ZERO,
            win_rate: Decimal::ZERO,
            active_positions: 0,
            last_active: first_seen,
            dormant: false,
            dormant_since: None,
        }
    }

    /// Lazy dormancy classification: a whale with no open positions and no
    /// fills for at least `dormancy_days` is dormant regardless of whether
    /// a batch has run to materialize the stored flag yet.
    pub fn is_dormant_at(&self, now: DateTime<Utc>, dormancy_days: i64) -> bool {
        self.dormant
            || (self.active_positions == 0
                && now.signed_duration_since(self.last_active) >= Duration::days(dormancy_days))
    }
}
