use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::PositionSide;

/// Current open exposure for one (address, asset) pair.
///
/// `liquidation_price` is the exchange-reported value when the snapshot
/// supplied one; `None` means the risk analyzer estimates it from entry
/// price and leverage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub address: String,
    pub asset: String,
    pub side: PositionSide,
    /// Absolute size in units of the asset.
    pub size: Decimal,
    pub entry_price: Decimal,
    pub leverage: Decimal,
    pub margin_used: Decimal,
    pub liquidation_price: Option<Decimal>,
    pub unrealized_pnl: Decimal,
    /// |size × entry_price| as of the last accounting update. The ledger
    /// has no mark prices, so this is entry-valued; risk annotation and the
    /// heatmap revalue at the current mark via [`Position::notional_at`].
    pub notional: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl Position {
    /// Notional revalued at the given mark price, `|size × mark|`. This is
    /// the value all risk and heatmap output carries.
    pub fn notional_at(&self, mark: Decimal) -> Decimal {
        (self.size * mark).abs()
    }
}
