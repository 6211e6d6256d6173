use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Side;

/// A single executed trade for a tracked address. Strict record: the feed
/// boundary has already applied zero-defaults, so every field is usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub asset: String,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    /// Signed size: positive for buys, negative for sells.
    pub fn signed_size(&self) -> Decimal {
        self.size * self.side.sign()
    }
}
