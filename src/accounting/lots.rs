use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Side;

/// Cost-basis working state for one (address, asset) pair.
///
/// Invariant: `avg_entry_price` is meaningful only while `size` is nonzero;
/// once size returns to (near) zero the lot resets to the zero state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lot {
    /// Signed: positive long, negative short.
    pub size: Decimal,
    /// Volume-weighted average entry price.
    pub avg_entry_price: Decimal,
    /// Open cost of the current exposure, `|size| × avg_entry_price`.
    pub total_cost: Decimal,
}

/// A fill that reduced an existing lot.
#[derive(Debug, Clone, Copy)]
pub struct CloseEvent {
    /// Size closed by this fill (≤ the fill size on a flip).
    pub size: Decimal,
    /// Realized contribution of the close, fee included.
    pub realized_pnl: Decimal,
}

/// Result of applying one fill to a lot.
#[derive(Debug, Clone, Copy)]
pub struct FillOutcome {
    /// Realized PnL delta for the whale; −fee on opens/adds.
    pub realized_pnl: Decimal,
    pub close: Option<CloseEvent>,
}

impl Lot {
    pub fn is_open(&self) -> bool {
        !self.size.is_zero()
    }

    /// Apply one fill in sequence order.
    ///
    /// A fill against the current direction closes up to `|lot.size|` and
    /// realizes `closing × (price − avg_entry) × sign(size) − fee`. A fill
    /// in the same direction (or into an empty lot) accumulates cost and
    /// re-averages the entry. Lots shrinking below `epsilon` reset to zero.
    pub fn apply(
        &mut self,
        side: Side,
        size: Decimal,
        price: Decimal,
        fee: Decimal,
        epsilon: Decimal,
    ) -> FillOutcome {
        let delta = size.abs() * side.sign();

        let is_reducing = !self.size.is_zero()
            && !delta.is_zero()
            && (delta.is_sign_positive() != self.size.is_sign_positive());

        if is_reducing {
            let closing = delta.abs().min(self.size.abs());
            let direction = self.size.signum();
            let realized = closing * (price - self.avg_entry_price) * direction - fee;

            self.size += delta;
            if self.size.abs() < epsilon {
                *self = Lot::default();
            } else {
                // A flip past zero keeps the prior average on the remainder.
                self.total_cost = self.size.abs() * self.avg_entry_price;
            }

            return FillOutcome {
                realized_pnl: realized,
                close: Some(CloseEvent {
                    size: closing,
                    realized_pnl: realized,
                }),
            };
        }

        self.total_cost += delta.abs() * price;
        self.size += delta;
        if self.size.abs() < epsilon {
            *self = Lot::default();
        } else {
            self.avg_entry_price = self.total_cost / self.size.abs();
        }

        FillOutcome {
            realized_pnl: -fee,
            close: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
