pub mod ledger;
pub mod lots;

pub use ledger::{WakeEvent, WhaleLedger};
pub use lots::{CloseEvent, FillOutcome, Lot};
