pub mod actor;
pub mod batch;
pub mod disbursement;
pub mod error;
pub mod ledger;

pub use actor::*;
pub use batch::*;
pub use disbursement::*;
pub use error::*;
pub use ledger::*;

/// Amounts are integer minor units (paise); fractional money never enters the engine.
pub type Amount = i64;
