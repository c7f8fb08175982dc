//! Cycle builder and approval gate.
//!
//! Selects payable ledger entries for a cycle window, computes the batch's
//! release date from the fixed payout calendar, and atomically locks the
//! members into a new batch.

pub mod builder;
pub mod release;

pub use builder::CycleBuilder;
pub use release::release_date;
