//! Execution orchestrator.
//!
//! Single entry point for disbursing an approved batch: a fixed guard
//! chain, per-beneficiary aggregation, sequential gateway calls, and a
//! single completion routine that always lands the batch in a terminal
//! state or leaves it untouched.

pub mod aggregate;
pub mod orchestrator;

pub use aggregate::{aggregate_by_beneficiary, BeneficiaryTotal};
pub use orchestrator::{ExecutionOrchestrator, OrchestratorConfig};
