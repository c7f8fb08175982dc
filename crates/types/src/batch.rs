use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Amount, BeneficiaryRole, CycleRange};

/// Payment gateway the batch disburses through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayProvider {
    Razorpay,
    Cashfree,
}

impl std::fmt::Display for GatewayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayProvider::Razorpay => write!(f, "razorpay"),
            GatewayProvider::Cashfree => write!(f, "cashfree"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayEnvironment {
    Test,
    Production,
}

impl std::fmt::Display for GatewayEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayEnvironment::Test => write!(f, "test"),
            GatewayEnvironment::Production => write!(f, "production"),
        }
    }
}

/// Batch lifecycle: `Locked -> Processing -> {Executed | PartialFailure | Failed}`.
///
/// PartialFailure and Failed are terminal and never auto-retried by the
/// engine; operators reconcile manually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Locked,
    Processing,
    ExecutedTest,
    ExecutedProduction,
    PartialFailure,
    Failed,
}

impl BatchStatus {
    pub fn executed(env: GatewayEnvironment) -> Self {
        match env {
            GatewayEnvironment::Test => BatchStatus::ExecutedTest,
            GatewayEnvironment::Production => BatchStatus::ExecutedProduction,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchStatus::Locked | BatchStatus::Processing)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BatchStatus::Locked => "LOCKED",
            BatchStatus::Processing => "PROCESSING",
            BatchStatus::ExecutedTest => "EXECUTED_TEST",
            BatchStatus::ExecutedProduction => "EXECUTED_PRODUCTION",
            BatchStatus::PartialFailure => "PARTIAL_FAILURE",
            BatchStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Per-batch execution tally recorded when the batch reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub succeeded: u32,
    pub failed: u32,
    pub executed_at: u64,
    pub gateway_ref: Option<String>,
}

/// An approved, locked set of ledger entries disbursed together.
///
/// `total_amount` is always the server-side sum of member amounts at
/// approval time; it is never taken from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutBatch {
    pub id: String,
    pub role: BeneficiaryRole,
    pub ledger_ids: Vec<String>,
    pub total_amount: Amount,
    pub entry_count: u32,
    pub status: BatchStatus,
    pub approved_by: String,
    pub approved_at: u64,
    pub cycle: CycleRange,
    /// Execution may not start before this date.
    pub release_date: NaiveDate,
    pub gateway: GatewayProvider,
    pub execution: Option<ExecutionSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executed_status_reflects_environment() {
        assert_eq!(
            BatchStatus::executed(GatewayEnvironment::Test),
            BatchStatus::ExecutedTest
        );
        assert_eq!(
            BatchStatus::executed(GatewayEnvironment::Production),
            BatchStatus::ExecutedProduction
        );
    }

    #[test]
    fn terminal_batch_statuses() {
        assert!(BatchStatus::PartialFailure.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(BatchStatus::ExecutedTest.is_terminal());
        assert!(!BatchStatus::Locked.is_terminal());
        assert!(!BatchStatus::Processing.is_terminal());
    }
}
