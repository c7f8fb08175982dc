use serde::{Deserialize, Serialize};

use crate::Amount;

/// Disbursement lifecycle. Success is never overwritten except by an
/// explicit Reversed event from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisbursementStatus {
    Pending,
    Initiated,
    Success,
    Failed,
    Reversed,
}

impl std::fmt::Display for DisbursementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DisbursementStatus::Pending => "PENDING",
            DisbursementStatus::Initiated => "INITIATED",
            DisbursementStatus::Success => "SUCCESS",
            DisbursementStatus::Failed => "FAILED",
            DisbursementStatus::Reversed => "REVERSED",
        };
        write!(f, "{}", s)
    }
}

/// One atomic money-movement attempt for one beneficiary within one batch.
///
/// The id is derived deterministically from (batch, beneficiary), so a
/// retried attempt for the same pair lands on the same row and can never
/// create a second successful transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisbursementRecord {
    pub id: String,
    pub batch_id: String,
    pub beneficiary_id: String,
    pub amount: Amount,
    pub status: DisbursementStatus,
    pub transfer_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl DisbursementRecord {
    pub fn new(
        id: String,
        batch_id: String,
        beneficiary_id: String,
        amount: Amount,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            batch_id,
            beneficiary_id,
            amount,
            status: DisbursementStatus::Pending,
            transfer_id: None,
            failure_reason: None,
            created_at,
            updated_at: created_at,
        }
    }
}
