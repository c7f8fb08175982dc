use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Amount;

/// Who receives a disbursement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeneficiaryRole {
    Station,
    Courier,
}

impl std::fmt::Display for BeneficiaryRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BeneficiaryRole::Station => write!(f, "station"),
            BeneficiaryRole::Courier => write!(f, "courier"),
        }
    }
}

/// Ledger entry lifecycle.
///
/// `Open -> Approved -> Locked -> Processing -> {Paid | Failed}`, with
/// `OnHold` reachable from Open/Approved and `Void` assigned at creation
/// for non-payable outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    Open,
    Approved,
    Locked,
    Processing,
    Paid,
    Failed,
    OnHold,
    Void,
}

impl LedgerStatus {
    /// Statuses past which an entry is immutable except for forward transitions.
    pub fn is_settling(&self) -> bool {
        matches!(
            self,
            LedgerStatus::Approved
                | LedgerStatus::Locked
                | LedgerStatus::Processing
                | LedgerStatus::Paid
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LedgerStatus::Paid | LedgerStatus::Void)
    }
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LedgerStatus::Open => "OPEN",
            LedgerStatus::Approved => "APPROVED",
            LedgerStatus::Locked => "LOCKED",
            LedgerStatus::Processing => "PROCESSING",
            LedgerStatus::Paid => "PAID",
            LedgerStatus::Failed => "FAILED",
            LedgerStatus::OnHold => "ON_HOLD",
            LedgerStatus::Void => "VOID",
        };
        write!(f, "{}", s)
    }
}

/// One payable obligation for one delivery unit or one closed runsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    /// Upstream unit this entry was generated from. Exactly one non-void
    /// entry exists per source unit.
    pub source_unit_id: String,
    pub role: BeneficiaryRole,
    pub beneficiary_id: String,
    /// Never changes after creation.
    pub amount: Amount,
    pub status: LedgerStatus,
    pub created_at: u64,
    pub updated_at: u64,
    pub batch_id: Option<String>,
    pub gateway_ref: Option<String>,
    pub hold_reason: Option<String>,
}

impl LedgerEntry {
    pub fn new(
        id: String,
        source_unit_id: String,
        role: BeneficiaryRole,
        beneficiary_id: String,
        amount: Amount,
        status: LedgerStatus,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            source_unit_id,
            role,
            beneficiary_id,
            amount,
            status,
            created_at,
            updated_at: created_at,
            batch_id: None,
            gateway_ref: None,
            hold_reason: None,
        }
    }
}

/// Outcome of the upstream delivery that feeds entry generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    /// Non-payable; the generated entry is VOID at creation.
    ReturnedToOrigin,
}

/// Delivery-completion event consumed from the upstream producer.
/// Rate computation is entirely external; `amount` arrives precomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub source_unit_id: String,
    pub role: BeneficiaryRole,
    pub beneficiary_id: String,
    pub amount: Amount,
    pub outcome: DeliveryOutcome,
}

/// Inclusive date range of a payout cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CycleRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}
