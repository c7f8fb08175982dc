use payrun_types::{EngineError, LedgerStatus};

/// Whether a ledger entry may move from `from` to `to`.
///
/// `Open -> Approved -> Locked -> Processing -> {Paid | Failed}` is the
/// happy path. `Failed -> Locked` and `Failed -> Processing` are the
/// re-approval and re-execution arcs. `OnHold` is reachable from
/// Open/Approved and releasable back to Open. Paid and Void are terminal.
pub fn transition_allowed(from: LedgerStatus, to: LedgerStatus) -> bool {
    use LedgerStatus::*;
    matches!(
        (from, to),
        (Open, Approved)
            | (Open, Locked)
            | (Open, OnHold)
            | (Approved, Locked)
            | (Approved, OnHold)
            | (Locked, Processing)
            | (Processing, Paid)
            | (Processing, Failed)
            | (Failed, Locked)
            | (Failed, Processing)
            | (OnHold, Open)
    )
}

/// Validate a transition, never silently ignoring a mismatch.
pub fn check_transition(
    entry_id: &str,
    from: LedgerStatus,
    to: LedgerStatus,
) -> Result<(), EngineError> {
    if transition_allowed(from, to) {
        Ok(())
    } else {
        Err(EngineError::StateViolation {
            entity: format!("ledger entry {}", entry_id),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
