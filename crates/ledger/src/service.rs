use payrun_audit::{AuditKind, AuditSink};
use payrun_types::{
    Actor, ActorRole, Capability, DeliveryEvent, DeliveryOutcome, EngineError, LedgerEntry,
    LedgerStatus,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::store::LedgerRepository;

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time is before UNIX epoch - clock error")
        .as_secs()
}

/// Ledger entry lifecycle operations. The only writers of ledger state are
/// this service (generation, holds), the cycle builder (locking into a
/// batch) and the orchestrator (processing/finalize) - all through the
/// repository API.
pub struct LedgerService {
    repo: Arc<dyn LedgerRepository>,
    audit: Arc<dyn AuditSink>,
}

impl LedgerService {
    pub fn new(repo: Arc<dyn LedgerRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { repo, audit }
    }

    pub fn repository(&self) -> Arc<dyn LedgerRepository> {
        self.repo.clone()
    }

    /// Generate the payable entry for a delivery-completion event.
    ///
    /// Idempotent per source unit: an existing entry past OPEN is returned
    /// unchanged; an OPEN entry is recomputed in place. Non-payable
    /// outcomes produce a VOID entry at creation.
    pub async fn generate_entry(&self, event: &DeliveryEvent) -> Result<LedgerEntry, EngineError> {
        if let Some(existing) = self.repo.find_by_source_unit(&event.source_unit_id).await? {
            if existing.status != LedgerStatus::Open {
                // Immutability guard: regeneration is a no-op once the
                // entry has left OPEN.
                debug!(
                    entry_id = %existing.id,
                    status = %existing.status,
                    "regeneration skipped, entry no longer open"
                );
                return Ok(existing);
            }

            let mut recomputed = existing;
            recomputed.role = event.role;
            recomputed.beneficiary_id = event.beneficiary_id.clone();
            recomputed.amount = event.amount;
            recomputed.updated_at = now_secs();
            self.repo.update(&recomputed).await?;
            return Ok(recomputed);
        }

        let status = match event.outcome {
            DeliveryOutcome::Delivered => LedgerStatus::Open,
            DeliveryOutcome::ReturnedToOrigin => LedgerStatus::Void,
        };

        let entry = LedgerEntry::new(
            format!("le-{}", event.source_unit_id),
            event.source_unit_id.clone(),
            event.role,
            event.beneficiary_id.clone(),
            event.amount,
            status,
            now_secs(),
        );
        self.repo.insert(&entry).await?;

        info!(
            entry_id = %entry.id,
            source_unit = %entry.source_unit_id,
            amount = entry.amount,
            status = %entry.status,
            "ledger entry generated"
        );
        self.audit
            .log_event(
                AuditKind::LedgerGenerated,
                &Actor::new("delivery-events", ActorRole::System),
                "ledger entry generated",
                serde_json::json!({
                    "entry_id": entry.id,
                    "source_unit": entry.source_unit_id,
                    "amount": entry.amount,
                    "status": entry.status.to_string(),
                }),
            )
            .await;
        Ok(entry)
    }

    /// Move an entry to ON_HOLD. Requires a non-empty reason.
    pub async fn hold(
        &self,
        actor: &Actor,
        id: &str,
        reason: &str,
    ) -> Result<LedgerEntry, EngineError> {
        actor.require(Capability::HoldLedgerEntry)?;

        if reason.trim().is_empty() {
            return Err(EngineError::PolicyViolation(
                "hold requires a non-empty reason".to_string(),
            ));
        }

        let held = self
            .repo
            .set_status(id, LedgerStatus::OnHold, Some(reason), now_secs())
            .await?;

        self.audit
            .log_event(
                AuditKind::LedgerHeld,
                actor,
                "ledger entry placed on hold",
                serde_json::json!({ "entry_id": id, "reason": reason }),
            )
            .await;
        Ok(held)
    }

    /// Release a held entry back to OPEN.
    pub async fn release_hold(&self, actor: &Actor, id: &str) -> Result<LedgerEntry, EngineError> {
        actor.require(Capability::HoldLedgerEntry)?;

        let released = self
            .repo
            .set_status(id, LedgerStatus::Open, None, now_secs())
            .await?;

        info!(entry_id = %id, "ledger hold released");
        self.audit
            .log_event(
                AuditKind::LedgerReleased,
                actor,
                "ledger hold released",
                serde_json::json!({ "entry_id": id }),
            )
            .await;
        Ok(released)
    }
}
