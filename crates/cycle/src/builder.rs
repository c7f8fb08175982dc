use payrun_audit::{AuditKind, AuditSink};
use payrun_ledger::{BatchRepository, LedgerRepository};
use payrun_resilience::IncidentFreeze;
use payrun_types::{
    Actor, Amount, BatchStatus, BeneficiaryRole, Capability, CycleRange, EngineError, GatewayProvider,
    LedgerEntry, PayoutBatch,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::release::release_date;

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time is before UNIX epoch - clock error")
        .as_secs()
}

/// Builds payout batches out of open ledger entries.
///
/// Approval is the only path that creates a batch, and the member lock is
/// atomic: a single ineligible member aborts the approval with no batch
/// created and no entry touched.
pub struct CycleBuilder {
    ledger: Arc<dyn LedgerRepository>,
    batches: Arc<dyn BatchRepository>,
    freeze: Arc<IncidentFreeze>,
    audit: Arc<dyn AuditSink>,
    seq: AtomicU64,
}

impl CycleBuilder {
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        batches: Arc<dyn BatchRepository>,
        freeze: Arc<IncidentFreeze>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            ledger,
            batches,
            freeze,
            audit,
            seq: AtomicU64::new(0),
        }
    }

    /// Entries eligible for the given cycle window: OPEN or FAILED, within
    /// range, matching role.
    pub async fn open_ledgers(
        &self,
        role: BeneficiaryRole,
        range: CycleRange,
    ) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self.ledger.list_open(role, range).await?)
    }

    /// Approve a cycle: lock the named entries into a new batch with a
    /// computed release date.
    ///
    /// The batch total is always recomputed server-side from the member
    /// amounts at approval time; callers never supply it.
    pub async fn approve_cycle(
        &self,
        actor: &Actor,
        role: BeneficiaryRole,
        ledger_ids: &[String],
        range: CycleRange,
        gateway: GatewayProvider,
    ) -> Result<PayoutBatch, EngineError> {
        actor.require(Capability::ApprovePayoutCycle)?;

        if self.freeze.is_frozen() {
            return Err(EngineError::PolicyViolation(
                "incident freeze engaged, approvals blocked".to_string(),
            ));
        }
        if ledger_ids.is_empty() {
            return Err(EngineError::PolicyViolation(
                "approval requires a non-empty ledger entry set".to_string(),
            ));
        }

        let release = release_date(range.end)?;

        // Pre-validate roles before mutating anything; status eligibility
        // is enforced atomically by the lock below.
        let mut total: Amount = 0;
        for id in ledger_ids {
            let entry = self
                .ledger
                .get(id)
                .await?
                .ok_or_else(|| EngineError::NotFound(id.clone()))?;
            if entry.role != role {
                return Err(EngineError::PolicyViolation(format!(
                    "ledger entry {} belongs to role {}, not {}",
                    entry.id, entry.role, role
                )));
            }
            total += entry.amount;
        }

        let now = now_secs();
        let batch_id = format!(
            "pb-{}-{}-{}",
            role,
            range.end.format("%Y%m%d"),
            self.seq.fetch_add(1, Ordering::SeqCst) + 1
        );

        let members = self.ledger.lock_into_batch(ledger_ids, &batch_id, now).await?;

        let batch = PayoutBatch {
            id: batch_id.clone(),
            role,
            ledger_ids: members.iter().map(|e| e.id.clone()).collect(),
            total_amount: total,
            entry_count: members.len() as u32,
            status: BatchStatus::Locked,
            approved_by: actor.id.clone(),
            approved_at: now,
            cycle: range,
            release_date: release,
            gateway,
            execution: None,
        };
        self.batches.insert(&batch).await?;

        info!(
            batch = %batch.id,
            role = %role,
            total = batch.total_amount,
            count = batch.entry_count,
            release = %release,
            "payout cycle approved"
        );
        self.audit
            .log_event(
                AuditKind::CycleApproved,
                actor,
                "payout cycle approved",
                serde_json::json!({
                    "batch_id": batch.id,
                    "total_amount": batch.total_amount,
                    "entry_count": batch.entry_count,
                    "release_date": release.to_string(),
                    "gateway": gateway.to_string(),
                }),
            )
            .await;

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use payrun_audit::InMemoryAuditSink;
    use payrun_ledger::{InMemoryBatchStore, InMemoryLedgerStore};
    use payrun_types::{ActorRole, LedgerStatus};

    struct Fixture {
        builder: CycleBuilder,
        ledger: Arc<InMemoryLedgerStore>,
        batches: Arc<InMemoryBatchStore>,
        freeze: Arc<IncidentFreeze>,
        audit: Arc<InMemoryAuditSink>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let batches = Arc::new(InMemoryBatchStore::new());
        let freeze = Arc::new(IncidentFreeze::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let builder = CycleBuilder::new(
            ledger.clone(),
            batches.clone(),
            freeze.clone(),
            audit.clone(),
        );
        Fixture {
            builder,
            ledger,
            batches,
            freeze,
            audit,
        }
    }

    fn july_range() -> CycleRange {
        CycleRange::new(
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 7).unwrap(),
        )
    }

    fn in_july() -> u64 {
        NaiveDate::from_ymd_opt(2025, 7, 3)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp() as u64
    }

    async fn seed(fx: &Fixture, id: &str, amount: i64) -> String {
        let entry = LedgerEntry::new(
            format!("le-{}", id),
            format!("awb-{}", id),
            BeneficiaryRole::Station,
            "stn-1".to_string(),
            amount,
            LedgerStatus::Open,
            in_july(),
        );
        fx.ledger.insert(&entry).await.unwrap();
        entry.id
    }

    fn admin() -> Actor {
        Actor::new("fin-1", ActorRole::FinanceAdmin)
    }

    #[tokio::test]
    async fn approval_locks_members_and_recomputes_total() {
        let fx = fixture();
        let ids = vec![
            seed(&fx, "1", 100).await,
            seed(&fx, "2", 150).await,
            seed(&fx, "3", 200).await,
        ];

        let batch = fx
            .builder
            .approve_cycle(
                &admin(),
                BeneficiaryRole::Station,
                &ids,
                july_range(),
                GatewayProvider::Razorpay,
            )
            .await
            .unwrap();

        assert_eq!(batch.total_amount, 450);
        assert_eq!(batch.entry_count, 3);
        assert_eq!(batch.status, BatchStatus::Locked);
        assert_eq!(
            batch.release_date,
            NaiveDate::from_ymd_opt(2025, 7, 14).unwrap()
        );
        assert!(batch.id.starts_with("pb-station-20250707-"));

        for id in &ids {
            let entry = fx.ledger.get(id).await.unwrap().unwrap();
            assert_eq!(entry.status, LedgerStatus::Locked);
            assert_eq!(entry.batch_id.as_deref(), Some(batch.id.as_str()));
        }
        assert_eq!(fx.audit.count(AuditKind::CycleApproved), 1);
        assert!(fx.batches.get(&batch.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_id_set_is_rejected() {
        let fx = fixture();
        assert!(matches!(
            fx.builder
                .approve_cycle(
                    &admin(),
                    BeneficiaryRole::Station,
                    &[],
                    july_range(),
                    GatewayProvider::Razorpay,
                )
                .await,
            Err(EngineError::PolicyViolation(_))
        ));
    }

    #[tokio::test]
    async fn frozen_system_blocks_approval() {
        let fx = fixture();
        let ids = vec![seed(&fx, "1", 100).await];
        fx.freeze.freeze();

        assert!(matches!(
            fx.builder
                .approve_cycle(
                    &admin(),
                    BeneficiaryRole::Station,
                    &ids,
                    july_range(),
                    GatewayProvider::Razorpay,
                )
                .await,
            Err(EngineError::PolicyViolation(_))
        ));
    }

    #[tokio::test]
    async fn non_boundary_cycle_end_creates_no_batch() {
        let fx = fixture();
        let ids = vec![seed(&fx, "1", 100).await];
        let range = CycleRange::new(
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 15).unwrap(),
        );

        assert!(matches!(
            fx.builder
                .approve_cycle(
                    &admin(),
                    BeneficiaryRole::Station,
                    &ids,
                    range,
                    GatewayProvider::Razorpay,
                )
                .await,
            Err(EngineError::PolicyViolation(_))
        ));
        assert!(fx.batches.is_empty());
        assert_eq!(
            fx.ledger.get(&ids[0]).await.unwrap().unwrap().status,
            LedgerStatus::Open
        );
    }

    #[tokio::test]
    async fn day_28_cycle_releases_on_the_fourth_of_next_month() {
        let fx = fixture();
        let ids = vec![seed(&fx, "1", 100).await];
        let range = CycleRange::new(
            NaiveDate::from_ymd_opt(2025, 7, 22).unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 28).unwrap(),
        );

        let batch = fx
            .builder
            .approve_cycle(
                &admin(),
                BeneficiaryRole::Station,
                &ids,
                range,
                GatewayProvider::Razorpay,
            )
            .await
            .unwrap();
        assert_eq!(
            batch.release_date,
            NaiveDate::from_ymd_opt(2025, 8, 4).unwrap()
        );
    }

    #[tokio::test]
    async fn ineligible_member_aborts_without_mutation() {
        let fx = fixture();
        let ok_id = seed(&fx, "1", 100).await;

        let mut paid = LedgerEntry::new(
            "le-2".to_string(),
            "awb-2".to_string(),
            BeneficiaryRole::Station,
            "stn-1".to_string(),
            150,
            LedgerStatus::Open,
            in_july(),
        );
        paid.status = LedgerStatus::Paid;
        fx.ledger.insert(&paid).await.unwrap();

        let result = fx
            .builder
            .approve_cycle(
                &admin(),
                BeneficiaryRole::Station,
                &[ok_id.clone(), "le-2".to_string()],
                july_range(),
                GatewayProvider::Razorpay,
            )
            .await;
        assert!(matches!(result, Err(EngineError::StateViolation { .. })));
        assert!(fx.batches.is_empty());
        assert_eq!(
            fx.ledger.get(&ok_id).await.unwrap().unwrap().status,
            LedgerStatus::Open
        );
    }

    #[tokio::test]
    async fn role_mismatch_is_a_policy_violation() {
        let fx = fixture();
        let id = seed(&fx, "1", 100).await;

        assert!(matches!(
            fx.builder
                .approve_cycle(
                    &admin(),
                    BeneficiaryRole::Courier,
                    &[id],
                    july_range(),
                    GatewayProvider::Razorpay,
                )
                .await,
            Err(EngineError::PolicyViolation(_))
        ));
    }

    #[tokio::test]
    async fn approval_requires_capability() {
        let fx = fixture();
        let ids = vec![seed(&fx, "1", 100).await];
        let ops = Actor::new("ops-1", ActorRole::Operations);

        assert!(matches!(
            fx.builder
                .approve_cycle(
                    &ops,
                    BeneficiaryRole::Station,
                    &ids,
                    july_range(),
                    GatewayProvider::Razorpay,
                )
                .await,
            Err(EngineError::Unauthorized { .. })
        ));
    }
}
