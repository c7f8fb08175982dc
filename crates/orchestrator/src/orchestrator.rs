use chrono::Utc;
use payrun_audit::{AuditKind, AuditSink};
use payrun_gateway::{CredentialStore, DisbursementAdapter, GatewayCredentials};
use payrun_ledger::{BatchRepository, LedgerRepository};
use payrun_resilience::{
    BeginOutcome, CircuitBreakerRegistry, CircuitStatus, FixedWindowLimiter, IdempotencyStore,
    IncidentFreeze, LockManager,
};
use payrun_types::{
    Actor, BatchStatus, Capability, DisbursementStatus, EngineError, ExecutionSummary,
    GatewayEnvironment, GatewayProvider, LedgerStatus, PayoutBatch,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::aggregate::aggregate_by_beneficiary;

const EXECUTE_ACTION: &str = "execute_batch";

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time is before UNIX epoch - clock error")
        .as_secs()
}

fn result_hash(batch_id: &str, status: BatchStatus) -> String {
    hex::encode(Sha256::digest(format!("{}|{}", batch_id, status).as_bytes()))
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Environment the gateway is driven in; decides the terminal
    /// EXECUTED_TEST / EXECUTED_PRODUCTION status.
    pub environment: GatewayEnvironment,
    /// TTL on the per-batch execution lock.
    pub lock_ttl: Duration,
    /// TTL on IN_PROGRESS idempotency claims; COMPLETED never expires.
    pub idempotency_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            environment: GatewayEnvironment::Test,
            lock_ttl: Duration::from_secs(300),
            idempotency_ttl: Duration::from_secs(600),
        }
    }
}

/// Drives an approved batch through disbursement.
///
/// `execute_batch` is the only path from LOCKED to a terminal batch
/// state. Each guard is a hard stop with its own error kind; once the
/// batch enters PROCESSING, the completion routine always lands it in a
/// terminal state, even on an internal error.
pub struct ExecutionOrchestrator {
    ledger: Arc<dyn LedgerRepository>,
    batches: Arc<dyn BatchRepository>,
    adapter: Arc<DisbursementAdapter>,
    credentials: Arc<dyn CredentialStore>,
    idempotency: Arc<IdempotencyStore>,
    locks: Arc<LockManager>,
    breakers: Arc<CircuitBreakerRegistry>,
    limiter: Arc<FixedWindowLimiter>,
    freeze: Arc<IncidentFreeze>,
    audit: Arc<dyn AuditSink>,
    config: OrchestratorConfig,
}

impl ExecutionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        batches: Arc<dyn BatchRepository>,
        adapter: Arc<DisbursementAdapter>,
        credentials: Arc<dyn CredentialStore>,
        idempotency: Arc<IdempotencyStore>,
        locks: Arc<LockManager>,
        breakers: Arc<CircuitBreakerRegistry>,
        limiter: Arc<FixedWindowLimiter>,
        freeze: Arc<IncidentFreeze>,
        audit: Arc<dyn AuditSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            ledger,
            batches,
            adapter,
            credentials,
            idempotency,
            locks,
            breakers,
            limiter,
            freeze,
            audit,
            config,
        }
    }

    /// Execute one approved batch. Guard order is fixed:
    /// freeze, rate budget, breaker, release date, idempotency, lock.
    pub async fn execute_batch(
        &self,
        batch_id: &str,
        actor: &Actor,
    ) -> Result<PayoutBatch, EngineError> {
        actor.require(Capability::ExecutePayoutBatch)?;

        if self.freeze.is_frozen() {
            return Err(EngineError::PolicyViolation(
                "incident freeze engaged, execution blocked".to_string(),
            ));
        }

        self.limiter
            .acquire(EXECUTE_ACTION)
            .map_err(|e| EngineError::PolicyViolation(e.to_string()))?;

        let batch = self
            .batches
            .get(batch_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(batch_id.to_string()))?;

        let resource = batch.gateway.to_string();
        if self.breakers.status(&resource) == CircuitStatus::Open {
            return Err(EngineError::CircuitOpen(resource));
        }

        if Utc::now().date_naive() < batch.release_date {
            return Err(EngineError::PolicyViolation(format!(
                "batch {} releases on {}",
                batch.id, batch.release_date
            )));
        }

        let key = format!("{}:{}", batch.id, batch.gateway);
        match self.idempotency.begin(&key, self.config.idempotency_ttl) {
            BeginOutcome::Started => {}
            BeginOutcome::InProgress => {
                return Err(EngineError::ConcurrencyConflict(format!(
                    "execution of batch {} already in progress",
                    batch.id
                )));
            }
            BeginOutcome::Completed { .. } => {
                // Replay: the cached terminal batch is the result.
                info!(batch = %batch.id, "execution replayed from idempotency cache");
                return Ok(batch);
            }
        }

        if !self.locks.acquire(&batch.id, &actor.id, self.config.lock_ttl) {
            // Release our idempotency claim so the lock holder's run owns
            // the key outcome.
            self.idempotency.fail(&key);
            return Err(EngineError::ConcurrencyConflict(format!(
                "execution lock for batch {} held elsewhere",
                batch.id
            )));
        }

        let outcome = self.run_to_completion(batch, actor, &key).await;
        self.locks.release(batch_id, &actor.id);

        match outcome {
            Ok(done) => Ok(done),
            Err(err) => {
                self.force_failed(batch_id, &err).await;
                // The breaker is untouched here: declined transfers are
                // already recorded per beneficiary inside the run, and
                // errors that propagate this far (credentials, storage,
                // state) say nothing about gateway health.
                self.idempotency.fail(&key);
                Err(err)
            }
        }
    }

    /// Operator override for a tripped breaker.
    pub async fn manual_reset_breaker(
        &self,
        actor: &Actor,
        gateway: GatewayProvider,
    ) -> Result<(), EngineError> {
        self.breakers.manual_reset(actor, &gateway.to_string()).await
    }

    /// Everything past the guards. Any error out of here is caught once
    /// by the caller, which forces FAILED and re-raises.
    async fn run_to_completion(
        &self,
        mut batch: PayoutBatch,
        actor: &Actor,
        key: &str,
    ) -> Result<PayoutBatch, EngineError> {
        // LOCKED is the normal entry; FAILED is the retry arc, mirroring
        // the idempotency store's FAILED-permits-retry rule. A stale
        // PROCESSING batch (crashed run with an expired claim) lands in
        // the caller's catch and is forced to FAILED.
        if !matches!(batch.status, BatchStatus::Locked | BatchStatus::Failed) {
            return Err(EngineError::StateViolation {
                entity: format!("payout batch {}", batch.id),
                from: batch.status.to_string(),
                to: BatchStatus::Processing.to_string(),
            });
        }

        self.audit
            .log_event(
                AuditKind::ExecutionStarted,
                actor,
                "batch execution started",
                serde_json::json!({
                    "batch_id": batch.id,
                    "gateway": batch.gateway.to_string(),
                    "environment": self.config.environment.to_string(),
                }),
            )
            .await;

        let now = now_secs();
        batch.status = BatchStatus::Processing;
        self.batches.update(&batch).await?;
        self.ledger.mark_processing(&batch.id, now).await?;

        let members = self.ledger.list_by_batch(&batch.id).await?;
        let totals = aggregate_by_beneficiary(&members);

        let credentials = self.resolve_credentials(batch.gateway).await?;

        let mut succeeded: u32 = 0;
        let mut failed: u32 = 0;
        let mut paid_ids: Vec<String> = Vec::new();
        let mut failed_ids: Vec<String> = Vec::new();
        let mut skipped_ids: Vec<String> = Vec::new();

        for total in &totals {
            if total.amount <= 0 {
                warn!(
                    batch = %batch.id,
                    beneficiary = %total.beneficiary_id,
                    amount = total.amount,
                    "skipping non-positive beneficiary total"
                );
                skipped_ids.extend(total.ledger_ids.iter().cloned());
                continue;
            }

            let record = self
                .adapter
                .initiate_record(&batch.id, &total.beneficiary_id, total.amount)
                .await?;
            let record = self.adapter.execute_transfer(&record.id, &credentials).await?;

            match record.status {
                DisbursementStatus::Success => {
                    succeeded += 1;
                    paid_ids.extend(total.ledger_ids.iter().cloned());
                }
                _ => {
                    failed += 1;
                    failed_ids.extend(total.ledger_ids.iter().cloned());
                    self.breakers.record_failure(&batch.gateway.to_string()).await;
                }
            }
        }

        let gateway_ref = format!("{}:{}", batch.gateway, batch.id);
        let done = now_secs();

        // No money moves for a non-positive net; the members land FAILED
        // so a later cycle can re-approve them once netting turns
        // positive. Skips count toward neither the breaker nor the batch
        // outcome.
        if !skipped_ids.is_empty() {
            self.ledger
                .finalize(&skipped_ids, LedgerStatus::Failed, None, done)
                .await?;
        }

        let status = if failed == 0 {
            // Everything disbursed.
            self.ledger
                .finalize(&paid_ids, LedgerStatus::Paid, Some(&gateway_ref), done)
                .await?;
            self.breakers.record_success(&batch.gateway.to_string());
            self.idempotency
                .complete(key, Some(result_hash(&batch.id, BatchStatus::executed(self.config.environment))));
            BatchStatus::executed(self.config.environment)
        } else if succeeded > 0 {
            // Successful beneficiaries settle; failed ones stay in
            // PROCESSING and are never reverted to OPEN, so a later
            // re-approval cannot double-pay. Operators reconcile manually.
            self.ledger
                .finalize(&paid_ids, LedgerStatus::Paid, Some(&gateway_ref), done)
                .await?;
            self.idempotency
                .complete(key, Some(result_hash(&batch.id, BatchStatus::PartialFailure)));
            BatchStatus::PartialFailure
        } else {
            self.ledger
                .finalize(&failed_ids, LedgerStatus::Failed, None, done)
                .await?;
            self.idempotency.fail(key);
            BatchStatus::Failed
        };

        batch.status = status;
        batch.execution = Some(ExecutionSummary {
            succeeded,
            failed,
            executed_at: done,
            gateway_ref: (succeeded > 0).then(|| gateway_ref.clone()),
        });
        self.batches.update(&batch).await?;

        info!(
            batch = %batch.id,
            status = %status,
            succeeded,
            failed,
            "batch execution finished"
        );
        self.audit
            .log_event(
                AuditKind::ExecutionFinished,
                actor,
                "batch execution finished",
                serde_json::json!({
                    "batch_id": batch.id,
                    "status": status.to_string(),
                    "succeeded": succeeded,
                    "failed": failed,
                }),
            )
            .await;

        Ok(batch)
    }

    async fn resolve_credentials(
        &self,
        gateway: GatewayProvider,
    ) -> Result<GatewayCredentials, EngineError> {
        self.credentials
            .resolve(gateway, self.config.environment)
            .await
            .ok_or_else(|| {
                EngineError::GatewayFailure(format!(
                    "no active credentials for {} in {}",
                    gateway, self.config.environment
                ))
            })
    }

    /// Last-resort landing: a batch that already entered execution must
    /// not be left in a non-terminal state.
    async fn force_failed(&self, batch_id: &str, cause: &EngineError) {
        let Ok(Some(mut batch)) = self.batches.get(batch_id).await else {
            return;
        };
        if !matches!(batch.status, BatchStatus::Locked | BatchStatus::Processing) {
            return;
        }

        error!(batch = %batch_id, %cause, "execution aborted, forcing batch to FAILED");
        batch.status = BatchStatus::Failed;
        batch.execution = Some(ExecutionSummary {
            succeeded: 0,
            failed: batch.entry_count,
            executed_at: now_secs(),
            gateway_ref: None,
        });
        if let Err(err) = self.batches.update(&batch).await {
            error!(batch = %batch_id, %err, "failed to persist forced FAILED status");
        }

        // Members already moved to PROCESSING must land FAILED with the
        // batch, or the retry arc dies re-entering mark_processing.
        let members = match self.ledger.list_by_batch(batch_id).await {
            Ok(members) => members,
            Err(err) => {
                error!(batch = %batch_id, %err, "failed to load members of aborted batch");
                return;
            }
        };
        let stuck: Vec<String> = members
            .iter()
            .filter(|e| e.status == LedgerStatus::Processing)
            .map(|e| e.id.clone())
            .collect();
        if stuck.is_empty() {
            return;
        }
        if let Err(err) = self
            .ledger
            .finalize(&stuck, LedgerStatus::Failed, None, now_secs())
            .await
        {
            error!(batch = %batch_id, %err, "failed to finalize members of aborted batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use payrun_audit::InMemoryAuditSink;
    use payrun_gateway::{
        InMemoryDisbursementStore, MockGatewayClient, StaticCredentialStore,
    };
    use payrun_ledger::{InMemoryBatchStore, InMemoryLedgerStore};
    use payrun_resilience::BreakerConfig;
    use payrun_types::{ActorRole, BeneficiaryRole, CycleRange, LedgerEntry};

    struct Fixture {
        orchestrator: ExecutionOrchestrator,
        ledger: Arc<InMemoryLedgerStore>,
        batches: Arc<InMemoryBatchStore>,
        client: Arc<MockGatewayClient>,
        breakers: Arc<CircuitBreakerRegistry>,
        freeze: Arc<IncidentFreeze>,
        locks: Arc<LockManager>,
        audit: Arc<InMemoryAuditSink>,
    }

    fn fixture() -> Fixture {
        fixture_with_limiter(FixedWindowLimiter::new())
    }

    fn fixture_with_limiter(limiter: FixedWindowLimiter) -> Fixture {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let batches = Arc::new(InMemoryBatchStore::new());
        let client = Arc::new(MockGatewayClient::new());
        let adapter = Arc::new(DisbursementAdapter::new(
            Arc::new(InMemoryDisbursementStore::new()),
            client.clone(),
        ));
        let audit = Arc::new(InMemoryAuditSink::new());
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            BreakerConfig {
                failure_threshold: 3,
                cooldown: Duration::from_secs(60),
            },
            audit.clone(),
        ));
        let freeze = Arc::new(IncidentFreeze::new());
        let locks = Arc::new(LockManager::new());
        let credentials = Arc::new(StaticCredentialStore::new().with_credentials(
            GatewayCredentials {
                provider: GatewayProvider::Razorpay,
                environment: GatewayEnvironment::Test,
                client_id: "client-1".to_string(),
                secret: "s3cret".to_string(),
            },
        ));

        let orchestrator = ExecutionOrchestrator::new(
            ledger.clone(),
            batches.clone(),
            adapter,
            credentials,
            Arc::new(IdempotencyStore::new()),
            locks.clone(),
            breakers.clone(),
            Arc::new(limiter),
            freeze.clone(),
            audit.clone(),
            OrchestratorConfig::default(),
        );

        Fixture {
            orchestrator,
            ledger,
            batches,
            client,
            breakers,
            freeze,
            locks,
            audit,
        }
    }

    fn admin() -> Actor {
        Actor::new("fin-1", ActorRole::FinanceAdmin)
    }

    fn past_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 14).unwrap()
    }

    fn far_future_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2099, 1, 4).unwrap()
    }

    async fn seed_batch(
        fx: &Fixture,
        id: &str,
        entries: &[(&str, &str, i64)],
        release_date: NaiveDate,
    ) -> PayoutBatch {
        let mut ledger_ids = Vec::new();
        let mut total = 0;
        for (entry_id, beneficiary, amount) in entries {
            let entry = LedgerEntry::new(
                entry_id.to_string(),
                format!("awb-{}", entry_id),
                BeneficiaryRole::Station,
                beneficiary.to_string(),
                *amount,
                LedgerStatus::Open,
                100,
            );
            fx.ledger.insert(&entry).await.unwrap();
            ledger_ids.push(entry.id.clone());
            total += amount;
        }
        fx.ledger.lock_into_batch(&ledger_ids, id, 101).await.unwrap();

        let batch = PayoutBatch {
            id: id.to_string(),
            role: BeneficiaryRole::Station,
            ledger_ids,
            total_amount: total,
            entry_count: entries.len() as u32,
            status: BatchStatus::Locked,
            approved_by: "fin-1".to_string(),
            approved_at: 101,
            cycle: CycleRange::new(
                NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 7, 7).unwrap(),
            ),
            release_date,
            gateway: GatewayProvider::Razorpay,
            execution: None,
        };
        fx.batches.insert(&batch).await.unwrap();
        batch
    }

    #[tokio::test]
    async fn single_beneficiary_batch_executes_as_one_transfer() {
        let fx = fixture();
        seed_batch(
            &fx,
            "pb-1",
            &[("le-1", "stn-1", 100), ("le-2", "stn-1", 150), ("le-3", "stn-1", 200)],
            past_date(),
        )
        .await;

        let done = fx.orchestrator.execute_batch("pb-1", &admin()).await.unwrap();

        assert_eq!(done.status, BatchStatus::ExecutedTest);
        let summary = done.execution.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);

        // One net disbursement of 450, not three.
        assert_eq!(fx.client.calls().len(), 1);
        assert_eq!(fx.client.calls()[0].amount, 450);

        for id in ["le-1", "le-2", "le-3"] {
            let entry = fx.ledger.get(id).await.unwrap().unwrap();
            assert_eq!(entry.status, LedgerStatus::Paid);
            assert_eq!(entry.gateway_ref.as_deref(), Some("razorpay:pb-1"));
        }
        assert_eq!(fx.audit.count(AuditKind::ExecutionStarted), 1);
        assert_eq!(fx.audit.count(AuditKind::ExecutionFinished), 1);
    }

    #[tokio::test]
    async fn partial_failure_never_reverts_entries_to_open() {
        let fx = fixture();
        fx.client.fail_beneficiary("stn-2", "beneficiary account frozen");
        seed_batch(
            &fx,
            "pb-1",
            &[("le-1", "stn-1", 100), ("le-2", "stn-2", 200)],
            past_date(),
        )
        .await;

        let done = fx.orchestrator.execute_batch("pb-1", &admin()).await.unwrap();

        assert_eq!(done.status, BatchStatus::PartialFailure);
        assert_eq!(
            fx.ledger.get("le-1").await.unwrap().unwrap().status,
            LedgerStatus::Paid
        );
        assert_eq!(
            fx.ledger.get("le-2").await.unwrap().unwrap().status,
            LedgerStatus::Processing
        );
    }

    #[tokio::test]
    async fn total_failure_finalizes_entries_failed() {
        let fx = fixture();
        fx.client.fail_beneficiary("stn-1", "gateway maintenance");
        seed_batch(&fx, "pb-1", &[("le-1", "stn-1", 100)], past_date()).await;

        let done = fx.orchestrator.execute_batch("pb-1", &admin()).await.unwrap();

        assert_eq!(done.status, BatchStatus::Failed);
        assert_eq!(
            fx.ledger.get("le-1").await.unwrap().unwrap().status,
            LedgerStatus::Failed
        );
        assert!(done.execution.unwrap().gateway_ref.is_none());
    }

    #[tokio::test]
    async fn execution_before_release_date_leaves_batch_untouched() {
        let fx = fixture();
        seed_batch(&fx, "pb-1", &[("le-1", "stn-1", 100)], far_future_date()).await;

        let result = fx.orchestrator.execute_batch("pb-1", &admin()).await;
        assert!(matches!(result, Err(EngineError::PolicyViolation(_))));

        assert_eq!(
            fx.batches.get("pb-1").await.unwrap().unwrap().status,
            BatchStatus::Locked
        );
        assert_eq!(
            fx.ledger.get("le-1").await.unwrap().unwrap().status,
            LedgerStatus::Locked
        );
        assert!(fx.client.calls().is_empty());
    }

    #[tokio::test]
    async fn replay_returns_cached_batch_without_new_transfers() {
        let fx = fixture();
        seed_batch(&fx, "pb-1", &[("le-1", "stn-1", 100)], past_date()).await;

        fx.orchestrator.execute_batch("pb-1", &admin()).await.unwrap();
        let replay = fx.orchestrator.execute_batch("pb-1", &admin()).await.unwrap();

        assert_eq!(replay.status, BatchStatus::ExecutedTest);
        // Exactly one gateway call per beneficiary across both invocations.
        assert_eq!(fx.client.calls_for("stn-1"), 1);
    }

    #[tokio::test]
    async fn open_breaker_blocks_execution() {
        let fx = fixture();
        seed_batch(&fx, "pb-1", &[("le-1", "stn-1", 100)], past_date()).await;

        for _ in 0..3 {
            fx.breakers.record_failure("razorpay").await;
        }

        assert!(matches!(
            fx.orchestrator.execute_batch("pb-1", &admin()).await,
            Err(EngineError::CircuitOpen(_))
        ));
        assert!(fx.client.calls().is_empty());
    }

    #[tokio::test]
    async fn incident_freeze_blocks_execution() {
        let fx = fixture();
        seed_batch(&fx, "pb-1", &[("le-1", "stn-1", 100)], past_date()).await;
        fx.freeze.freeze();

        assert!(matches!(
            fx.orchestrator.execute_batch("pb-1", &admin()).await,
            Err(EngineError::PolicyViolation(_))
        ));
    }

    #[tokio::test]
    async fn exhausted_rate_budget_blocks_execution() {
        let fx = fixture_with_limiter(
            FixedWindowLimiter::new().with_limit(EXECUTE_ACTION, 1),
        );
        seed_batch(&fx, "pb-1", &[("le-1", "stn-1", 100)], past_date()).await;

        fx.orchestrator.execute_batch("pb-1", &admin()).await.unwrap();
        // Replay consumes the budget before the idempotency short-circuit.
        assert!(matches!(
            fx.orchestrator.execute_batch("pb-1", &admin()).await,
            Err(EngineError::PolicyViolation(_))
        ));
    }

    #[tokio::test]
    async fn held_execution_lock_is_a_concurrency_conflict() {
        let fx = fixture();
        seed_batch(&fx, "pb-1", &[("le-1", "stn-1", 100)], past_date()).await;

        fx.locks.acquire("pb-1", "someone-else", Duration::from_secs(60));

        assert!(matches!(
            fx.orchestrator.execute_batch("pb-1", &admin()).await,
            Err(EngineError::ConcurrencyConflict(_))
        ));
        assert!(fx.client.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_batch_may_be_retried_after_gateway_recovers() {
        let fx = fixture();
        fx.client.fail_beneficiary("stn-1", "gateway maintenance");
        seed_batch(&fx, "pb-1", &[("le-1", "stn-1", 100)], past_date()).await;

        let failed = fx.orchestrator.execute_batch("pb-1", &admin()).await.unwrap();
        assert_eq!(failed.status, BatchStatus::Failed);

        fx.client.script(
            "stn-1",
            payrun_gateway::TransferOutcome::Success {
                transfer_id: "txn-retry".to_string(),
            },
        );
        let retried = fx.orchestrator.execute_batch("pb-1", &admin()).await.unwrap();

        assert_eq!(retried.status, BatchStatus::ExecutedTest);
        assert_eq!(
            fx.ledger.get("le-1").await.unwrap().unwrap().status,
            LedgerStatus::Paid
        );
        assert_eq!(fx.client.calls_for("stn-1"), 2);
    }

    #[tokio::test]
    async fn missing_credentials_force_batch_failed() {
        let fx = fixture();
        let mut batch = seed_batch(&fx, "pb-1", &[("le-1", "stn-1", 100)], past_date()).await;
        batch.gateway = GatewayProvider::Cashfree;
        fx.batches.update(&batch).await.unwrap();

        let result = fx.orchestrator.execute_batch("pb-1", &admin()).await;
        assert!(matches!(result, Err(EngineError::GatewayFailure(_))));

        assert_eq!(
            fx.batches.get("pb-1").await.unwrap().unwrap().status,
            BatchStatus::Failed
        );
        // Members land FAILED with the batch, never stranded in PROCESSING.
        assert_eq!(
            fx.ledger.get("le-1").await.unwrap().unwrap().status,
            LedgerStatus::Failed
        );
        // Lock was released on the failure path.
        assert!(fx.locks.holder("pb-1").is_none());
    }

    #[tokio::test]
    async fn aborted_execution_leaves_batch_retryable() {
        let fx = fixture();
        let mut batch = seed_batch(&fx, "pb-1", &[("le-1", "stn-1", 100)], past_date()).await;
        batch.gateway = GatewayProvider::Cashfree;
        fx.batches.update(&batch).await.unwrap();

        // No Cashfree credentials are configured, so the run aborts after
        // the batch enters PROCESSING.
        assert!(matches!(
            fx.orchestrator.execute_batch("pb-1", &admin()).await,
            Err(EngineError::GatewayFailure(_))
        ));
        assert!(fx.client.calls().is_empty());
        // A credentials fault is not a gateway outage.
        assert_eq!(fx.breakers.status("cashfree"), CircuitStatus::Closed);

        // Repoint the batch at the configured gateway; the retry must run
        // to completion instead of dying on a state violation.
        let mut batch = fx.batches.get("pb-1").await.unwrap().unwrap();
        batch.gateway = GatewayProvider::Razorpay;
        fx.batches.update(&batch).await.unwrap();

        let retried = fx.orchestrator.execute_batch("pb-1", &admin()).await.unwrap();
        assert_eq!(retried.status, BatchStatus::ExecutedTest);
        assert_eq!(
            fx.ledger.get("le-1").await.unwrap().unwrap().status,
            LedgerStatus::Paid
        );
        assert_eq!(fx.client.calls_for("stn-1"), 1);
    }

    #[tokio::test]
    async fn non_positive_beneficiary_totals_are_skipped() {
        let fx = fixture();
        seed_batch(
            &fx,
            "pb-1",
            &[("le-1", "stn-1", 100), ("le-2", "stn-2", -50), ("le-3", "stn-2", 50)],
            past_date(),
        )
        .await;

        let done = fx.orchestrator.execute_batch("pb-1", &admin()).await.unwrap();

        assert_eq!(done.status, BatchStatus::ExecutedTest);
        assert_eq!(fx.client.calls_for("stn-1"), 1);
        assert_eq!(fx.client.calls_for("stn-2"), 0);

        // Skipped members land terminal FAILED, eligible for a later
        // cycle, never stranded in PROCESSING under an executed batch.
        assert_eq!(
            fx.ledger.get("le-1").await.unwrap().unwrap().status,
            LedgerStatus::Paid
        );
        for id in ["le-2", "le-3"] {
            assert_eq!(
                fx.ledger.get(id).await.unwrap().unwrap().status,
                LedgerStatus::Failed
            );
        }
    }

    #[tokio::test]
    async fn execution_requires_capability() {
        let fx = fixture();
        seed_batch(&fx, "pb-1", &[("le-1", "stn-1", 100)], past_date()).await;

        let ops = Actor::new("ops-1", ActorRole::Operations);
        assert!(matches!(
            fx.orchestrator.execute_batch("pb-1", &ops).await,
            Err(EngineError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn manual_breaker_reset_is_gated_and_audited() {
        let fx = fixture();
        for _ in 0..3 {
            fx.breakers.record_failure("razorpay").await;
        }
        assert_eq!(fx.breakers.status("razorpay"), CircuitStatus::Open);

        fx.orchestrator
            .manual_reset_breaker(&admin(), GatewayProvider::Razorpay)
            .await
            .unwrap();
        assert_eq!(fx.breakers.status("razorpay"), CircuitStatus::Closed);
        assert_eq!(fx.audit.count(AuditKind::BreakerReset), 1);
    }
}
