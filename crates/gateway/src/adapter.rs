use async_trait::async_trait;
use payrun_types::{Amount, DisbursementRecord, DisbursementStatus, EngineError};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::client::{GatewayClient, GatewayCredentials, TransferOutcome};

pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time is before UNIX epoch - clock error")
        .as_secs()
}

/// Deterministic disbursement id for one (batch, beneficiary) pair.
/// Retries for the same pair always address the same row.
pub fn disbursement_id(batch_id: &str, beneficiary_id: &str) -> String {
    let digest = Sha256::digest(format!("{}|{}", batch_id, beneficiary_id).as_bytes());
    format!("dsb-{}", &hex::encode(digest)[..16])
}

/// Disbursement persistence boundary. Rows are never deleted.
#[async_trait]
pub trait DisbursementStore: Send + Sync {
    async fn insert(&self, record: &DisbursementRecord) -> Result<(), EngineError>;

    async fn get(&self, id: &str) -> Result<Option<DisbursementRecord>, EngineError>;

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<DisbursementRecord>, EngineError>;

    async fn update(&self, record: &DisbursementRecord) -> Result<(), EngineError>;

    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<DisbursementRecord>, EngineError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDisbursementStore {
    records: Arc<RwLock<HashMap<String, DisbursementRecord>>>,
}

impl InMemoryDisbursementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DisbursementStore for InMemoryDisbursementStore {
    async fn insert(&self, record: &DisbursementRecord) -> Result<(), EngineError> {
        let mut records = self.records.write().unwrap();
        if records.contains_key(&record.id) {
            return Err(EngineError::Storage(format!(
                "duplicate disbursement id {}",
                record.id
            )));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<DisbursementRecord>, EngineError> {
        Ok(self.records.read().unwrap().get(id).cloned())
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<DisbursementRecord>, EngineError> {
        Ok(self
            .records
            .read()
            .unwrap()
            .values()
            .find(|r| r.id == reference)
            .cloned())
    }

    async fn update(&self, record: &DisbursementRecord) -> Result<(), EngineError> {
        let mut records = self.records.write().unwrap();
        if !records.contains_key(&record.id) {
            return Err(EngineError::NotFound(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<DisbursementRecord>, EngineError> {
        let records = self.records.read().unwrap();
        let mut results: Vec<_> = records
            .values()
            .filter(|r| r.batch_id == batch_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.beneficiary_id.cmp(&b.beneficiary_id));
        Ok(results)
    }
}

/// Bridges batch execution to the external gateway with at-most-one
/// successful transfer per (batch, beneficiary).
pub struct DisbursementAdapter {
    store: Arc<dyn DisbursementStore>,
    client: Arc<dyn GatewayClient>,
}

impl DisbursementAdapter {
    pub fn new(store: Arc<dyn DisbursementStore>, client: Arc<dyn GatewayClient>) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> Arc<dyn DisbursementStore> {
        self.store.clone()
    }

    /// Find or create the row for this pair. Re-invocation returns the
    /// existing row; a row already in SUCCESS is returned as-is so the
    /// caller can skip the transfer.
    pub async fn initiate_record(
        &self,
        batch_id: &str,
        beneficiary_id: &str,
        amount: Amount,
    ) -> Result<DisbursementRecord, EngineError> {
        let id = disbursement_id(batch_id, beneficiary_id);

        if let Some(existing) = self.store.get(&id).await? {
            return Ok(existing);
        }

        let record = DisbursementRecord::new(
            id,
            batch_id.to_string(),
            beneficiary_id.to_string(),
            amount,
            now_secs(),
        );
        self.store.insert(&record).await?;
        Ok(record)
    }

    /// Drive one disbursement row through the gateway.
    ///
    /// SUCCESS rows short-circuit without a network call. INITIATED rows
    /// mean another attempt is in flight and surface as a concurrency
    /// conflict. PENDING, FAILED and REVERSED rows are (re)attempted: the
    /// row is marked INITIATED before the call and finalized after.
    pub async fn execute_transfer(
        &self,
        disbursement_id: &str,
        credentials: &GatewayCredentials,
    ) -> Result<DisbursementRecord, EngineError> {
        let mut record = self
            .store
            .get(disbursement_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(disbursement_id.to_string()))?;

        match record.status {
            DisbursementStatus::Success => {
                info!(
                    disbursement = %record.id,
                    transfer = ?record.transfer_id,
                    "transfer already succeeded, skipping"
                );
                return Ok(record);
            }
            DisbursementStatus::Initiated => {
                return Err(EngineError::ConcurrencyConflict(format!(
                    "disbursement {} has a transfer in flight",
                    record.id
                )));
            }
            DisbursementStatus::Pending
            | DisbursementStatus::Failed
            | DisbursementStatus::Reversed => {}
        }

        record.status = DisbursementStatus::Initiated;
        record.updated_at = now_secs();
        self.store.update(&record).await?;

        let outcome = self
            .client
            .transfer_funds(
                credentials,
                &record.id,
                &record.beneficiary_id,
                record.amount,
            )
            .await;

        match outcome {
            TransferOutcome::Success { transfer_id } => {
                record.status = DisbursementStatus::Success;
                record.transfer_id = Some(transfer_id);
                record.failure_reason = None;
                record.updated_at = now_secs();
                self.store.update(&record).await?;
                info!(
                    disbursement = %record.id,
                    beneficiary = %record.beneficiary_id,
                    amount = record.amount,
                    "transfer succeeded"
                );
            }
            TransferOutcome::Failed { reason } => {
                record.status = DisbursementStatus::Failed;
                record.failure_reason = Some(reason.clone());
                record.updated_at = now_secs();
                self.store.update(&record).await?;
                warn!(
                    disbursement = %record.id,
                    beneficiary = %record.beneficiary_id,
                    reason = %reason,
                    "transfer failed"
                );
            }
        }

        Ok(record)
    }
}
