use async_trait::async_trait;
use payrun_types::{BatchStatus, PayoutBatch};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::store::StoreError;

/// Batch persistence boundary. Batches are never deleted (audit retention).
#[async_trait]
pub trait BatchRepository: Send + Sync {
    async fn insert(&self, batch: &PayoutBatch) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<PayoutBatch>, StoreError>;

    async fn update(&self, batch: &PayoutBatch) -> Result<(), StoreError>;

    async fn list_by_status(&self, status: BatchStatus) -> Result<Vec<PayoutBatch>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    batches: Arc<RwLock<HashMap<String, PayoutBatch>>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.batches.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.read().unwrap().is_empty()
    }
}

#[async_trait]
impl BatchRepository for InMemoryBatchStore {
    async fn insert(&self, batch: &PayoutBatch) -> Result<(), StoreError> {
        let mut batches = self.batches.write().unwrap();
        if batches.contains_key(&batch.id) {
            return Err(StoreError::DuplicateId(batch.id.clone()));
        }
        batches.insert(batch.id.clone(), batch.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<PayoutBatch>, StoreError> {
        Ok(self.batches.read().unwrap().get(id).cloned())
    }

    async fn update(&self, batch: &PayoutBatch) -> Result<(), StoreError> {
        let mut batches = self.batches.write().unwrap();
        if !batches.contains_key(&batch.id) {
            return Err(StoreError::NotFound(batch.id.clone()));
        }
        batches.insert(batch.id.clone(), batch.clone());
        Ok(())
    }

    async fn list_by_status(&self, status: BatchStatus) -> Result<Vec<PayoutBatch>, StoreError> {
        let batches = self.batches.read().unwrap();
        let mut results: Vec<_> = batches
            .values()
            .filter(|b| b.status == status)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.approved_at.cmp(&b.approved_at).then(a.id.cmp(&b.id)));
        Ok(results)
    }
}
