use async_trait::async_trait;
use chrono::NaiveDateTime;
use payrun_types::{BeneficiaryRole, CycleRange, LedgerEntry, LedgerStatus};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::state::transition_allowed;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("duplicate source unit: {0}")]
    DuplicateSourceUnit(String),

    #[error("state conflict on {entity}: {from} cannot move to {to}")]
    StateConflict {
        entity: String,
        from: String,
        to: String,
    },

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),
}

impl From<StoreError> for payrun_types::EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => payrun_types::EngineError::NotFound(id),
            StoreError::StateConflict { entity, from, to } => {
                payrun_types::EngineError::StateViolation { entity, from, to }
            }
            other => payrun_types::EngineError::Storage(other.to_string()),
        }
    }
}

/// Inclusive unix-second bounds for a cycle date range.
pub(crate) fn range_bounds(range: &CycleRange) -> (u64, u64) {
    let start = range.start.and_hms_opt(0, 0, 0).map(ts).unwrap_or(0);
    let end = range.end.and_hms_opt(23, 59, 59).map(ts).unwrap_or(u64::MAX);
    (start, end)
}

fn ts(dt: NaiveDateTime) -> u64 {
    dt.and_utc().timestamp().max(0) as u64
}

/// Ledger persistence boundary. All bulk state moves are atomic: either
/// every member transitions or nothing is written.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn insert(&self, entry: &LedgerEntry) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<LedgerEntry>, StoreError>;

    async fn find_by_source_unit(
        &self,
        source_unit_id: &str,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    /// Full-record update; used only for entries still mutable (OPEN).
    async fn update(&self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// Entries eligible for a cycle: status in {OPEN, FAILED}, created
    /// within the range, matching role.
    async fn list_open(
        &self,
        role: BeneficiaryRole,
        range: CycleRange,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Atomically transition OPEN/FAILED members to LOCKED and link them to
    /// the batch. Any member in another state aborts the whole operation.
    async fn lock_into_batch(
        &self,
        ids: &[String],
        batch_id: &str,
        now: u64,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Bulk move of a batch's members into PROCESSING.
    async fn mark_processing(&self, batch_id: &str, now: u64) -> Result<u32, StoreError>;

    /// Bulk finalize of the given members to PAID or FAILED, stamping the
    /// gateway reference.
    async fn finalize(
        &self,
        ids: &[String],
        status: LedgerStatus,
        gateway_ref: Option<&str>,
        now: u64,
    ) -> Result<u32, StoreError>;

    /// Guarded single-entry status move (hold / release-hold).
    async fn set_status(
        &self,
        id: &str,
        status: LedgerStatus,
        hold_reason: Option<&str>,
        now: u64,
    ) -> Result<LedgerEntry, StoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE (test double)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    entries: Arc<RwLock<HashMap<String, LedgerEntry>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

fn conflict(entry: &LedgerEntry, to: LedgerStatus) -> StoreError {
    StoreError::StateConflict {
        entity: format!("ledger entry {}", entry.id),
        from: entry.status.to_string(),
        to: to.to_string(),
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerStore {
    async fn insert(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(&entry.id) {
            return Err(StoreError::DuplicateId(entry.id.clone()));
        }
        if entries
            .values()
            .any(|e| e.source_unit_id == entry.source_unit_id)
        {
            return Err(StoreError::DuplicateSourceUnit(entry.source_unit_id.clone()));
        }
        entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self.entries.read().unwrap().get(id).cloned())
    }

    async fn find_by_source_unit(
        &self,
        source_unit_id: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .values()
            .find(|e| e.source_unit_id == source_unit_id)
            .cloned())
    }

    async fn update(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap();
        if !entries.contains_key(&entry.id) {
            return Err(StoreError::NotFound(entry.id.clone()));
        }
        entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn list_open(
        &self,
        role: BeneficiaryRole,
        range: CycleRange,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let (start, end) = range_bounds(&range);
        let entries = self.entries.read().unwrap();
        let mut results: Vec<_> = entries
            .values()
            .filter(|e| {
                e.role == role
                    && matches!(e.status, LedgerStatus::Open | LedgerStatus::Failed)
                    && e.created_at >= start
                    && e.created_at <= end
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(results)
    }

    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let entries = self.entries.read().unwrap();
        let mut results: Vec<_> = entries
            .values()
            .filter(|e| e.batch_id.as_deref() == Some(batch_id))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(results)
    }

    async fn lock_into_batch(
        &self,
        ids: &[String],
        batch_id: &str,
        now: u64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut entries = self.entries.write().unwrap();

        // Validate every member before mutating anything.
        for id in ids {
            let entry = entries
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            if !transition_allowed(entry.status, LedgerStatus::Locked) {
                return Err(conflict(entry, LedgerStatus::Locked));
            }
        }

        let mut locked = Vec::with_capacity(ids.len());
        for id in ids {
            let entry = entries.get_mut(id).expect("validated above");
            entry.status = LedgerStatus::Locked;
            entry.batch_id = Some(batch_id.to_string());
            entry.updated_at = now;
            locked.push(entry.clone());
        }
        Ok(locked)
    }

    async fn mark_processing(&self, batch_id: &str, now: u64) -> Result<u32, StoreError> {
        let mut entries = self.entries.write().unwrap();

        let member_ids: Vec<String> = entries
            .values()
            .filter(|e| e.batch_id.as_deref() == Some(batch_id))
            .map(|e| e.id.clone())
            .collect();
        if member_ids.is_empty() {
            return Err(StoreError::NotFound(format!("batch {}", batch_id)));
        }

        for id in &member_ids {
            let entry = &entries[id];
            if !transition_allowed(entry.status, LedgerStatus::Processing) {
                return Err(conflict(entry, LedgerStatus::Processing));
            }
        }

        for id in &member_ids {
            let entry = entries.get_mut(id).expect("validated above");
            entry.status = LedgerStatus::Processing;
            entry.updated_at = now;
        }
        Ok(member_ids.len() as u32)
    }

    async fn finalize(
        &self,
        ids: &[String],
        status: LedgerStatus,
        gateway_ref: Option<&str>,
        now: u64,
    ) -> Result<u32, StoreError> {
        let mut entries = self.entries.write().unwrap();

        for id in ids {
            let entry = entries
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            if !transition_allowed(entry.status, status) {
                return Err(conflict(entry, status));
            }
        }

        for id in ids {
            let entry = entries.get_mut(id).expect("validated above");
            entry.status = status;
            entry.gateway_ref = gateway_ref.map(|s| s.to_string());
            entry.updated_at = now;
        }
        Ok(ids.len() as u32)
    }

    async fn set_status(
        &self,
        id: &str,
        status: LedgerStatus,
        hold_reason: Option<&str>,
        now: u64,
    ) -> Result<LedgerEntry, StoreError> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if !transition_allowed(entry.status, status) {
            return Err(StoreError::StateConflict {
                entity: format!("ledger entry {}", entry.id),
                from: entry.status.to_string(),
                to: status.to_string(),
            });
        }

        entry.status = status;
        entry.hold_reason = hold_reason.map(|s| s.to_string());
        entry.updated_at = now;
        Ok(entry.clone())
    }
}
