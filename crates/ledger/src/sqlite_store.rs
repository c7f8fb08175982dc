use async_trait::async_trait;
use payrun_types::{BeneficiaryRole, CycleRange, LedgerEntry, LedgerStatus};
use sqlx::{Executor, Row, SqlitePool};
use std::path::Path;

use crate::state::transition_allowed;
use crate::store::{range_bounds, LedgerRepository, StoreError};

/// Durable ledger store. Bulk transitions run inside a single transaction
/// so partial writes never become visible.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}", db_path.as_ref().display());
        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// In-memory SQLite database (for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        // Raw execute: the migration file holds multiple statements.
        self.pool
            .execute(include_str!("../migrations/001_create_ledger_entries.sql"))
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry, StoreError> {
        Ok(LedgerEntry {
            id: row.get("id"),
            source_unit_id: row.get("source_unit_id"),
            role: parse_role(&row.get::<String, _>("role"))?,
            beneficiary_id: row.get("beneficiary_id"),
            amount: row.get::<i64, _>("amount"),
            status: parse_status(&row.get::<String, _>("status"))?,
            created_at: row.get::<i64, _>("created_at") as u64,
            updated_at: row.get::<i64, _>("updated_at") as u64,
            batch_id: row.get("batch_id"),
            gateway_ref: row.get("gateway_ref"),
            hold_reason: row.get("hold_reason"),
        })
    }

    async fn fetch_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        id: &str,
    ) -> Result<LedgerEntry, StoreError> {
        let row = sqlx::query("SELECT * FROM ledger_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Self::row_to_entry(&row)
    }
}

#[async_trait]
impl LedgerRepository for SqliteLedgerStore {
    async fn insert(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, source_unit_id, role, beneficiary_id, amount, status,
                created_at, updated_at, batch_id, gateway_ref, hold_reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.source_unit_id)
        .bind(entry.role.to_string())
        .bind(&entry.beneficiary_id)
        .bind(entry.amount)
        .bind(entry.status.to_string())
        .bind(entry.created_at as i64)
        .bind(entry.updated_at as i64)
        .bind(&entry.batch_id)
        .bind(&entry.gateway_ref)
        .bind(&entry.hold_reason)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                if db_err.message().contains("source_unit_id") {
                    Err(StoreError::DuplicateSourceUnit(entry.source_unit_id.clone()))
                } else {
                    Err(StoreError::DuplicateId(entry.id.clone()))
                }
            }
            Err(e) => Err(StoreError::DatabaseError(e.to_string())),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<LedgerEntry>, StoreError> {
        let row = sqlx::query("SELECT * FROM ledger_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_by_source_unit(
        &self,
        source_unit_id: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let row = sqlx::query("SELECT * FROM ledger_entries WHERE source_unit_id = ? LIMIT 1")
            .bind(source_unit_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_entries
            SET role = ?, beneficiary_id = ?, amount = ?, status = ?,
                updated_at = ?, batch_id = ?, gateway_ref = ?, hold_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(entry.role.to_string())
        .bind(&entry.beneficiary_id)
        .bind(entry.amount)
        .bind(entry.status.to_string())
        .bind(entry.updated_at as i64)
        .bind(&entry.batch_id)
        .bind(&entry.gateway_ref)
        .bind(&entry.hold_reason)
        .bind(&entry.id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(entry.id.clone()));
        }
        Ok(())
    }

    async fn list_open(
        &self,
        role: BeneficiaryRole,
        range: CycleRange,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let (start, end) = range_bounds(&range);
        let rows = sqlx::query(
            r#"
            SELECT * FROM ledger_entries
            WHERE role = ? AND status IN ('OPEN', 'FAILED')
              AND created_at >= ? AND created_at <= ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(role.to_string())
        .bind(start as i64)
        .bind(end as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM ledger_entries WHERE batch_id = ? ORDER BY id ASC")
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn lock_into_batch(
        &self,
        ids: &[String],
        batch_id: &str,
        now: u64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        let mut locked = Vec::with_capacity(ids.len());
        for id in ids {
            let entry = Self::fetch_in_tx(&mut tx, id).await?;
            if !transition_allowed(entry.status, LedgerStatus::Locked) {
                // Implicit rollback on drop.
                return Err(StoreError::StateConflict {
                    entity: format!("ledger entry {}", entry.id),
                    from: entry.status.to_string(),
                    to: LedgerStatus::Locked.to_string(),
                });
            }

            sqlx::query(
                "UPDATE ledger_entries SET status = 'LOCKED', batch_id = ?, updated_at = ? WHERE id = ?",
            )
            .bind(batch_id)
            .bind(now as i64)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

            let mut updated = entry;
            updated.status = LedgerStatus::Locked;
            updated.batch_id = Some(batch_id.to_string());
            updated.updated_at = now;
            locked.push(updated);
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(locked)
    }

    async fn mark_processing(&self, batch_id: &str, now: u64) -> Result<u32, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        let rows = sqlx::query("SELECT * FROM ledger_entries WHERE batch_id = ?")
            .bind(batch_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("batch {}", batch_id)));
        }

        for row in &rows {
            let entry = Self::row_to_entry(row)?;
            if !transition_allowed(entry.status, LedgerStatus::Processing) {
                return Err(StoreError::StateConflict {
                    entity: format!("ledger entry {}", entry.id),
                    from: entry.status.to_string(),
                    to: LedgerStatus::Processing.to_string(),
                });
            }
        }

        let result = sqlx::query(
            "UPDATE ledger_entries SET status = 'PROCESSING', updated_at = ? WHERE batch_id = ?",
        )
        .bind(now as i64)
        .bind(batch_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(result.rows_affected() as u32)
    }

    async fn finalize(
        &self,
        ids: &[String],
        status: LedgerStatus,
        gateway_ref: Option<&str>,
        now: u64,
    ) -> Result<u32, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        for id in ids {
            let entry = Self::fetch_in_tx(&mut tx, id).await?;
            if !transition_allowed(entry.status, status) {
                return Err(StoreError::StateConflict {
                    entity: format!("ledger entry {}", entry.id),
                    from: entry.status.to_string(),
                    to: status.to_string(),
                });
            }

            sqlx::query(
                "UPDATE ledger_entries SET status = ?, gateway_ref = ?, updated_at = ? WHERE id = ?",
            )
            .bind(status.to_string())
            .bind(gateway_ref)
            .bind(now as i64)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(ids.len() as u32)
    }

    async fn set_status(
        &self,
        id: &str,
        status: LedgerStatus,
        hold_reason: Option<&str>,
        now: u64,
    ) -> Result<LedgerEntry, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        let mut entry = Self::fetch_in_tx(&mut tx, id).await?;
        if !transition_allowed(entry.status, status) {
            return Err(StoreError::StateConflict {
                entity: format!("ledger entry {}", entry.id),
                from: entry.status.to_string(),
                to: status.to_string(),
            });
        }

        sqlx::query(
            "UPDATE ledger_entries SET status = ?, hold_reason = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(hold_reason)
        .bind(now as i64)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        entry.status = status;
        entry.hold_reason = hold_reason.map(|s| s.to_string());
        entry.updated_at = now;
        Ok(entry)
    }
}

fn parse_role(s: &str) -> Result<BeneficiaryRole, StoreError> {
    match s {
        "station" => Ok(BeneficiaryRole::Station),
        "courier" => Ok(BeneficiaryRole::Courier),
        _ => Err(StoreError::SerializationError(format!(
            "unknown role: {}",
            s
        ))),
    }
}

fn parse_status(s: &str) -> Result<LedgerStatus, StoreError> {
    match s {
        "OPEN" => Ok(LedgerStatus::Open),
        "APPROVED" => Ok(LedgerStatus::Approved),
        "LOCKED" => Ok(LedgerStatus::Locked),
        "PROCESSING" => Ok(LedgerStatus::Processing),
        "PAID" => Ok(LedgerStatus::Paid),
        "FAILED" => Ok(LedgerStatus::Failed),
        "ON_HOLD" => Ok(LedgerStatus::OnHold),
        "VOID" => Ok(LedgerStatus::Void),
        _ => Err(StoreError::SerializationError(format!(
            "unknown status: {}",
            s
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, source: &str, amount: i64) -> LedgerEntry {
        LedgerEntry::new(
            id.to_string(),
            source.to_string(),
            BeneficiaryRole::Station,
            "stn-1".to_string(),
            amount,
            LedgerStatus::Open,
            100,
        )
    }

    #[tokio::test]
    async fn sqlite_insert_and_get() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        let e = entry("le-1", "awb-1", 100);
        store.insert(&e).await.unwrap();

        assert_eq!(store.get("le-1").await.unwrap(), Some(e));
    }

    #[tokio::test]
    async fn sqlite_duplicate_source_unit_rejected() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store.insert(&entry("le-1", "awb-1", 100)).await.unwrap();

        let result = store.insert(&entry("le-2", "awb-1", 200)).await;
        assert!(matches!(result, Err(StoreError::DuplicateSourceUnit(_))));
    }

    #[tokio::test]
    async fn sqlite_lock_into_batch_rolls_back_on_conflict() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store.insert(&entry("le-1", "awb-1", 100)).await.unwrap();

        let mut paid = entry("le-2", "awb-2", 150);
        paid.status = LedgerStatus::Paid;
        store.insert(&paid).await.unwrap();

        let result = store
            .lock_into_batch(&["le-1".to_string(), "le-2".to_string()], "pb-1", 10)
            .await;
        assert!(matches!(result, Err(StoreError::StateConflict { .. })));

        let untouched = store.get("le-1").await.unwrap().unwrap();
        assert_eq!(untouched.status, LedgerStatus::Open);
        assert_eq!(untouched.batch_id, None);
    }

    #[tokio::test]
    async fn sqlite_full_batch_flow() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store.insert(&entry("le-1", "awb-1", 100)).await.unwrap();
        store.insert(&entry("le-2", "awb-2", 150)).await.unwrap();

        let locked = store
            .lock_into_batch(&["le-1".to_string(), "le-2".to_string()], "pb-1", 10)
            .await
            .unwrap();
        assert_eq!(locked.len(), 2);
        assert!(locked.iter().all(|e| e.status == LedgerStatus::Locked));

        assert_eq!(store.mark_processing("pb-1", 11).await.unwrap(), 2);

        store
            .finalize(
                &["le-1".to_string(), "le-2".to_string()],
                LedgerStatus::Paid,
                Some("razorpay:pb-1"),
                12,
            )
            .await
            .unwrap();

        let members = store.list_by_batch("pb-1").await.unwrap();
        assert!(members.iter().all(|e| e.status == LedgerStatus::Paid
            && e.gateway_ref.as_deref() == Some("razorpay:pb-1")));
    }

    #[tokio::test]
    async fn sqlite_hold_flow() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store.insert(&entry("le-1", "awb-1", 100)).await.unwrap();

        let held = store
            .set_status("le-1", LedgerStatus::OnHold, Some("kyc mismatch"), 10)
            .await
            .unwrap();
        assert_eq!(held.status, LedgerStatus::OnHold);
        assert_eq!(held.hold_reason.as_deref(), Some("kyc mismatch"));
    }
}
