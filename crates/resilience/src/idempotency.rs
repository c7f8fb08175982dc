use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
    Failed,
}

/// One logical operation attempt, keyed per (batch, gateway).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub status: IdempotencyStatus,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub result_hash: Option<String>,
}

impl IdempotencyRecord {
    /// Completed records never expire: they permanently short-circuit
    /// replays. Expiry only releases stale IN_PROGRESS and FAILED keys.
    fn is_expired(&self, now: u64) -> bool {
        self.status != IdempotencyStatus::Completed && now >= self.expires_at_ms
    }
}

/// Outcome of attempting to claim a key before starting work.
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// Key claimed; caller proceeds and must later call complete or fail.
    Started,
    /// A concurrent caller holds the key.
    InProgress,
    /// A previous attempt completed; replay the cached result.
    Completed { result_hash: Option<String> },
}

/// Process-wide idempotency table with TTL-based garbage collection.
#[derive(Debug, Default)]
pub struct IdempotencyStore {
    records: RwLock<HashMap<String, IdempotencyRecord>>,
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, key: &str) -> Option<IdempotencyRecord> {
        let now = now_ms();
        self.records
            .read()
            .unwrap()
            .get(key)
            .filter(|r| !r.is_expired(now))
            .cloned()
    }

    /// Atomically claim the key, marking it IN_PROGRESS.
    pub fn begin(&self, key: &str, ttl: Duration) -> BeginOutcome {
        let now = now_ms();
        let mut records = self.records.write().unwrap();

        if let Some(existing) = records.get(key) {
            if !existing.is_expired(now) {
                return match existing.status {
                    IdempotencyStatus::InProgress => BeginOutcome::InProgress,
                    IdempotencyStatus::Completed => BeginOutcome::Completed {
                        result_hash: existing.result_hash.clone(),
                    },
                    // FAILED permits a fresh attempt.
                    IdempotencyStatus::Failed => {
                        Self::insert_in_progress(&mut records, key, now, ttl)
                    }
                };
            }
        }

        Self::insert_in_progress(&mut records, key, now, ttl)
    }

    fn insert_in_progress(
        records: &mut HashMap<String, IdempotencyRecord>,
        key: &str,
        now: u64,
        ttl: Duration,
    ) -> BeginOutcome {
        records.insert(
            key.to_string(),
            IdempotencyRecord {
                key: key.to_string(),
                status: IdempotencyStatus::InProgress,
                created_at_ms: now,
                expires_at_ms: now + ttl.as_millis() as u64,
                result_hash: None,
            },
        );
        BeginOutcome::Started
    }

    pub fn complete(&self, key: &str, result_hash: Option<String>) {
        let mut records = self.records.write().unwrap();
        if let Some(record) = records.get_mut(key) {
            record.status = IdempotencyStatus::Completed;
            record.result_hash = result_hash;
        }
    }

    /// Mark a failed attempt. Unlike Completed, this permits a future retry.
    pub fn fail(&self, key: &str) {
        let mut records = self.records.write().unwrap();
        if let Some(record) = records.get_mut(key) {
            record.status = IdempotencyStatus::Failed;
        }
    }

    /// Drop expired non-completed records; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = now_ms();
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        before - records.len()
    }
}
