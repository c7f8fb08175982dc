use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::now_ms;

/// A granted exclusivity claim on a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLock {
    pub key: String,
    pub owner: String,
    pub acquired_at_ms: u64,
    pub expires_at_ms: u64,
}

impl ExecutionLock {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at_ms
    }
}

/// TTL-bounded exclusive locks. A crashed holder cannot deadlock a key
/// forever: expiry self-heals on the next acquire.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: RwLock<HashMap<String, ExecutionLock>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant requires the absence of a non-expired lock on the key.
    pub fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> bool {
        let now = now_ms();
        let mut locks = self.locks.write().unwrap();

        if let Some(existing) = locks.get(key) {
            if !existing.is_expired(now) {
                return false;
            }
        }

        locks.insert(
            key.to_string(),
            ExecutionLock {
                key: key.to_string(),
                owner: owner.to_string(),
                acquired_at_ms: now,
                expires_at_ms: now + ttl.as_millis() as u64,
            },
        );
        true
    }

    /// Release only succeeds for the matching owner.
    pub fn release(&self, key: &str, owner: &str) -> bool {
        let mut locks = self.locks.write().unwrap();
        match locks.get(key) {
            Some(lock) if lock.owner == owner => {
                locks.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn holder(&self, key: &str) -> Option<ExecutionLock> {
        let now = now_ms();
        self.locks
            .read()
            .unwrap()
            .get(key)
            .filter(|l| !l.is_expired(now))
            .cloned()
    }

    /// Drop expired locks; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = now_ms();
        let mut locks = self.locks.write().unwrap();
        let before = locks.len();
        locks.retain(|_, l| !l.is_expired(now));
        before - locks.len()
    }
}
