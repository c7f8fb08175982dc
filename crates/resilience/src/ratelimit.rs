use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

use crate::now_ms;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded for action: {0}")]
    LimitExceeded(String),
}

const WINDOW_MS: u64 = 60_000;

#[derive(Debug)]
struct Window {
    started_at_ms: u64,
    count: u32,
}

/// Fixed-window per-action counter. The budget resets when the minute
/// window rolls over; partial windows are never prorated.
#[derive(Debug, Default)]
pub struct FixedWindowLimiter {
    budgets: HashMap<String, u32>,
    windows: RwLock<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, action: &str, per_minute: u32) -> Self {
        self.budgets.insert(action.to_string(), per_minute);
        self
    }

    pub fn try_acquire(&self, action: &str) -> bool {
        let Some(&budget) = self.budgets.get(action) else {
            // No budget configured, allow.
            return true;
        };

        let now = now_ms();
        let mut windows = self.windows.write().unwrap();
        let window = windows.entry(action.to_string()).or_insert(Window {
            started_at_ms: now,
            count: 0,
        });

        if now.saturating_sub(window.started_at_ms) >= WINDOW_MS {
            window.started_at_ms = now;
            window.count = 0;
        }

        if window.count < budget {
            window.count += 1;
            true
        } else {
            false
        }
    }

    pub fn acquire(&self, action: &str) -> Result<(), RateLimitError> {
        if self.try_acquire(action) {
            Ok(())
        } else {
            Err(RateLimitError::LimitExceeded(action.to_string()))
        }
    }

    pub fn remaining(&self, action: &str) -> u32 {
        let Some(&budget) = self.budgets.get(action) else {
            return u32::MAX;
        };

        let now = now_ms();
        let windows = self.windows.read().unwrap();
        match windows.get(action) {
            Some(w) if now.saturating_sub(w.started_at_ms) < WINDOW_MS => {
                budget.saturating_sub(w.count)
            }
            _ => budget,
        }
    }
}
