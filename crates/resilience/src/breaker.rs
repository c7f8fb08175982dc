use payrun_types::{Actor, Capability, EngineError};
use payrun_audit::{AuditKind, AuditSink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerState {
    pub status: CircuitStatus,
    pub fail_count: u32,
    pub last_failure_at_ms: Option<u64>,
    pub last_success_at_ms: Option<u64>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            status: CircuitStatus::Closed,
            fail_count: 0,
            last_failure_at_ms: None,
            last_success_at_ms: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Per-resource circuit breakers, keyed by gateway name.
///
/// There is no timer: a stale OPEN is downgraded to HALF_OPEN lazily when
/// the state is next read, once the cool-down has elapsed since the last
/// failure.
pub struct CircuitBreakerRegistry {
    states: RwLock<HashMap<String, BreakerState>>,
    config: BreakerConfig,
    audit: Arc<dyn AuditSink>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
            audit,
        }
    }

    /// Current status, lazily initializing CLOSED and lazily downgrading a
    /// stale OPEN to HALF_OPEN.
    pub fn status(&self, resource: &str) -> CircuitStatus {
        let now = now_ms();
        let mut states = self.states.write().unwrap();
        let state = states
            .entry(resource.to_string())
            .or_insert_with(BreakerState::closed);

        if state.status == CircuitStatus::Open {
            if let Some(last_failure) = state.last_failure_at_ms {
                if now.saturating_sub(last_failure) >= self.config.cooldown.as_millis() as u64 {
                    state.status = CircuitStatus::HalfOpen;
                    info!(resource, "circuit breaker downgraded to HALF_OPEN");
                }
            }
        }

        state.status
    }

    pub fn state(&self, resource: &str) -> BreakerState {
        // Evaluate lazy downgrade first.
        self.status(resource);
        self.states
            .read()
            .unwrap()
            .get(resource)
            .cloned()
            .unwrap_or_else(BreakerState::closed)
    }

    /// Count a failure against the resource; at the threshold the breaker
    /// trips OPEN and an audit event is written.
    pub async fn record_failure(&self, resource: &str) -> CircuitStatus {
        let tripped = {
            let mut states = self.states.write().unwrap();
            let state = states
                .entry(resource.to_string())
                .or_insert_with(BreakerState::closed);

            state.fail_count += 1;
            state.last_failure_at_ms = Some(now_ms());

            if state.status != CircuitStatus::Open
                && state.fail_count >= self.config.failure_threshold
            {
                state.status = CircuitStatus::Open;
                warn!(
                    resource,
                    failures = state.fail_count,
                    "circuit breaker tripped OPEN"
                );
                true
            } else {
                false
            }
        };

        if tripped {
            self.audit
                .log_event(
                    AuditKind::BreakerTripped,
                    &Actor::new("engine", payrun_types::ActorRole::System),
                    "circuit breaker tripped",
                    serde_json::json!({ "resource": resource }),
                )
                .await;
        }

        self.states.read().unwrap()[resource].status
    }

    /// Any success resets the breaker unconditionally.
    pub fn record_success(&self, resource: &str) {
        let mut states = self.states.write().unwrap();
        let state = states
            .entry(resource.to_string())
            .or_insert_with(BreakerState::closed);

        if state.status != CircuitStatus::Closed {
            info!(resource, "circuit breaker reset to CLOSED");
        }
        state.status = CircuitStatus::Closed;
        state.fail_count = 0;
        state.last_success_at_ms = Some(now_ms());
    }

    /// Operator override after an incident; capability-gated and audited.
    pub async fn manual_reset(&self, actor: &Actor, resource: &str) -> Result<(), EngineError> {
        actor.require(Capability::ResetCircuitBreaker)?;

        self.record_success(resource);
        self.audit
            .log_event(
                AuditKind::BreakerReset,
                actor,
                "circuit breaker manually reset",
                serde_json::json!({ "resource": resource }),
            )
            .await;
        Ok(())
    }
}
