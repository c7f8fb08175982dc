use async_trait::async_trait;
use payrun_types::Actor;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Event kinds recorded on committing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    LedgerGenerated,
    LedgerHeld,
    LedgerReleased,
    CycleApproved,
    ExecutionStarted,
    ExecutionFinished,
    BreakerTripped,
    BreakerReset,
    CallbackApplied,
    CallbackRejected,
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditKind::LedgerGenerated => "LEDGER_GENERATED",
            AuditKind::LedgerHeld => "LEDGER_HELD",
            AuditKind::LedgerReleased => "LEDGER_RELEASED",
            AuditKind::CycleApproved => "CYCLE_APPROVED",
            AuditKind::ExecutionStarted => "EXECUTION_STARTED",
            AuditKind::ExecutionFinished => "EXECUTION_FINISHED",
            AuditKind::BreakerTripped => "BREAKER_TRIPPED",
            AuditKind::BreakerReset => "BREAKER_RESET",
            AuditKind::CallbackApplied => "CALLBACK_APPLIED",
            AuditKind::CallbackRejected => "CALLBACK_REJECTED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub actor: String,
    pub description: String,
    pub metadata: serde_json::Value,
}

/// Write-only sink. Every money-relevant transition is written here
/// synchronously before the calling operation reports success.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_event(
        &self,
        kind: AuditKind,
        actor: &Actor,
        description: &str,
        metadata: serde_json::Value,
    );
}

/// Production sink: structured tracing events, shipped by the log pipeline.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_event(
        &self,
        kind: AuditKind,
        actor: &Actor,
        description: &str,
        metadata: serde_json::Value,
    ) {
        info!(
            kind = %kind,
            actor = %actor.id,
            metadata = %metadata,
            "{}",
            description
        );
    }
}

/// Inspectable sink for tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().unwrap().clone()
    }

    pub fn count(&self, kind: AuditKind) -> usize {
        self.events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn log_event(
        &self,
        kind: AuditKind,
        actor: &Actor,
        description: &str,
        metadata: serde_json::Value,
    ) {
        self.events.write().unwrap().push(AuditEvent {
            kind,
            actor: actor.id.clone(),
            description: description.to_string(),
            metadata,
        });
    }
}
