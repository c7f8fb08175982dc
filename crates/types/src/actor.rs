use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Elevated operations an actor may perform on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    ApprovePayoutCycle,
    ExecutePayoutBatch,
    ResetCircuitBreaker,
    HoldLedgerEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    FinanceAdmin,
    Operations,
    /// Internal callers (webhook handler, schedulers).
    System,
}

impl ActorRole {
    /// Single polymorphism point over roles; callers check capabilities,
    /// never role literals.
    pub fn grants(&self, capability: Capability) -> bool {
        match self {
            ActorRole::FinanceAdmin => true,
            ActorRole::Operations => matches!(capability, Capability::HoldLedgerEntry),
            ActorRole::System => false,
        }
    }
}

/// An authenticated administrative caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Authorization gate for every administrative surface. Failure is a
    /// distinct error kind, separate from business-rule failures.
    pub fn require(&self, capability: Capability) -> Result<(), EngineError> {
        if self.role.grants(capability) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized {
                actor: self.id.clone(),
                capability,
            })
        }
    }
}
