use payrun_audit::{AuditKind, AuditSink};
use payrun_types::{Actor, ActorRole, DisbursementRecord, DisbursementStatus, EngineError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

use crate::adapter::{now_secs, DisbursementStore};

/// Gateway status callback, delivered out of band after a transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEvent {
    /// Our disbursement id, echoed back by the gateway.
    pub reference: String,
    /// Gateway-reported terminal status: SUCCESS, FAILED or REVERSED.
    pub status: DisbursementStatus,
    pub transfer_id: String,
    pub signature: String,
}

/// Expected signature over the callback body with the shared secret.
pub fn callback_signature(secret: &str, event: &CallbackEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(format!("{}|{}|{}", event.reference, event.status, event.transfer_id).as_bytes());
    hex::encode(hasher.finalize())
}

/// Applies gateway callbacks to disbursement rows.
///
/// Callbacks are advisory: a bad signature or unknown reference is
/// rejected without touching state, and a reported status never regresses
/// a SUCCESS row except for an explicit REVERSED.
pub struct WebhookHandler {
    store: Arc<dyn DisbursementStore>,
    audit: Arc<dyn AuditSink>,
    secret: String,
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn DisbursementStore>, audit: Arc<dyn AuditSink>, secret: &str) -> Self {
        Self {
            store,
            audit,
            secret: secret.to_string(),
        }
    }

    pub async fn handle_callback(
        &self,
        event: &CallbackEvent,
    ) -> Result<DisbursementRecord, EngineError> {
        let gateway = Actor::new("gateway-callback", ActorRole::System);

        if callback_signature(&self.secret, event) != event.signature {
            self.reject(&gateway, event, "signature mismatch").await;
            return Err(EngineError::IntegrityError(format!(
                "callback signature mismatch for reference {}",
                event.reference
            )));
        }

        let Some(mut record) = self.store.find_by_reference(&event.reference).await? else {
            self.reject(&gateway, event, "unknown reference").await;
            return Err(EngineError::IntegrityError(format!(
                "callback references unknown disbursement {}",
                event.reference
            )));
        };

        let incoming = event.status;
        let applies = match (record.status, incoming) {
            // Terminal reports onto a finished or in-flight attempt.
            (DisbursementStatus::Initiated, DisbursementStatus::Success)
            | (DisbursementStatus::Initiated, DisbursementStatus::Failed)
            | (DisbursementStatus::Pending, DisbursementStatus::Success)
            | (DisbursementStatus::Pending, DisbursementStatus::Failed)
            | (DisbursementStatus::Failed, DisbursementStatus::Success)
            | (DisbursementStatus::Success, DisbursementStatus::Reversed) => true,
            // Duplicate delivery of what we already know.
            (current, reported) if current == reported => false,
            _ => {
                self.reject(&gateway, event, "status regression").await;
                return Err(EngineError::IntegrityError(format!(
                    "callback would regress disbursement {} from {} to {}",
                    record.id, record.status, incoming
                )));
            }
        };

        if applies {
            record.status = incoming;
            if incoming == DisbursementStatus::Success {
                record.transfer_id = Some(event.transfer_id.clone());
                record.failure_reason = None;
            }
            record.updated_at = now_secs();
            self.store.update(&record).await?;
        }

        self.audit
            .log_event(
                AuditKind::CallbackApplied,
                &gateway,
                "gateway callback applied",
                serde_json::json!({
                    "disbursement_id": record.id,
                    "status": record.status,
                    "transfer_id": event.transfer_id,
                    "duplicate": !applies,
                }),
            )
            .await;
        Ok(record)
    }

    async fn reject(&self, actor: &Actor, event: &CallbackEvent, reason: &str) {
        warn!(
            reference = %event.reference,
            reason = %reason,
            "gateway callback rejected"
        );
        self.audit
            .log_event(
                AuditKind::CallbackRejected,
                actor,
                "gateway callback rejected",
                serde_json::json!({
                    "reference": event.reference,
                    "reason": reason,
                }),
            )
            .await;
    }
}
