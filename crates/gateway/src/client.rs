use async_trait::async_trait;
use payrun_types::{Amount, GatewayEnvironment, GatewayProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Credentials resolved for one (provider, environment) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCredentials {
    pub provider: GatewayProvider,
    pub environment: GatewayEnvironment,
    pub client_id: String,
    pub secret: String,
}

/// Resolves active credentials; None means the gateway is not onboarded
/// for that environment.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn resolve(
        &self,
        provider: GatewayProvider,
        environment: GatewayEnvironment,
    ) -> Option<GatewayCredentials>;
}

#[derive(Debug, Default)]
pub struct StaticCredentialStore {
    credentials: HashMap<(GatewayProvider, GatewayEnvironment), GatewayCredentials>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(mut self, creds: GatewayCredentials) -> Self {
        self.credentials
            .insert((creds.provider, creds.environment), creds);
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn resolve(
        &self,
        provider: GatewayProvider,
        environment: GatewayEnvironment,
    ) -> Option<GatewayCredentials> {
        self.credentials.get(&(provider, environment)).cloned()
    }
}

/// Result of one external money movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutcome {
    Success { transfer_id: String },
    Failed { reason: String },
}

/// External gateway seam. The engine enforces its own idempotency and
/// never assumes the gateway deduplicates.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn transfer_funds(
        &self,
        credentials: &GatewayCredentials,
        disbursement_id: &str,
        beneficiary_ref: &str,
        amount: Amount,
    ) -> TransferOutcome;
}

/// Record of one call the mock received.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCall {
    pub disbursement_id: String,
    pub beneficiary_ref: String,
    pub amount: Amount,
}

/// Deterministic test double: outcomes are scripted per beneficiary,
/// defaulting to success. Tests never depend on randomness.
#[derive(Debug, Default)]
pub struct MockGatewayClient {
    scripted: RwLock<HashMap<String, TransferOutcome>>,
    calls: Arc<RwLock<Vec<TransferCall>>>,
}

impl MockGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome for a beneficiary; unscripted beneficiaries
    /// succeed with a transfer id derived from the disbursement id.
    pub fn script(&self, beneficiary_ref: &str, outcome: TransferOutcome) {
        self.scripted
            .write()
            .unwrap()
            .insert(beneficiary_ref.to_string(), outcome);
    }

    pub fn fail_beneficiary(&self, beneficiary_ref: &str, reason: &str) {
        self.script(
            beneficiary_ref,
            TransferOutcome::Failed {
                reason: reason.to_string(),
            },
        );
    }

    pub fn calls(&self) -> Vec<TransferCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn calls_for(&self, beneficiary_ref: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.beneficiary_ref == beneficiary_ref)
            .count()
    }
}

#[async_trait]
impl GatewayClient for MockGatewayClient {
    async fn transfer_funds(
        &self,
        _credentials: &GatewayCredentials,
        disbursement_id: &str,
        beneficiary_ref: &str,
        amount: Amount,
    ) -> TransferOutcome {
        self.calls.write().unwrap().push(TransferCall {
            disbursement_id: disbursement_id.to_string(),
            beneficiary_ref: beneficiary_ref.to_string(),
            amount,
        });

        self.scripted
            .read()
            .unwrap()
            .get(beneficiary_ref)
            .cloned()
            .unwrap_or_else(|| TransferOutcome::Success {
                transfer_id: format!("txn-{}", disbursement_id),
            })
    }
}
