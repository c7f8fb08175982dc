//! Core configuration structures for the Payrun engine.

use payrun_types::{GatewayEnvironment, GatewayProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine-wide settings
    pub engine: EngineSection,

    /// Resilience primitive tuning
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Gateway credentials by provider name
    #[serde(default)]
    pub gateways: HashMap<String, GatewayConfig>,

    /// Ledger persistence
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Gateway environment driven by this deployment (test, production)
    pub environment: GatewayEnvironment,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            environment: GatewayEnvironment::Test,
            log_level: default_log_level(),
        }
    }
}

/// Tuning for the resilience primitives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Consecutive failures before a gateway breaker trips OPEN
    #[serde(default = "default_failure_threshold")]
    pub breaker_failure_threshold: u32,

    /// Cool-down before a stale OPEN downgrades to HALF_OPEN
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,

    /// TTL on per-batch execution locks
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// TTL on IN_PROGRESS idempotency claims
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,

    /// Per-minute budget for batch executions
    #[serde(default = "default_execute_per_minute")]
    pub execute_per_minute: u32,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            breaker_failure_threshold: default_failure_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            execute_per_minute: default_execute_per_minute(),
        }
    }
}

/// Per-gateway onboarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub provider: GatewayProvider,
    pub client_id: String,
    pub secret: String,
    /// Shared secret for verifying webhook callback signatures
    pub webhook_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// SQLite connection string; ":memory:" for ephemeral storage
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_breaker_cooldown_secs() -> u64 {
    60
}

fn default_lock_ttl_secs() -> u64 {
    300
}

fn default_idempotency_ttl_secs() -> u64 {
    600
}

fn default_execute_per_minute() -> u32 {
    30
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}
