//! Configuration validation.

use crate::{ConfigError, EngineConfig, Result};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate the engine configuration before startup.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.engine.log_level.as_str()) {
        errors.push(format!(
            "engine.log_level: unknown level '{}'",
            config.engine.log_level
        ));
    }

    if config.resilience.breaker_failure_threshold == 0 {
        errors.push("resilience.breaker_failure_threshold: must be at least 1".to_string());
    }
    if config.resilience.lock_ttl_secs == 0 {
        errors.push("resilience.lock_ttl_secs: must be greater than 0".to_string());
    }
    if config.resilience.idempotency_ttl_secs == 0 {
        errors.push("resilience.idempotency_ttl_secs: must be greater than 0".to_string());
    }
    if config.resilience.execute_per_minute == 0 {
        errors.push("resilience.execute_per_minute: must be greater than 0".to_string());
    }

    for (name, gateway) in &config.gateways {
        if gateway.client_id.is_empty() {
            errors.push(format!("gateways.{}.client_id: must not be empty", name));
        }
        if gateway.secret.is_empty() {
            errors.push(format!("gateways.{}.secret: must not be empty", name));
        }
        if gateway.webhook_secret.is_empty() {
            errors.push(format!("gateways.{}.webhook_secret: must not be empty", name));
        }
    }

    if config.ledger.database_url.is_empty() {
        errors.push("ledger.database_url: must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
