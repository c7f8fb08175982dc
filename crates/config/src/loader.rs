//! Configuration loading from multiple sources.

use crate::{ConfigError, EngineConfig, Result};
use ::config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Default environment variable prefix: `PAYRUN_ENGINE_LOG_LEVEL` etc.
pub const ENV_PREFIX: &str = "PAYRUN";

/// Configuration loader over TOML and JSON sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file, picking the format by extension.
    pub fn from_file(path: &Path) -> Result<EngineConfig> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        let content = std::fs::read_to_string(path)?;
        tracing::info!(path = %path.display(), "Loading configuration");

        match extension {
            "toml" => Self::from_toml(&content),
            "json" => Self::from_json(&content),
            _ => Err(ConfigError::LoadError(format!(
                "Unsupported file extension: {}",
                extension
            ))),
        }
    }

    pub fn from_toml(content: &str) -> Result<EngineConfig> {
        toml::from_str(content).map_err(ConfigError::from)
    }

    pub fn from_json(content: &str) -> Result<EngineConfig> {
        serde_json::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from `PAYRUN_*` environment variables.
    ///
    /// Variables are in the format PREFIX_SECTION_KEY, for example
    /// `PAYRUN_ENGINE_ENVIRONMENT=production`.
    pub fn from_env() -> Result<EngineConfig> {
        let config = Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("_"))
            .build()?;

        config.try_deserialize().map_err(ConfigError::from)
    }

    /// Load from a file with environment variable overrides layered on top.
    pub fn from_file_with_env(path: &Path) -> Result<EngineConfig> {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        };

        let config = Config::builder()
            .add_source(File::from(path).format(format))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("_"))
            .build()?;

        config.try_deserialize().map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payrun_types::{GatewayEnvironment, GatewayProvider};
    use std::io::Write;

    const TOML: &str = r#"
        [engine]
        environment = "test"
        log_level = "debug"

        [resilience]
        breaker_failure_threshold = 3
        breaker_cooldown_secs = 30
        lock_ttl_secs = 120
        idempotency_ttl_secs = 300
        execute_per_minute = 10

        [gateways.razorpay]
        provider = "razorpay"
        client_id = "rzp-client"
        secret = "rzp-secret"
        webhook_secret = "whsec-rzp"

        [ledger]
        database_url = "sqlite://payrun.db"
    "#;

    #[test]
    fn loads_from_toml() {
        let config = ConfigLoader::from_toml(TOML).unwrap();
        assert_eq!(config.engine.environment, GatewayEnvironment::Test);
        assert_eq!(config.engine.log_level, "debug");
        assert_eq!(config.resilience.breaker_failure_threshold, 3);
        assert_eq!(
            config.gateways["razorpay"].provider,
            GatewayProvider::Razorpay
        );
        assert_eq!(config.ledger.database_url, "sqlite://payrun.db");
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = ConfigLoader::from_toml(
            r#"
            [engine]
            environment = "production"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.environment, GatewayEnvironment::Production);
        assert_eq!(config.engine.log_level, "info");
        assert_eq!(config.resilience.lock_ttl_secs, 300);
        assert!(config.gateways.is_empty());
    }

    #[test]
    fn loads_from_json() {
        let json = r#"
        {
          "engine": { "environment": "test", "log_level": "warn" },
          "resilience": { "execute_per_minute": 5 },
          "gateways": {},
          "ledger": { "database_url": "sqlite::memory:" }
        }
        "#;

        let config = ConfigLoader::from_json(json).unwrap();
        assert_eq!(config.engine.log_level, "warn");
        assert_eq!(config.resilience.execute_per_minute, 5);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(TOML.as_bytes()).unwrap();

        let config = ConfigLoader::from_file(file.path()).unwrap();
        assert_eq!(config.resilience.execute_per_minute, 10);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            ConfigLoader::from_file(Path::new("payrun.yaml")),
            Err(ConfigError::LoadError(_) | ConfigError::IoError(_))
        ));
    }
}
