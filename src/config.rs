use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL; `DATABASE_URL` overrides it
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Whole-request timeout applied by the router
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Per-transfer deadline; an atomic unit still open after it is aborted
    #[serde(default = "default_transfer_deadline_ms")]
    pub transfer_deadline_ms: u64,
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn transfer_deadline(&self) -> Duration {
        Duration::from_millis(self.transfer_deadline_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_transfer_deadline_ms() -> u64 {
    10_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Row lock wait before a unit is aborted
    pub lock_timeout_ms: u64,
}

impl PostgresConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            acquire_timeout_ms: 5_000,
            lock_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IdempotencyConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 300,
        }
    }
}

impl IdempotencyConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Connection URL, preferring the `DATABASE_URL` environment variable
    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .or_else(|| self.postgres_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: transfers.log
use_json: false
rotation: daily
gateway:
  host: 0.0.0.0
  port: 8080
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.request_timeout_ms, 30_000);
        assert_eq!(config.gateway.transfer_deadline_ms, 10_000);
        assert_eq!(config.postgres.max_connections, 20);
        assert_eq!(config.idempotency.ttl(), Duration::from_secs(86_400));
        assert_eq!(config.idempotency.sweep_interval(), Duration::from_secs(300));
        assert!(config.postgres_url.is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = format!(
            "{MINIMAL}postgres_url: postgres://u:p@db/ledger\npostgres:\n  max_connections: 5\n  acquire_timeout_ms: 100\n  lock_timeout_ms: 50\nidempotency:\n  ttl_secs: 60\n  sweep_interval_secs: 0\n"
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.postgres.max_connections, 5);
        assert_eq!(config.postgres.lock_timeout_ms, 50);
        assert_eq!(config.idempotency.ttl(), Duration::from_secs(60));
        // Zero interval would spin
        assert_eq!(config.idempotency.sweep_interval(), Duration::from_secs(1));
        assert_eq!(
            config.postgres_url.as_deref(),
            Some("postgres://u:p@db/ledger")
        );
    }

    #[test]
    fn test_missing_required_field() {
        assert!(AppConfig::from_yaml("log_level: info").is_err());
    }

    #[test]
    fn test_shipped_dev_config_parses() {
        let content = include_str!("../config/dev.yaml");
        let config = AppConfig::from_yaml(content).unwrap();
        assert!(config.postgres_url.is_some());
    }
}
