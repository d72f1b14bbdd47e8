use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::ledger::CreateAccountParams;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub backend: Backend,
    /// PostgreSQL connection URL, required for `backend: postgres`
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

/// In-process backend settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MemoryConfig {
    pub lock_timeout_ms: u64,
    /// Accounts created at startup, ids assigned from 1 in order
    #[serde(default)]
    pub seed_accounts: Vec<CreateAccountParams>,
}

impl MemoryConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
            seed_accounts: Vec::new(),
        }
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
        let config: AppConfig = serde_yaml::from_str(content)?;
        if config.backend == Backend::Postgres && config.postgres_url.is_none() {
            anyhow::bail!("postgres_url is required for the postgres backend");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
log_level: info
log_dir: ./logs
log_file: ledger.log
use_json: false
rotation: daily
"#;

    #[test]
    fn test_memory_backend_with_seed_accounts() {
        let yaml = format!(
            "{}backend: memory\nmemory:\n  lock_timeout_ms: 250\n  seed_accounts:\n    - {{ owner: alice, balance: 100, currency: USD }}\n",
            BASE
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();

        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.memory.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.memory.seed_accounts.len(), 1);
        assert_eq!(config.memory.seed_accounts[0].owner, "alice");
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_postgres_backend_requires_url() {
        let err = AppConfig::from_yaml(BASE).unwrap_err();
        assert!(err.to_string().contains("postgres_url"));

        let yaml = format!("{}postgres_url: postgresql://localhost/ledger\n", BASE);
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.backend, Backend::Postgres);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load("does-not-exist").unwrap_err();
        assert!(err.to_string().contains("config/does-not-exist.yaml"));
    }
}
