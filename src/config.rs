use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::credentials::ConnSpec;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub ai: AiConfig,

    pub target: TargetConfig,

    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Tokio worker threads. 0 means one per CPU core.
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/sqlpilot.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub model: String,

    /// Any OpenAI-compatible chat-completions endpoint.
    pub base_url: String,

    pub timeout_seconds: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_seconds: 60,
        }
    }
}

/// The relational database queries execute against. The password is never
/// part of the config file; it lives in the OS credential store under the
/// server/database/uid triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub driver: String,

    pub server: String,

    pub database: String,

    pub uid: String,

    pub connection_timeout_seconds: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            server: "localhost".to_string(),
            database: "target.db".to_string(),
            uid: String::new(),
            connection_timeout_seconds: 15,
        }
    }
}

impl TargetConfig {
    #[must_use]
    pub fn conn_spec(&self) -> ConnSpec {
        ConnSpec {
            driver: self.driver.clone(),
            server: self.server.clone(),
            database: self.database.clone(),
            uid: self.uid.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("sqlpilot").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".sqlpilot").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.database_path.is_empty() {
            anyhow::bail!("database_path cannot be empty");
        }
        if self.ai.model.is_empty() || self.ai.base_url.is_empty() {
            anyhow::bail!("AI model and base_url must be set");
        }
        if self.target.server.is_empty() || self.target.database.is_empty() {
            anyhow::bail!("Target server and database must be set");
        }
        Ok(())
    }

    /// The model API key, from the environment only. It is never written to
    /// the config file or logged.
    pub fn api_key() -> Result<String> {
        std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn parses_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [target]
            driver = "mysql"
            server = "db.internal"
            database = "sales"
            uid = "reporting"
            "#,
        )
        .unwrap();

        assert_eq!(config.target.driver, "mysql");
        assert_eq!(config.target.uid, "reporting");
        // untouched sections keep their defaults
        assert_eq!(config.general.log_level, "info");
        assert!(config.scheduler.enabled);
    }

    #[test]
    fn conn_spec_carries_no_password() {
        let spec = TargetConfig::default().conn_spec();
        let dsn = spec.to_dsn(None);
        assert!(!dsn.to_uppercase().contains("PWD"));
    }
}
