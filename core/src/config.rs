//! Engine configuration
//!
//! Sources, lowest to highest precedence: built-in defaults, `conductor.toml`
//! (or an explicit file), `CONDUCTOR_*` environment variables, then builder
//! overrides. A `.env` file is loaded first when present.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config as ConfigLoader, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Searched in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "conductor";

pub const ENV_PREFIX: &str = "CONDUCTOR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Permits of the worker pool hosting job tasks
    pub worker_pool_size: usize,

    /// Used by Lock nodes that set no timeout
    pub default_lock_timeout_ms: u64,

    /// Default for new contexts; traces are dropped when off
    pub tracing_enabled: bool,

    /// Filter directive used when RUST_LOG is not set
    pub log_level: String,

    /// Acting user recorded on log lines
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Opaque per-engine settings, keyed by sub-engine type
    pub engine_settings: HashMap<String, JsonValue>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 1,
            default_lock_timeout_ms: 30_000,
            tracing_enabled: true,
            log_level: "info".to_string(),
            user: None,
            engine_settings: HashMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Defaults, `conductor.toml`, and the environment
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.default_lock_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            bail!("worker_pool_size must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config_path: Option<PathBuf>,
    worker_pool_size: Option<usize>,
    user: Option<String>,
}

impl EngineConfigBuilder {
    /// Required file instead of the optional `conductor.toml`
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = Some(size);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        let _ = dotenvy::dotenv();

        let defaults = ConfigLoader::try_from(&EngineConfig::default())
            .context("Failed to serialize default configuration")?;
        let mut builder = ConfigLoader::builder().add_source(defaults);

        builder = match &self.config_path {
            Some(path) => builder.add_source(File::from(path.as_path()).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(size) = self.worker_pool_size {
            builder = builder.set_override("worker_pool_size", size as i64)?;
        }
        if let Some(user) = self.user {
            builder = builder.set_override("user", user)?;
        }

        let config: EngineConfig = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("conductor.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_pool_size, 1);
        assert_eq!(config.lock_timeout(), Duration::from_secs(30));
        assert!(config.tracing_enabled);
    }

    #[test]
    fn test_file_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            default_lock_timeout_ms = 500
            tracing_enabled = false

            [engine_settings.web]
            browser = "firefox"
            "#,
        );

        let config = EngineConfig::builder()
            .config_path(Some(path))
            .worker_pool_size(4)
            .user("tester")
            .build()
            .unwrap();

        assert_eq!(config.worker_pool_size, 4);
        assert_eq!(config.default_lock_timeout_ms, 500);
        assert!(!config.tracing_enabled);
        assert_eq!(config.user.as_deref(), Some("tester"));
        assert_eq!(
            config.engine_settings,
            hashmap! {"web".to_string() => serde_json::json!({"browser": "firefox"})}
        );
    }

    #[test]
    fn test_zero_pool_is_rejected() {
        let result = EngineConfig::builder().worker_pool_size(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = EngineConfig::builder()
            .config_path(Some(PathBuf::from("/nonexistent/conductor.toml")))
            .build();
        assert!(result.is_err());
    }
}
