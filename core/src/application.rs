//! Application wiring
//!
//! Builds the shared registries and the execution service from an
//! [`EngineConfig`]. Embedders hold the `Application` for the lifetime of the
//! process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::config::EngineConfig;
use crate::engines::EngineRegistry;
use crate::interpreter::Interpreter;
use crate::services::ExecutionService;
use crate::sync::SyncRegistry;

/// The engine instance with all services
pub struct Application {
    pub config: EngineConfig,
    pub engines: Arc<EngineRegistry>,
    pub execution_service: ExecutionService,
}

impl Application {
    /// Pure instantiation, no I/O
    pub fn new(config: EngineConfig, engines: EngineRegistry) -> Self {
        let engines = Arc::new(engines);
        let interpreter = Arc::new(Interpreter::new(
            engines.clone(),
            Arc::new(SyncRegistry::new()),
            config.lock_timeout(),
        ));
        Self {
            execution_service: ExecutionService::new(config.clone(), interpreter),
            engines,
            config,
        }
    }

    /// Load configuration and wire the built-in engines
    pub fn initialize(config_path: Option<PathBuf>) -> Result<Self> {
        let config = EngineConfig::builder().config_path(config_path).build()?;
        Ok(Self::new(config, EngineRegistry::with_builtins()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::model::TestConfiguration;
    use crate::types::{JobStatus, ResultStatus};

    #[test]
    fn test_initialize_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conductor.toml");
        std::fs::write(&path, "default_lock_timeout_ms = 250\nuser = \"ci\"\n").unwrap();

        let app = Application::initialize(Some(path)).unwrap();
        assert_eq!(app.config().default_lock_timeout_ms, 250);
        assert_eq!(app.execution_service.new_context().user(), Some("ci"));
        assert!(app.engines.sub_engine("log").is_some());
    }

    #[tokio::test]
    async fn test_builtin_log_engine_runs_end_to_end() {
        let app = Application::new(EngineConfig::default(), EngineRegistry::with_builtins());
        let configuration: TestConfiguration = serde_json::from_value(json!({
            "id": "c", "name": "smoke",
            "elements": [{
                "id": "a", "name": "A", "schema": {"id": "leaf"},
                "scripts": [{"id": "s", "name": "s", "elements": [
                    {"type": "action", "name": "echo",
                     "metadata": [{"name": "echo", "engine": "log", "operation": "echo"}],
                     "properties": [{"name": "greeting", "type": "STRING", "value": "hi"}]}
                ]}]
            }]
        }))
        .unwrap();

        let service = &app.execution_service;
        let id = service
            .start_execution(configuration, service.new_context())
            .unwrap();
        assert_eq!(service.wait_for_completion(&id).await.unwrap(), JobStatus::Finished);

        let result = service.get_test_configuration_result(&id).unwrap();
        assert_eq!(result.status, Some(ResultStatus::Passed));
    }
}
