//! Test helpers for interpreter tests
//!
//! Scripts and configurations are written as JSON fixtures and deserialized
//! the same way a client submission would be.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};

use crate::context::TestContext;
use crate::engines::{ActionRequest, EngineRegistry, ScriptRunner, SubEngine};
use crate::error::{EngineError, Result};
use crate::interpreter::{Interpreter, ResultHandle};
use crate::model::script::Function;
use crate::model::{
    ActionResponse, Property, TestConfiguration, TestConfigurationResult, TestScript,
    TestScriptResult, Trace, TraceKind,
};
use crate::sync::SyncRegistry;

pub fn interpreter() -> Interpreter {
    interpreter_with(EngineRegistry::with_builtins())
}

pub fn interpreter_with(engines: EngineRegistry) -> Interpreter {
    Interpreter::new(
        Arc::new(engines),
        Arc::new(SyncRegistry::new()),
        Duration::from_secs(30),
    )
}

/// Script named "script" holding `elements`
pub fn script(elements: JsonValue) -> TestScript {
    serde_json::from_value(json!({"id": "s", "name": "script", "elements": elements}))
        .expect("Invalid script fixture")
}

pub fn configuration(json: JsonValue) -> TestConfiguration {
    serde_json::from_value(json).expect("Invalid configuration fixture")
}

pub fn results_for(configuration: &TestConfiguration) -> ResultHandle {
    Arc::new(Mutex::new(TestConfigurationResult::new(configuration)))
}

/// Run a script that must not be interrupted
pub async fn run(interpreter: &Interpreter, script: &TestScript, ctx: &mut TestContext) -> TestScriptResult {
    let (result, outcome) = interpreter.run_script(script, ctx).await;
    assert!(outcome.is_ok(), "Script was interrupted");
    result
}

/// Log lines of a script result, in order
pub fn messages(result: &TestScriptResult) -> Vec<String> {
    result.log.iter().map(|entry| entry.message.clone()).collect()
}

/// Text message node fixture
pub fn text(message: &str) -> JsonValue {
    json!({"type": "text_message", "text": message})
}

/// Action fixture dispatched to `engine` with `operation`
pub fn action(name: &str, engine: &str, operation: &str, properties: JsonValue) -> JsonValue {
    json!({
        "type": "action",
        "name": name,
        "metadata": [{"name": name, "engine": engine, "operation": operation}],
        "properties": properties
    })
}

/// Sub-engine that records every operation and echoes properties back with
/// one deferred trace
#[derive(Debug, Default, Clone)]
pub struct RecordingEngine {
    pub calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SubEngine for RecordingEngine {
    async fn execute(&self, request: ActionRequest<'_>, _context: &TestContext) -> Result<ActionResponse> {
        self.calls.lock().push(request.operation.to_string());

        let mut response = ActionResponse::passed(request.action);
        response.return_properties = request.properties.to_vec();
        response.traces.push(Trace {
            id: format!("trace-{}", request.operation),
            kind: TraceKind::Screenshot,
            name: format!("{}.png", request.operation),
            deferred: true,
            content: None,
        });
        Ok(response)
    }
}

/// Scripting capability that logs one line and returns its inputs prefixed
/// with `out_`; a function whose source is "fail" errors instead
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixRunner;

#[async_trait]
impl ScriptRunner for PrefixRunner {
    async fn run(
        &self,
        function: &Function,
        properties: Vec<Property>,
        log: &mut Vec<String>,
    ) -> Result<Vec<Property>> {
        log.push(format!("running {}", function.name));
        if function.source == "fail" {
            return Err(EngineError::Internal("runner crashed".to_string()));
        }
        Ok(properties
            .into_iter()
            .map(|p| {
                let name = format!("out_{}", p.name);
                p.renamed(name)
            })
            .collect())
    }
}
