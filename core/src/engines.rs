//! Capabilities consumed by the interpreters
//!
//! Automation backends ("sub-engines"), pluggable assertions, the scripting
//! runtime, and the trace content cache are implemented outside the engine.
//! Each is a trait with a single entry point, registered by name at startup
//! in an `EngineRegistry`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::context::TestContext;
use crate::error::{EngineError, Result};
use crate::model::script::{Action, Function, MetaData};
use crate::model::{ActionResponse, Property, PropertyValue};

/// Everything a sub-engine needs to perform one action
#[derive(Debug, Clone, Copy)]
pub struct ActionRequest<'a> {
    pub action: &'a str,
    pub operation: &'a str,
    pub action_type: Option<&'a str>,
    pub metadata: &'a [MetaData],
    pub properties: &'a [Property],
}

#[async_trait]
pub trait SubEngine: Send + Sync {
    async fn execute(
        &self,
        request: ActionRequest<'_>,
        context: &TestContext,
    ) -> Result<ActionResponse>;
}

pub trait AssertionCheck: Send + Sync {
    /// Err with an Assertion error when the check is violated
    fn execute_assertion(&self, property: Option<&Property>) -> Result<()>;
}

#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run `function` with the resolved properties as input. Lines written to
    /// `log` are kept by the caller whatever the outcome.
    async fn run(
        &self,
        function: &Function,
        properties: Vec<Property>,
        log: &mut Vec<String>,
    ) -> Result<Vec<Property>>;
}

pub trait TraceCache: Send + Sync {
    fn get(&self, id: &str) -> Option<Vec<u8>>;
    fn remove(&self, id: &str) -> Option<Vec<u8>>;
}

#[derive(Clone, Default)]
pub struct EngineRegistry {
    sub_engines: HashMap<String, Arc<dyn SubEngine>>,
    assertions: HashMap<String, Arc<dyn AssertionCheck>>,
    script_runner: Option<Arc<dyn ScriptRunner>>,
    trace_cache: Option<Arc<dyn TraceCache>>,
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut engines: Vec<_> = self.sub_engines.keys().collect();
        engines.sort();
        let mut assertions: Vec<_> = self.assertions.keys().collect();
        assertions.sort();
        f.debug_struct("EngineRegistry")
            .field("sub_engines", &engines)
            .field("assertions", &assertions)
            .field("script_runner", &self.script_runner.is_some())
            .field("trace_cache", &self.trace_cache.is_some())
            .finish()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `log` sub-engine, the `not_null` assertion, and an
    /// in-memory trace cache
    pub fn with_builtins() -> Self {
        Self::new()
            .with_engine("log", LogEngine)
            .with_assertion("not_null", NotNullAssertion)
            .with_trace_cache(MemoryTraceCache::new())
    }

    pub fn with_engine(mut self, engine_type: impl Into<String>, engine: impl SubEngine + 'static) -> Self {
        self.sub_engines.insert(engine_type.into(), Arc::new(engine));
        self
    }

    pub fn with_assertion(
        mut self,
        class_name: impl Into<String>,
        assertion: impl AssertionCheck + 'static,
    ) -> Self {
        self.assertions.insert(class_name.into(), Arc::new(assertion));
        self
    }

    pub fn with_script_runner(mut self, runner: impl ScriptRunner + 'static) -> Self {
        self.script_runner = Some(Arc::new(runner));
        self
    }

    pub fn with_trace_cache(mut self, cache: impl TraceCache + 'static) -> Self {
        self.trace_cache = Some(Arc::new(cache));
        self
    }

    pub fn sub_engine(&self, engine_type: &str) -> Option<&Arc<dyn SubEngine>> {
        self.sub_engines.get(engine_type)
    }

    pub fn assertion(&self, class_name: &str) -> Option<&Arc<dyn AssertionCheck>> {
        self.assertions.get(class_name)
    }

    pub fn script_runner(&self) -> Option<&Arc<dyn ScriptRunner>> {
        self.script_runner.as_ref()
    }

    pub fn trace_cache(&self) -> Option<&Arc<dyn TraceCache>> {
        self.trace_cache.as_ref()
    }

    /// Find the backend and operation for an action from the terminal link of
    /// its metadata chain. A gap here is a configuration error.
    pub fn resolve_action<'a>(
        &self,
        action: &'a Action,
    ) -> Result<(Arc<dyn SubEngine>, &'a MetaData, &'a str)> {
        let terminal = action.metadata.last().ok_or_else(|| {
            EngineError::Configuration(format!("Action '{}' has no metadata", action.name))
        })?;
        let engine = self.sub_engine(&terminal.engine).ok_or_else(|| {
            EngineError::Configuration(format!(
                "No sub-engine registered for type '{}'",
                terminal.engine
            ))
        })?;
        let operation = terminal.operation.as_deref().ok_or_else(|| {
            EngineError::Configuration(format!(
                "Metadata '{}' of action '{}' declares no operation",
                terminal.name, action.name
            ))
        })?;
        Ok((engine.clone(), terminal, operation))
    }
}

/* ===================== Built-in Capabilities ===================== */

/// Logs the operation and echoes its properties back. Fails when a BOOLEAN
/// property named `fail` is true.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEngine;

#[async_trait]
impl SubEngine for LogEngine {
    async fn execute(
        &self,
        request: ActionRequest<'_>,
        context: &TestContext,
    ) -> Result<ActionResponse> {
        info!(
            action = %request.action,
            operation = %request.operation,
            properties = request.properties.len(),
            user = context.user().unwrap_or("-"),
            "log engine"
        );

        let fail = request
            .properties
            .iter()
            .any(|p| p.name == "fail" && p.value == PropertyValue::Boolean(Some(true)));
        if fail {
            return Ok(ActionResponse::failed(request.action, "Requested failure"));
        }

        let mut response = ActionResponse::passed(request.action);
        response.return_properties = request.properties.to_vec();
        Ok(response)
    }
}

/// Fails when the property is absent or null
#[derive(Debug, Default, Clone, Copy)]
pub struct NotNullAssertion;

impl AssertionCheck for NotNullAssertion {
    fn execute_assertion(&self, property: Option<&Property>) -> Result<()> {
        match property {
            Some(p) if !p.is_null() => Ok(()),
            Some(p) => Err(EngineError::Assertion(format!("Property '{}' is null", p.name))),
            None => Err(EngineError::Assertion("Property is missing".to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryTraceCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryTraceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, id: impl Into<String>, content: Vec<u8>) {
        self.entries.lock().insert(id.into(), content);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TraceCache for MemoryTraceCache {
    fn get(&self, id: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(id).cloned()
    }

    fn remove(&self, id: &str) -> Option<Vec<u8>> {
        self.entries.lock().remove(id)
    }
}

impl<T: TraceCache + ?Sized> TraceCache for Arc<T> {
    fn get(&self, id: &str) -> Option<Vec<u8>> {
        (**self).get(id)
    }

    fn remove(&self, id: &str) -> Option<Vec<u8>> {
        (**self).remove(id)
    }
}
