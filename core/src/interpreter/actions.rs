//! Nodes that reach outside the interpreter: Action, Assertion, Function,
//! and embedded scripts

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{Interpreter, DEFAULT_ASSERTION_MESSAGE};
use crate::context::TestContext;
use crate::engines::ActionRequest;
use crate::error::{Abort, EngineError, Flow, Visit};
use crate::model::script::{Action, Assertion, Function};
use crate::model::{ActionStatus, ElementResult, LogEntry, LogLevel, TestScript, TestScriptResult};

impl Interpreter {
    pub(crate) async fn visit_action(
        &self,
        node: &Action,
        ctx: &mut TestContext,
        out: &mut TestScriptResult,
    ) -> Visit {
        let (engine, terminal, operation) = self.engines.resolve_action(node)?;
        let properties = ctx.resolve_all(&node.properties)?;

        let request = ActionRequest {
            action: &node.name,
            operation,
            action_type: terminal.action_type.as_deref(),
            metadata: &node.metadata,
            properties: &properties,
        };
        debug!(action = %node.name, engine = %terminal.engine, operation, "Dispatching action");
        let mut response = unless_interrupted(ctx, engine.execute(request, ctx)).await??;

        response.delay_ms = node.delay_ms;
        if !ctx.tracing_enabled() {
            response.traces.clear();
        }
        if let Some(ms) = node.delay_ms {
            ctx.sleep(Duration::from_millis(ms)).await;
        }

        if response.status == ActionStatus::Failed {
            let message = response
                .error_message
                .clone()
                .unwrap_or_else(|| format!("Action '{}' failed", node.name));
            out.elements.push(ElementResult::Action(response));
            return Err(EngineError::TestScript(message).into());
        }

        ctx.merge_scoped(&node.name, response.return_properties.iter().cloned());
        out.elements.push(ElementResult::Action(response));
        Ok(Flow::Next)
    }

    pub(crate) fn visit_assertion(&self, node: &Assertion, ctx: &TestContext) -> Visit {
        let message = || {
            node.message
                .clone()
                .unwrap_or_else(|| DEFAULT_ASSERTION_MESSAGE.to_string())
        };
        if node.fail {
            return Err(EngineError::Assertion(message()).into());
        }

        let (Some(class_name), Some(name)) = (&node.class_name, &node.property) else {
            return Ok(Flow::Next);
        };
        let check = self.engines.assertion(class_name).ok_or_else(|| {
            EngineError::Assertion(format!("No assertion registered as '{}'", class_name))
        })?;
        let property = ctx.get(name).map(|p| ctx.resolve(p)).transpose()?;

        check.execute_assertion(property.as_ref()).map_err(|e| match e {
            EngineError::Assertion(_) => e,
            other => EngineError::Assertion(format!("{}: {}", message(), other)),
        })?;
        Ok(Flow::Next)
    }

    pub(crate) async fn visit_function(
        &self,
        node: &Function,
        ctx: &mut TestContext,
        out: &mut TestScriptResult,
    ) -> Visit {
        let runner = self
            .engines
            .script_runner()
            .cloned()
            .ok_or_else(|| EngineError::Configuration("No scripting capability registered".to_string()))?;
        let properties = ctx.resolve_all(&node.properties)?;

        let mut lines = Vec::new();
        let outcome = unless_interrupted(ctx, runner.run(node, properties, &mut lines)).await;

        let user = ctx.user().map(str::to_string);
        out.log.extend(lines.into_iter().map(|message| LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            user: user.clone(),
            message,
        }));

        let returned = outcome?.map_err(|e| match e {
            EngineError::TestScript(_) => e,
            other => EngineError::TestScript(format!("Function '{}': {}", node.name, other)),
        })?;
        ctx.merge_scoped(&node.name, returned);
        Ok(Flow::Next)
    }

    pub(crate) async fn visit_embedded_script(
        &self,
        script: &TestScript,
        ctx: &mut TestContext,
        out: &mut TestScriptResult,
    ) -> Visit {
        let (nested, outcome) = self.run_script(script, ctx).await;
        let failure = nested
            .is_failed()
            .then(|| nested.error_message.clone().unwrap_or_default());
        out.elements.push(ElementResult::Script(nested));
        outcome?;

        match failure {
            Some(message) => {
                warn!(script = %script.name, "Embedded script failed");
                Err(EngineError::TestScript(format!("Script '{}' failed: {}", script.name, message)).into())
            }
            None => Ok(Flow::Next),
        }
    }
}

/// Await a backend call unless the job is interrupted first
async fn unless_interrupted<T>(ctx: &TestContext, call: impl Future<Output = T>) -> Result<T, Abort> {
    let Some(token) = ctx.control().map(|control| control.cancellation()) else {
        return Ok(call.await);
    };
    tokio::select! {
        out = call => Ok(out),
        _ = token.cancelled() => {
            info!("Backend call abandoned on interrupt");
            Err(Abort::Interrupted)
        }
    }
}
