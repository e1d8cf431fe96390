//! Script list driver and node dispatch

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error, warn};

use super::Interpreter;
use crate::context::TestContext;
use crate::error::{Abort, EngineError, Flow, Interrupted, Visit};
use crate::model::configuration::sort_by_order;
use crate::model::{ElementKind, ScriptElement, TestScript, TestScriptResult};
use crate::types::ResultStatus;

impl Interpreter {
    /// Run one script into its own result.
    ///
    /// The returned result is always complete: PASSED, FAILED with the error
    /// message, or ABORTED when the run was interrupted. The interruption
    /// itself is handed back next to it so the caller can keep unwinding.
    pub fn run_script<'a>(
        &'a self,
        script: &'a TestScript,
        ctx: &'a mut TestContext,
    ) -> BoxFuture<'a, (TestScriptResult, Result<(), Interrupted>)> {
        async move {
            let mut result = TestScriptResult::new(script.id.clone(), script.name.clone());
            ctx.enter_script(&script.name);
            debug!(script = %script.name, "Script started");

            let outcome = self.visit_elements(&script.elements, ctx, &mut result).await;
            match outcome {
                Ok(flow) => {
                    if flow == Flow::Break {
                        debug!(script = %script.name, "Loop break outside of a loop ignored");
                    }
                    result.complete(ResultStatus::Passed, None);
                    (result, Ok(()))
                }
                Err(Abort::Failed(e)) => {
                    match &e {
                        EngineError::Internal(_) => {
                            error!(script = %script.name, error = %e, "Unexpected error in script")
                        }
                        _ => warn!(script = %script.name, error = %e, "Script failed"),
                    }
                    result.complete(ResultStatus::Failed, Some(e.to_string()));
                    (result, Ok(()))
                }
                Err(Abort::Interrupted) => {
                    debug!(script = %script.name, "Script aborted");
                    result.complete(ResultStatus::Aborted, Some("Execution interrupted".to_string()));
                    (result, Err(Interrupted))
                }
            }
        }
        .boxed()
    }

    /// Visit siblings in ascending order; the first failure or break stops
    /// the list
    pub(crate) fn visit_elements<'a>(
        &'a self,
        elements: &'a [ScriptElement],
        ctx: &'a mut TestContext,
        out: &'a mut TestScriptResult,
    ) -> BoxFuture<'a, Visit> {
        async move {
            let mut ordered: Vec<&ScriptElement> = elements.iter().collect();
            sort_by_order(&mut ordered, |e| e.order);

            for element in ordered {
                if self.visit_element(element, ctx, out).await? == Flow::Break {
                    return Ok(Flow::Break);
                }
            }
            Ok(Flow::Next)
        }
        .boxed()
    }

    async fn visit_element(
        &self,
        element: &ScriptElement,
        ctx: &mut TestContext,
        out: &mut TestScriptResult,
    ) -> Visit {
        ctx.checkpoint().await?;
        ctx.enter_element(format!("{} {}", element.kind.name(), element.id));

        match &element.kind {
            ElementKind::Logger(node) => self.visit_logger(node, ctx, out),
            ElementKind::TextMessage(node) => self.visit_text_message(node, ctx, out),
            ElementKind::Condition(node) => self.visit_condition(node, ctx, out).await,
            ElementKind::Execution(node) => self.visit_elements(&node.children, ctx, out).await,
            ElementKind::Action(node) => self.visit_action(node, ctx, out).await,
            ElementKind::Assertion(node) => self.visit_assertion(node, ctx),
            ElementKind::Loop(node) => self.visit_loop(node, ctx, out).await,
            ElementKind::Foreach(node) => self.visit_foreach(node, ctx, out).await,
            ElementKind::BreakLoop(node) => Ok(self.visit_break(node, ctx)),
            ElementKind::Lock(node) => self.visit_lock(node, ctx, out).await,
            ElementKind::PropertyAction(node) => self.visit_property_action(node, ctx),
            ElementKind::TestScript(node) => self.visit_embedded_script(&node.script, ctx, out).await,
            ElementKind::Function(node) => self.visit_function(node, ctx, out).await,
        }
    }
}
