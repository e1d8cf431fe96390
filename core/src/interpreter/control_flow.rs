//! Condition, Loop, Foreach, BreakLoop and Lock nodes

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error};

use super::{evaluate, Interpreter, DURATION_LOOP_ITERATION_CAP};
use crate::context::TestContext;
use crate::error::{Abort, EngineError, Flow, Visit};
use crate::model::script::{BreakLoop, Condition, Foreach, Lock, Loop};
use crate::model::{Property, TestScriptResult};
use crate::sync::AcquireError;

impl Interpreter {
    /// Evaluate a guard against the context; evaluation errors count as false
    pub(crate) fn check(&self, condition: &Condition, ctx: &TestContext) -> bool {
        let operand = ctx.get(&condition.property);
        let comparand = match &condition.value_property {
            Some(name) => ctx.get(name).and_then(|p| p.as_string()),
            None => condition.value.clone(),
        };

        match evaluate(operand, condition.operator, comparand.as_deref()) {
            Ok(holds) => holds,
            Err(e) => {
                error!(property = %condition.property, error = %e, "Condition evaluation failed");
                false
            }
        }
    }

    pub(crate) async fn visit_condition(
        &self,
        node: &Condition,
        ctx: &mut TestContext,
        out: &mut TestScriptResult,
    ) -> Visit {
        if !self.check(node, ctx) {
            debug!(property = %node.property, operator = ?node.operator, "Condition not met");
            return Ok(Flow::Next);
        }
        self.visit_elements(&node.children, ctx, out).await
    }

    pub(crate) fn visit_break(&self, node: &BreakLoop, ctx: &TestContext) -> Flow {
        let triggered = node.conditions.is_empty() || node.conditions.iter().any(|c| self.check(c, ctx));
        if triggered {
            debug!("Loop break");
            Flow::Break
        } else {
            Flow::Next
        }
    }

    pub(crate) async fn visit_loop(
        &self,
        node: &Loop,
        ctx: &mut TestContext,
        out: &mut TestScriptResult,
    ) -> Visit {
        let limit = if node.max_iterations > 0 {
            node.max_iterations
        } else if node.max_duration_ms > 0 {
            DURATION_LOOP_ITERATION_CAP
        } else {
            debug!("Loop has no bound, skipping");
            return Ok(Flow::Next);
        };
        let deadline = (node.max_duration_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(node.max_duration_ms));
        let wait = Duration::from_millis(node.wait_ms);

        for iteration in 0..limit {
            if iteration > 0 && !wait.is_zero() {
                ctx.sleep(wait).await;
                ctx.checkpoint().await?;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                debug!(iteration, "Loop duration elapsed");
                break;
            }
            if let Some(index) = &node.index {
                ctx.insert(Property::integer(index.clone(), iteration as i32));
            }
            if self.visit_elements(&node.children, ctx, out).await? == Flow::Break {
                debug!(iteration, "Loop stopped by break");
                break;
            }
        }
        Ok(Flow::Next)
    }

    pub(crate) async fn visit_foreach(
        &self,
        node: &Foreach,
        ctx: &mut TestContext,
        out: &mut TestScriptResult,
    ) -> Visit {
        let list = ctx.get(&node.list).ok_or_else(|| {
            EngineError::Property(format!("Foreach list '{}' does not exist", node.list))
        })?;
        let items = list
            .items()
            .ok_or_else(|| {
                EngineError::Property(format!(
                    "Foreach list '{}' is {:?}, not LIST",
                    node.list,
                    list.kind()
                ))
            })?
            .to_vec();
        if ctx.contains(&node.element) {
            return Err(EngineError::Property(format!(
                "Foreach element name '{}' is already bound",
                node.element
            ))
            .into());
        }

        let mut outcome = Ok(Flow::Next);
        for item in items {
            ctx.insert(item.renamed(node.element.clone()));
            match self.visit_elements(&node.children, ctx, out).await {
                Ok(Flow::Next) => {}
                Ok(Flow::Break) => {
                    debug!(list = %node.list, "Foreach stopped by break");
                    break;
                }
                Err(abort) => {
                    outcome = Err(abort);
                    break;
                }
            }
        }
        ctx.remove(&node.element);
        outcome.map(|_| Flow::Next)
    }

    pub(crate) async fn visit_lock(
        &self,
        node: &Lock,
        ctx: &mut TestContext,
        out: &mut TestScriptResult,
    ) -> Visit {
        let timeout = node
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.lock_timeout);
        let cancel = ctx.control().map(|c| c.cancellation());

        let guard = match self
            .sync
            .acquire_cancellable(&node.name, timeout, cancel.as_ref())
            .await
        {
            Ok(guard) => guard,
            Err(AcquireError::TimedOut(e)) => return Err(e.into()),
            Err(AcquireError::Cancelled) => {
                ctx.checkpoint().await?;
                return Err(Abort::Interrupted);
            }
        };

        let flow = self.visit_elements(&node.children, ctx, out).await;
        drop(guard);
        flow
    }
}
