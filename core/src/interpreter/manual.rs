//! Manual result handshake
//!
//! A MANUAL leaf element has no scripts to run. The run parks as WAITING on
//! the job controller until a client delivers a `ClientInteraction`.

use chrono::Utc;
use tracing::{info, warn};

use super::{Interpreter, ResultHandle};
use crate::context::TestContext;
use crate::error::Interrupted;
use crate::model::{ManualResult, ManualStatus, TestConfigElement};
use crate::types::{ResultStatus, RunStatus};

impl Interpreter {
    pub(crate) async fn await_manual_result(
        &self,
        element: &TestConfigElement,
        ctx: &TestContext,
        results: &ResultHandle,
        path: &[usize],
    ) -> Result<(), Interrupted> {
        let Some(control) = ctx.control().cloned() else {
            warn!(element = %element.name, "Manual element outside of a job");
            if let Some(node) = results.lock().node_mut(path) {
                node.fail("Manual element cannot run without a job");
            }
            return Ok(());
        };

        {
            let mut tree = results.lock();
            tree.run_status = RunStatus::Waiting;
            if let Some(node) = tree.node_mut(path) {
                node.manual = Some(ManualResult::waiting());
                node.start = Some(Utc::now());
            }
        }
        info!(element = %element.name, "Waiting for manual result");

        control.begin_interaction();
        let received = control.await_interaction().await;

        let aborted = {
            let mut tree = results.lock();
            if tree.run_status == RunStatus::Waiting {
                tree.run_status = RunStatus::Running;
            }
            let Some(node) = tree.node_mut(path) else {
                return received.map(|_| ());
            };
            let input = match received {
                Ok(input) => input,
                Err(interrupted) => {
                    node.fail("Manual execution interrupted");
                    return Err(interrupted);
                }
            };
            match input.and_then(|i| i.manual_result) {
                Some(manual) if manual.status == ManualStatus::Finished => {
                    info!(element = %element.name, verdict = ?manual.verdict, "Manual result received");
                    node.status = Some(manual.verdict.unwrap_or(ResultStatus::Passed));
                    node.error_message = manual.comment.clone();
                    node.manual = Some(manual);
                    false
                }
                Some(manual) if manual.status == ManualStatus::Aborted => {
                    node.fail("Manual execution aborted");
                    node.manual = Some(manual);
                    tree.run_status = RunStatus::Cancelled;
                    true
                }
                Some(manual) => {
                    node.fail(format!("Manual result is still {:?}", manual.status));
                    false
                }
                None => {
                    node.fail("No manual result received");
                    false
                }
            }
        };

        if aborted {
            warn!(element = %element.name, "Manual execution aborted, interrupting run");
            control.interrupt();
        }
        Ok(())
    }
}
