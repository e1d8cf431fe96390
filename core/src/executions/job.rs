//! TestExecutionJob driver
//!
//! `run()` is the top-level driver of one accepted submission:
//! prepare → execute → finalize. Whatever the execution does, the job ends in
//! a terminal status and finalize runs exactly once.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::lifecycle::JobControl;
use crate::context::{Cursor, TestContext};
use crate::error::Interrupted;
use crate::interpreter::{Interpreter, ResultHandle};
use crate::model::{TestConfiguration, TestConfigurationResult};
use crate::types::{ExecutionInfo, JobStatus, ResultStatus, RunStatus};

/// Completion callback, invoked once when a job reaches FINISHED or
/// INTERRUPTED
pub trait JobListener: Send + Sync {
    fn job_finished(&self, job_id: &str, status: JobStatus, result: &TestConfigurationResult);
}

/// Inputs consumed by the single execution of a job
struct Submission {
    configuration: TestConfiguration,
    context: TestContext,
}

pub struct TestExecutionJob {
    id: String,
    configuration_name: String,
    control: Arc<JobControl>,
    interpreter: Arc<Interpreter>,
    result: ResultHandle,
    cursor: Arc<Mutex<Cursor>>,
    submission: Mutex<Option<Submission>>,
    listeners: Mutex<Vec<Weak<dyn JobListener>>>,
    finalized: AtomicBool,
}

impl std::fmt::Debug for TestExecutionJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestExecutionJob")
            .field("id", &self.id)
            .field("configuration", &self.configuration_name)
            .field("status", &self.status())
            .finish()
    }
}

impl TestExecutionJob {
    pub fn new(
        id: impl Into<String>,
        configuration: TestConfiguration,
        mut context: TestContext,
        interpreter: Arc<Interpreter>,
    ) -> Self {
        let control = Arc::new(JobControl::new());
        context.attach_control(control.clone());

        Self {
            id: id.into(),
            configuration_name: configuration.name.clone(),
            control,
            interpreter,
            result: Arc::new(Mutex::new(TestConfigurationResult::new(&configuration))),
            cursor: context.cursor_handle(),
            submission: Mutex::new(Some(Submission {
                configuration,
                context,
            })),
            listeners: Mutex::new(Vec::new()),
            finalized: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.control.status()
    }

    pub fn control(&self) -> &Arc<JobControl> {
        &self.control
    }

    /// Copy of the result tree as it stands
    pub fn result(&self) -> TestConfigurationResult {
        self.result.lock().clone()
    }

    pub fn add_listener(&self, listener: Weak<dyn JobListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn info(&self) -> ExecutionInfo {
        let cursor = self.cursor.lock().clone();
        ExecutionInfo {
            id: self.id.clone(),
            configuration: self.configuration_name.clone(),
            status: self.control.status(),
            run_status: self.result.lock().run_status,
            started_at: self.control.started_at(),
            stopped_at: self.control.stopped_at(),
            current_script: cursor.script,
            current_element: cursor.element,
        }
    }

    /* ===================== Driver ===================== */

    /// Run to a terminal status and return it
    pub async fn run(&self) -> JobStatus {
        if !self.control.start() {
            warn!(job_id = %self.id, status = ?self.status(), "Job already started");
            return self.status();
        }
        info!(job_id = %self.id, configuration = %self.configuration_name, "Job started");

        self.prepare();

        let outcome = AssertUnwindSafe(self.execute()).catch_unwind().await;
        let status = match outcome {
            Ok(Ok(())) if self.control.is_interrupted() => {
                let _ = self.control.try_interruption();
                JobStatus::Interrupted
            }
            Ok(Ok(())) => JobStatus::Finished,
            Ok(Err(Interrupted)) => JobStatus::Interrupted,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(job_id = %self.id, panic = %message, "Job panicked");
                JobStatus::Interrupted
            }
        };

        self.finalize(status);
        status
    }

    /// Finish a job that was refused before it could run
    pub fn rejected(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.submission.lock().take();
        {
            let mut tree = self.result.lock();
            tree.run_status = RunStatus::Cancelled;
        }
        self.control.stop(JobStatus::Rejected);
        info!(job_id = %self.id, "Job rejected");
    }

    fn prepare(&self) {
        {
            let mut tree = self.result.lock();
            tree.start = Some(Utc::now());
            tree.run_status = RunStatus::Running;
        }

        let result = self.result.clone();
        let job_id = self.id.clone();
        self.control.on_abort(move || {
            result.lock().run_status = RunStatus::Cancelled;
            debug!(job_id = %job_id, "Run marked cancelled");
        });
    }

    async fn execute(&self) -> Result<(), Interrupted> {
        let Some(mut submission) = self.submission.lock().take() else {
            error!(job_id = %self.id, "Job has nothing to execute");
            return Ok(());
        };

        let span = info_span!("job", job_id = %self.id, configuration = %self.configuration_name);
        self.interpreter
            .run_configuration(&mut submission.configuration, &mut submission.context, &self.result)
            .instrument(span)
            .await
    }

    fn finalize(&self, status: JobStatus) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }

        let snapshot = {
            let mut tree = self.result.lock();
            tree.run_status = match status {
                JobStatus::Finished if tree.run_status != RunStatus::Cancelled => RunStatus::Finished,
                _ => RunStatus::Cancelled,
            };
            if status == JobStatus::Interrupted && tree.status.is_none() {
                tree.status = Some(ResultStatus::Failed);
            }
            tree.finish(Utc::now());
            if tree.run_status.is_terminal() {
                self.attach_traces(&mut tree);
            }
            tree.clone()
        };

        let listeners: Vec<_> = self.listeners.lock().drain(..).collect();
        for listener in listeners.iter().filter_map(Weak::upgrade) {
            listener.job_finished(&self.id, status, &snapshot);
        }

        self.control.stop(status);
        info!(
            job_id = %self.id,
            status = ?status,
            result = ?snapshot.status,
            duration_ms = snapshot.duration_ms,
            "Job finished"
        );
    }

    /// Fill deferred trace content from the trace cache
    fn attach_traces(&self, tree: &mut TestConfigurationResult) {
        let Some(cache) = self.interpreter.engines().trace_cache() else {
            return;
        };
        let mut attached = 0usize;
        tree.for_each_trace_mut(&mut |trace| {
            if !trace.deferred {
                return;
            }
            if let Some(content) = cache.remove(&trace.id) {
                trace.content = Some(content);
                trace.deferred = false;
                attached += 1;
            }
        });
        if attached > 0 {
            debug!(job_id = %self.id, attached, "Traces attached");
        }
    }
}
