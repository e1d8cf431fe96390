use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::context::TestContext;
use crate::error::{EngineError, Result};
use crate::executions::{JobListener, TestExecutionJob};
use crate::interpreter::Interpreter;
use crate::model::{ClientInteraction, TestConfiguration, TestConfigurationResult};
use crate::types::{ExecutionInfo, JobStatus};

/// Admission state; one critical section guards all of it
#[derive(Default)]
struct SchedulerState {
    busy: bool,
    jobs: HashMap<String, Arc<TestExecutionJob>>,
    results: HashMap<String, TestConfigurationResult>,
}

struct Scheduler {
    state: Mutex<SchedulerState>,
    pool: Arc<Semaphore>,
    interpreter: Arc<Interpreter>,
    config: EngineConfig,
}

impl JobListener for Scheduler {
    fn job_finished(&self, job_id: &str, status: JobStatus, result: &TestConfigurationResult) {
        let mut state = self.state.lock();
        state.results.insert(job_id.to_string(), result.clone());
        state.busy = false;
        info!(job_id, status = ?status, "Admission slot released");
    }
}

/// Service for submitting and steering test executions
///
/// At most one job is active at a time, whatever the worker pool size. The
/// job and result caches only hold the most recent submission.
#[derive(Clone)]
pub struct ExecutionService {
    inner: Arc<Scheduler>,
}

impl ExecutionService {
    pub fn new(config: EngineConfig, interpreter: Arc<Interpreter>) -> Self {
        Self {
            inner: Arc::new(Scheduler {
                state: Mutex::new(SchedulerState::default()),
                pool: Arc::new(Semaphore::new(config.worker_pool_size)),
                interpreter,
                config,
            }),
        }
    }

    /// Fresh context seeded from the engine configuration
    pub fn new_context(&self) -> TestContext {
        let config = &self.inner.config;
        let mut context = TestContext::new();
        context.set_tracing_enabled(config.tracing_enabled);
        context.set_user(config.user.clone());
        for (engine, settings) in &config.engine_settings {
            context.set_engine_settings(engine.clone(), settings.clone());
        }
        context
    }

    /// Admit and start a run; must be called within a tokio runtime
    ///
    /// Fails with `Rejected` while another job is active or when the worker
    /// pool has no free slot.
    pub fn start_execution(&self, configuration: TestConfiguration, context: TestContext) -> Result<String> {
        let mut state = self.inner.state.lock();
        if state.busy {
            warn!(configuration = %configuration.name, "Execution rejected, another job is active");
            return Err(EngineError::Rejected("Another execution is active".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let job = Arc::new(TestExecutionJob::new(
            id.clone(),
            configuration,
            context,
            self.inner.interpreter.clone(),
        ));
        let listener: Weak<dyn JobListener> = Arc::downgrade(&self.inner) as Weak<dyn JobListener>;
        job.add_listener(listener);

        state.jobs.clear();
        state.results.clear();
        state.jobs.insert(id.clone(), job.clone());

        let permit = match self.inner.pool.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                job.rejected();
                state.jobs.remove(&id);
                warn!(job_id = %id, "Execution rejected, worker pool saturated");
                return Err(EngineError::Rejected("Worker pool is saturated".to_string()));
            }
        };
        state.busy = true;
        drop(state);

        info!(job_id = %id, "Execution admitted");
        tokio::spawn(async move {
            let _permit = permit;
            job.run().await;
        });
        Ok(id)
    }

    fn job(&self, id: &str) -> Result<Arc<TestExecutionJob>> {
        self.inner
            .state
            .lock()
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::JobNotFound(id.to_string()))
    }

    /// Interrupt the run. The job unwinds at its next checkpoint, or at once
    /// if it is waiting on a backend call, and gives its worker slot back
    /// when the task ends.
    pub fn stop_execution(&self, id: &str) -> Result<()> {
        let job = self.job(id)?;
        job.control().interrupt();
        info!(job_id = %id, "Stop requested");
        Ok(())
    }

    pub fn pause_execution(&self, id: &str) -> Result<()> {
        self.job(id)?.control().pause();
        debug!(job_id = %id, "Pause requested");
        Ok(())
    }

    pub fn resume_execution(&self, id: &str) -> Result<()> {
        self.job(id)?.control().resume();
        debug!(job_id = %id, "Resume requested");
        Ok(())
    }

    pub fn get_job_status(&self, id: &str) -> Result<JobStatus> {
        Ok(self.job(id)?.status())
    }

    pub fn get_test_execution_info(&self, id: &str) -> Result<ExecutionInfo> {
        Ok(self.job(id)?.info())
    }

    /// Cached final result if the job completed, else a snapshot of the live
    /// one
    pub fn get_test_configuration_result(&self, id: &str) -> Result<TestConfigurationResult> {
        let job = {
            let state = self.inner.state.lock();
            if let Some(result) = state.results.get(id) {
                return Ok(result.clone());
            }
            state.jobs.get(id).cloned()
        };
        job.map(|job| job.result())
            .ok_or_else(|| EngineError::JobNotFound(id.to_string()))
    }

    /// Deliver external input and wake the run if it waits for it
    pub fn set_client_interaction(&self, id: &str, interaction: ClientInteraction) -> Result<()> {
        self.job(id)?.control().set_interaction(interaction);
        Ok(())
    }

    pub fn get_running_jobs(&self) -> Vec<ExecutionInfo> {
        self.inner
            .state
            .lock()
            .jobs
            .values()
            .filter(|job| job.status().is_active())
            .map(|job| job.info())
            .collect()
    }

    /// Wait until the job reaches a terminal status
    pub async fn wait_for_completion(&self, id: &str) -> Result<JobStatus> {
        let job = self.job(id)?;
        let mut status = job.control().subscribe();
        let terminal = status
            .wait_for(|s| s.is_terminal())
            .await
            .map(|s| *s)
            .map_err(|_| EngineError::Internal(format!("Status channel of job {} closed", id)))?;
        Ok(terminal)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::engines::EngineRegistry;
    use crate::model::{ManualResult, ManualStatus};
    use crate::sync::SyncRegistry;
    use crate::types::{ResultStatus, RunStatus};

    fn service(pool_size: usize) -> ExecutionService {
        service_with(pool_size, EngineRegistry::with_builtins())
    }

    fn service_with(pool_size: usize, engines: EngineRegistry) -> ExecutionService {
        let config = EngineConfig {
            worker_pool_size: pool_size,
            ..Default::default()
        };
        let interpreter = Arc::new(Interpreter::new(
            Arc::new(engines),
            Arc::new(SyncRegistry::new()),
            config.lock_timeout(),
        ));
        ExecutionService::new(config, interpreter)
    }

    /// One element whose script loops `iterations` times, one second apart
    fn slow_configuration(iterations: u32) -> TestConfiguration {
        serde_json::from_value(json!({
            "id": "c", "name": "slow",
            "elements": [{
                "id": "a", "name": "A", "schema": {"id": "leaf"},
                "scripts": [{"id": "s", "name": "s", "elements": [
                    {"type": "loop", "max_iterations": iterations, "wait_ms": 1000, "index": "i",
                     "children": [{"type": "text_message", "property": "i"}]}
                ]}]
            }]
        }))
        .unwrap()
    }

    async fn wait_for_status(service: &ExecutionService, id: &str, expected: JobStatus) {
        let job = service.job(id).unwrap();
        job.control()
            .subscribe()
            .wait_for(|s| *s == expected)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submission_is_rejected_until_first_completes() {
        let service = service(4);
        let first = service
            .start_execution(slow_configuration(3), service.new_context())
            .unwrap();

        let second = service.start_execution(slow_configuration(1), service.new_context());
        assert!(matches!(second, Err(EngineError::Rejected(_))));

        assert_eq!(service.wait_for_completion(&first).await.unwrap(), JobStatus::Finished);
        let result = service.get_test_configuration_result(&first).unwrap();
        assert_eq!(result.status, Some(ResultStatus::Passed));
        assert_eq!(result.run_status, RunStatus::Finished);

        let third = service
            .start_execution(slow_configuration(1), service.new_context())
            .unwrap();
        assert_ne!(first, third);
        assert!(matches!(
            service.get_job_status(&first),
            Err(EngineError::JobNotFound(_))
        ));
        assert_eq!(service.wait_for_completion(&third).await.unwrap(), JobStatus::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_progress_until_resume() {
        let service = service(1);
        let id = service
            .start_execution(slow_configuration(10), service.new_context())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        service.pause_execution(&id).unwrap();
        wait_for_status(&service, &id, JobStatus::Paused).await;

        let cursor_before = service.get_test_execution_info(&id).unwrap().current_element;
        tokio::time::sleep(Duration::from_secs(30)).await;
        let info = service.get_test_execution_info(&id).unwrap();
        assert_eq!(info.status, JobStatus::Paused);
        assert_eq!(info.current_element, cursor_before);
        assert_eq!(service.get_running_jobs().len(), 1);

        service.resume_execution(&id).unwrap();
        assert_eq!(service.wait_for_completion(&id).await.unwrap(), JobStatus::Finished);

        let result = service.get_test_configuration_result(&id).unwrap();
        assert_eq!(result.results[0].script_results[0].log.len(), 10);
        assert!(service.get_running_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_and_frees_slot() {
        let service = service(1);
        let id = service
            .start_execution(slow_configuration(100), service.new_context())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        service.stop_execution(&id).unwrap();
        assert_eq!(service.wait_for_completion(&id).await.unwrap(), JobStatus::Interrupted);

        let info = service.get_test_execution_info(&id).unwrap();
        assert_eq!(info.run_status, RunStatus::Cancelled);
        assert!(info.stopped_at.is_some());

        let result = service.get_test_configuration_result(&id).unwrap();
        assert_eq!(
            result.results[0].script_results[0].status,
            Some(ResultStatus::Aborted)
        );

        // The permit is returned when the task ends
        tokio::task::yield_now().await;
        let next = service.start_execution(slow_configuration(1), service.new_context());
        assert!(next.is_ok());
    }

    /// Backend that never answers
    struct HangingEngine;

    #[async_trait::async_trait]
    impl crate::engines::SubEngine for HangingEngine {
        async fn execute(
            &self,
            _request: crate::engines::ActionRequest<'_>,
            _context: &TestContext,
        ) -> Result<crate::model::ActionResponse> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_run_blocked_in_backend_call() {
        let service = service_with(1, EngineRegistry::new().with_engine("hang", HangingEngine));
        let configuration: TestConfiguration = serde_json::from_value(json!({
            "id": "c", "name": "hang",
            "elements": [{
                "id": "a", "name": "A", "schema": {"id": "leaf"},
                "scripts": [{"id": "s", "name": "s", "elements": [
                    {"type": "action", "name": "wait",
                     "metadata": [{"name": "wait", "engine": "hang", "operation": "wait"}]}
                ]}]
            }]
        }))
        .unwrap();
        let id = service.start_execution(configuration, service.new_context()).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(service.get_job_status(&id).unwrap(), JobStatus::Running);
        service.stop_execution(&id).unwrap();

        let status = tokio::time::timeout(Duration::from_secs(3600), service.wait_for_completion(&id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status, JobStatus::Interrupted);

        let result = service.get_test_configuration_result(&id).unwrap();
        assert_eq!(result.results[0].status, Some(ResultStatus::Failed));
        assert_eq!(
            result.results[0].script_results[0].status,
            Some(ResultStatus::Aborted)
        );

        tokio::task::yield_now().await;
        assert!(service
            .start_execution(slow_configuration(1), service.new_context())
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let service = service(1);
        assert!(matches!(service.pause_execution("nope"), Err(EngineError::JobNotFound(_))));
        assert!(matches!(
            service.get_test_configuration_result("nope"),
            Err(EngineError::JobNotFound(_))
        ));
        assert!(service.wait_for_completion("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_manual_interaction_through_service() {
        let service = service(1);
        let configuration: TestConfiguration = serde_json::from_value(json!({
            "id": "c", "name": "manual",
            "elements": [{"id": "m", "name": "Look", "execution_type": "MANUAL", "schema": {"id": "manual"}}]
        }))
        .unwrap();
        let id = service.start_execution(configuration, service.new_context()).unwrap();

        wait_for_status(&service, &id, JobStatus::Paused).await;
        assert_eq!(
            service.get_test_execution_info(&id).unwrap().run_status,
            RunStatus::Waiting
        );

        service
            .set_client_interaction(
                &id,
                ClientInteraction {
                    manual_result: Some(ManualResult {
                        status: ManualStatus::Finished,
                        verdict: None,
                        comment: None,
                        tester: Some("carol".to_string()),
                    }),
                },
            )
            .unwrap();

        assert_eq!(service.wait_for_completion(&id).await.unwrap(), JobStatus::Finished);
        let result = service.get_test_configuration_result(&id).unwrap();
        assert_eq!(result.results[0].status, Some(ResultStatus::Passed));
    }
}
