use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a TestExecutionJob
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Initialized,
    Running,
    Paused,
    Finished,
    Interrupted,
    Rejected,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Interrupted | JobStatus::Rejected
        )
    }

    /// Running or paused, i.e. holding the admission slot
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::Paused)
    }
}

/// Verdict of a TestResult or TestScriptResult
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Passed,
    Failed,
    Skipped,
    /// Script-level only: the script was cut short by an interruption
    Aborted,
}

impl ResultStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, ResultStatus::Failed | ResultStatus::Aborted)
    }
}

/// Status of the run as seen by a polling client
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    Running,
    /// Blocked on a manual interaction
    Waiting,
    Finished,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Finished | RunStatus::Cancelled)
    }
}

/// Snapshot returned by `get_test_execution_info` and `get_running_jobs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub id: String,
    pub configuration: String,
    pub status: JobStatus,
    pub run_status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub current_script: Option<String>,
    pub current_element: Option<String>,
}
