//! Result tree
//!
//! `TestConfigurationResult` → `TestResult` (one per visited config element)
//! → `TestScriptResult` (one per executed script) → action responses and
//! nested script results. Config-level nodes are addressed by a path of child
//! indices from the root, which stays valid because results are only ever
//! appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::configuration::{SchemaElement, TestConfigElement, TestConfiguration};
use super::property::Property;
use super::script::LogLevel;
use crate::types::{ResultStatus, RunStatus};

/// Child indices from the root; the empty path is the root itself
pub type ResultPath = Vec<usize>;

fn millis_between(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> Option<i64> {
    start.map(|s| (end - s).num_milliseconds())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfigurationResult {
    pub configuration_id: String,
    pub name: String,
    pub run_status: RunStatus,
    pub status: Option<ResultStatus>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub results: Vec<TestResult>,
}

impl TestConfigurationResult {
    pub fn new(configuration: &TestConfiguration) -> Self {
        Self {
            configuration_id: configuration.id.clone(),
            name: configuration.name.clone(),
            run_status: RunStatus::Running,
            status: None,
            start: None,
            end: None,
            duration_ms: None,
            results: Vec::new(),
        }
    }

    /// Results directly below `path` (the root's own list for an empty path)
    pub fn children(&self, path: &[usize]) -> Option<&[TestResult]> {
        match path.split_first() {
            None => Some(&self.results),
            Some((first, rest)) => {
                let mut node = self.results.get(*first)?;
                for idx in rest {
                    node = node.results.get(*idx)?;
                }
                Some(&node.results)
            }
        }
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<&mut TestResult> {
        let (first, rest) = path.split_first()?;
        let mut node = self.results.get_mut(*first)?;
        for idx in rest {
            node = node.results.get_mut(*idx)?;
        }
        Some(node)
    }

    /// Append below `parent` and return the new node's path
    pub fn append(&mut self, parent: &[usize], result: TestResult) -> Option<ResultPath> {
        let list = if parent.is_empty() {
            &mut self.results
        } else {
            &mut self.node_mut(parent)?.results
        };
        list.push(result);
        let mut path = parent.to_vec();
        path.push(list.len() - 1);
        Some(path)
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.end = Some(now);
        self.duration_ms = millis_between(self.start, now);
        self.roll_up();
    }

    /// FAILED if any top-level result failed, otherwise PASSED if unset
    pub fn roll_up(&mut self) {
        if self
            .results
            .iter()
            .any(|r| r.status.map_or(false, |s| s.is_failure()))
        {
            self.status = Some(ResultStatus::Failed);
        } else if self.status.is_none() {
            self.status = Some(ResultStatus::Passed);
        }
    }

    pub fn for_each_trace_mut(&mut self, f: &mut dyn FnMut(&mut Trace)) {
        for result in &mut self.results {
            result.for_each_trace_mut(f);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub element_id: String,
    pub name: String,
    pub level: u32,
    pub schema_id: Option<String>,
    pub status: Option<ResultStatus>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub results: Vec<TestResult>,
    pub script_results: Vec<TestScriptResult>,
    pub manual: Option<ManualResult>,
}

impl TestResult {
    /// Seeded from the element and, when present, its schema
    pub fn new(element: &TestConfigElement, schema: Option<&SchemaElement>) -> Self {
        Self {
            element_id: element.id.clone(),
            name: element.name.clone(),
            level: schema.map(|s| s.level).unwrap_or_default(),
            schema_id: schema.map(|s| s.id.clone()),
            status: None,
            start: Some(Utc::now()),
            end: None,
            duration_ms: None,
            error_message: None,
            results: Vec::new(),
            script_results: Vec::new(),
            manual: None,
        }
    }

    pub fn skip(&mut self, message: impl Into<String>) {
        self.status = Some(ResultStatus::Skipped);
        self.error_message = Some(message.into());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = Some(ResultStatus::Failed);
        self.error_message = Some(message.into());
    }

    pub fn is_skipped(&self) -> bool {
        self.status == Some(ResultStatus::Skipped)
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.end = Some(now);
        self.duration_ms = millis_between(self.start, now);
        self.roll_up();
    }

    /// Children are rolled up before their parent, so looking one level
    /// down covers every descendant.
    pub fn roll_up(&mut self) {
        if self.is_skipped() {
            return;
        }
        let child_failed = self
            .results
            .iter()
            .any(|r| r.status.map_or(false, |s| s.is_failure()));
        let script_failed = self
            .script_results
            .iter()
            .any(|s| s.status.map_or(false, |s| s.is_failure()));

        if child_failed || script_failed {
            self.status = Some(ResultStatus::Failed);
        } else if self.status.is_none() {
            self.status = Some(ResultStatus::Passed);
        }
    }

    fn for_each_trace_mut(&mut self, f: &mut dyn FnMut(&mut Trace)) {
        for script in &mut self.script_results {
            script.for_each_trace_mut(f);
        }
        for child in &mut self.results {
            child.for_each_trace_mut(f);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestScriptResult {
    pub script_id: String,
    pub name: String,
    pub status: Option<ResultStatus>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub log: Vec<LogEntry>,
    pub elements: Vec<ElementResult>,
}

impl TestScriptResult {
    pub fn new(script_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            script_id: script_id.into(),
            name: name.into(),
            status: None,
            start: Some(Utc::now()),
            end: None,
            duration_ms: None,
            error_message: None,
            log: Vec::new(),
            elements: Vec::new(),
        }
    }

    /// Stamp end time and verdict
    pub fn complete(&mut self, status: ResultStatus, error_message: Option<String>) {
        let now = Utc::now();
        self.status = Some(status);
        self.error_message = error_message;
        self.end = Some(now);
        self.duration_ms = millis_between(self.start, now);
    }

    pub fn is_failed(&self) -> bool {
        self.status.map_or(false, |s| s.is_failure())
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionResponse> {
        self.elements.iter().filter_map(|e| match e {
            ElementResult::Action(a) => Some(a),
            ElementResult::Script(_) => None,
        })
    }

    fn for_each_trace_mut(&mut self, f: &mut dyn FnMut(&mut Trace)) {
        for element in &mut self.elements {
            match element {
                ElementResult::Action(response) => {
                    for trace in &mut response.traces {
                        f(trace);
                    }
                }
                ElementResult::Script(nested) => nested.for_each_trace_mut(f),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementResult {
    Action(ActionResponse),
    Script(TestScriptResult),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub user: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    #[default]
    Passed,
    Failed,
}

/// What a sub-engine returns for one action
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActionResponse {
    pub action: String,
    pub status: ActionStatus,
    pub error_message: Option<String>,
    pub return_properties: Vec<Property>,
    pub traces: Vec<Trace>,
    pub delay_ms: Option<u64>,
}

impl ActionResponse {
    pub fn passed(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn failed(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: ActionStatus::Failed,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceKind {
    Screenshot,
    File,
}

/// Large payload attached to an action response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub kind: TraceKind,
    pub name: String,

    /// Content lives in the trace cache until the run reaches a terminal status
    pub deferred: bool,

    pub content: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManualStatus {
    Waiting,
    Finished,
    Aborted,
}

/// Outcome of a manually executed config element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualResult {
    pub status: ManualStatus,

    /// Tester's verdict; PASSED when a finished result leaves it out
    #[serde(default)]
    pub verdict: Option<ResultStatus>,

    #[serde(default)]
    pub comment: Option<String>,

    #[serde(default)]
    pub tester: Option<String>,
}

impl ManualResult {
    pub fn waiting() -> Self {
        Self {
            status: ManualStatus::Waiting,
            verdict: None,
            comment: None,
            tester: None,
        }
    }
}

/// External input delivered to a job through `set_client_interaction`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientInteraction {
    #[serde(default)]
    pub manual_result: Option<ManualResult>,
}
