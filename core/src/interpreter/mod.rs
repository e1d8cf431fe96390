//! Test configuration and test script interpreters
//!
//! One `Interpreter` per service, shared by every job it runs. The config
//! visitor walks the element tree and hands each element's scripts to the
//! script visitor. Both call the job's checkpoint at every node boundary.
//!
//! Module layout:
//! - `condition`: standalone condition evaluator
//! - `config`: config element visitor with skip and dependency policy
//! - `manual`: manual result handshake for MANUAL leaf elements
//! - `script`: script list driver and node dispatch
//! - `control_flow`: Condition, Loop, Foreach, BreakLoop, Lock
//! - `actions`: Action, Assertion, Function, embedded scripts
//! - `properties`: PropertyAction, Logger, TextMessage

pub mod condition;

mod actions;
mod config;
mod control_flow;
mod manual;
mod properties;
mod script;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::engines::EngineRegistry;
use crate::model::TestConfigurationResult;
use crate::sync::SyncRegistry;

pub use condition::{evaluate, ConditionError};

/// Shared handle to a run's result tree; readers take snapshots
pub type ResultHandle = Arc<Mutex<TestConfigurationResult>>;

/// Iteration cap of a Loop bounded only by duration
pub const DURATION_LOOP_ITERATION_CAP: u32 = 1000;

pub const DEFAULT_ASSERTION_MESSAGE: &str = "Assertion failed";

#[derive(Debug, Clone)]
pub struct Interpreter {
    engines: Arc<EngineRegistry>,
    sync: Arc<SyncRegistry>,
    lock_timeout: Duration,
}

impl Interpreter {
    pub fn new(engines: Arc<EngineRegistry>, sync: Arc<SyncRegistry>, lock_timeout: Duration) -> Self {
        Self {
            engines,
            sync,
            lock_timeout,
        }
    }

    pub fn engines(&self) -> &Arc<EngineRegistry> {
        &self.engines
    }

    pub fn sync(&self) -> &Arc<SyncRegistry> {
        &self.sync
    }
}
