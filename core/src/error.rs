//! Error types for the execution engine
//!
//! Node-local failures are `EngineError`s. The two control signals of the
//! interpreter are kept apart from them: a loop-break travels as a value
//! (`Flow::Break`) and an interruption travels as `Abort::Interrupted`, which
//! every frame hands back to its caller unchanged.

use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A job is already active, or the worker pool refused the submission
    #[error("Execution rejected: {0}")]
    Rejected(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Missing schema, metadata, or operation mapping
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unresolved or type-mismatched property reference
    #[error("Property error: {0}")]
    Property(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    /// Lock timeout
    #[error("Synchronization error: {0}")]
    Synchronization(String),

    #[error("Property action failed: {0}")]
    PropertyAction(String),

    #[error("Test script failed: {0}")]
    TestScript(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Raised once an interrupt request has been observed at a checkpoint.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Execution interrupted")]
pub struct Interrupted;

/// Why a visitor stopped early.
#[derive(Debug, Clone, PartialEq)]
pub enum Abort {
    /// Unwinds the whole run; never recorded as a node failure
    Interrupted,
    Failed(EngineError),
}

impl From<EngineError> for Abort {
    fn from(e: EngineError) -> Self {
        Abort::Failed(e)
    }
}

impl From<Interrupted> for Abort {
    fn from(_: Interrupted) -> Self {
        Abort::Interrupted
    }
}

/// Outcome of a non-failing visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Next,
    /// Consumed by the nearest enclosing Loop/Foreach
    Break,
}

/// What every interpreter visitor returns
pub type Visit = std::result::Result<Flow, Abort>;
