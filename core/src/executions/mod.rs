// Execution management module
//
// This module handles everything tied to a single run:
// - The job lifecycle controller (pause, resume, interrupt, cancellable sleep)
// - The TestExecutionJob driver (prepare, execute, finalize)

mod job;
mod lifecycle;

// Re-export public API
pub use job::{JobListener, TestExecutionJob};
pub use lifecycle::JobControl;
