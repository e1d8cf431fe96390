pub mod application;
pub mod cli;
pub mod config;
pub mod context;
pub mod engines;
pub mod error;
pub mod executions;
pub mod interpreter;
pub mod model;
pub mod services;
pub mod sync;
pub mod types;

// Re-export main types
pub use types::*;

// Re-export the embedding API for convenience
pub use application::Application;
pub use config::EngineConfig;
pub use context::TestContext;
pub use engines::EngineRegistry;
pub use error::{EngineError, Result};
pub use services::ExecutionService;
