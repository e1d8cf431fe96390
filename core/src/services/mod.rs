// Services layer
//
// Long-lived handles shared by the CLI and embedding applications.

mod execution_service;

pub use execution_service::ExecutionService;
