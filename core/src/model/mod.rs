//! Data model shared by the interpreters, the job driver, and the service

pub mod configuration;
pub mod property;
pub mod result;
pub mod script;

pub use configuration::{
    DependencyAlgorithm, ExecutionType, SchemaElement, ScriptPolicy, TestConfigElement,
    TestConfiguration,
};
pub use property::{Property, PropertyType, PropertyValue, DATE_FORMAT};
pub use result::{
    ActionResponse, ActionStatus, ClientInteraction, ElementResult, LogEntry, ManualResult,
    ManualStatus, ResultPath, TestConfigurationResult, TestResult, TestScriptResult, Trace,
    TraceKind,
};
pub use script::{ElementKind, LogLevel, Operator, ScriptElement, TestScript};
