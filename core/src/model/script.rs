//! Test script AST
//!
//! A `TestScript` is an ordered container of `ScriptElement`s. The node kinds
//! form a closed set; interpreters match on `ElementKind` exhaustively.

use serde::{Deserialize, Serialize};

use super::property::{Property, PropertyType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestScript {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub order: u32,

    #[serde(default)]
    pub elements: Vec<ScriptElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptElement {
    #[serde(default)]
    pub id: String,

    /// Siblings are visited in ascending order
    #[serde(default)]
    pub order: u32,

    #[serde(flatten)]
    pub kind: ElementKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Logger(Logger),
    TextMessage(TextMessage),
    Condition(Condition),
    Execution(Execution),
    Action(Action),
    Assertion(Assertion),
    Loop(Loop),
    Foreach(Foreach),
    BreakLoop(BreakLoop),
    Lock(Lock),
    PropertyAction(PropertyAction),
    TestScript(EmbeddedScript),
    Function(Function),
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Logger(_) => "logger",
            ElementKind::TextMessage(_) => "text_message",
            ElementKind::Condition(_) => "condition",
            ElementKind::Execution(_) => "execution",
            ElementKind::Action(_) => "action",
            ElementKind::Assertion(_) => "assertion",
            ElementKind::Loop(_) => "loop",
            ElementKind::Foreach(_) => "foreach",
            ElementKind::BreakLoop(_) => "break_loop",
            ElementKind::Lock(_) => "lock",
            ElementKind::PropertyAction(_) => "property_action",
            ElementKind::TestScript(_) => "test_script",
            ElementKind::Function(_) => "function",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Joins its TextMessage children into one log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub children: Vec<ScriptElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextMessage {
    #[serde(default)]
    pub text: String,

    /// Appended in its string form when present in the context
    #[serde(default)]
    pub property: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    NotEquals,
    Gt,
    Gte,
    Lt,
    Lte,
    True,
    False,
    IsNull,
    NotNull,
    IsEmpty,
    NotEmpty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Name of the operand property
    pub property: String,

    pub operator: Operator,

    /// Literal comparand
    #[serde(default)]
    pub value: Option<String>,

    /// Comparand taken from another property's string form; wins over `value`
    #[serde(default)]
    pub value_property: Option<String>,

    #[serde(default)]
    pub children: Vec<ScriptElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    #[serde(default)]
    pub children: Vec<ScriptElement>,
}

/// One link of the chain describing an action's target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaData {
    pub name: String,

    /// Registered sub-engine type, e.g. "web" or "database"
    pub engine: String,

    #[serde(default)]
    pub operation: Option<String>,

    #[serde(default)]
    pub action_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub name: String,

    /// Target chain; the last entry selects engine and operation
    #[serde(default)]
    pub metadata: Vec<MetaData>,

    #[serde(default)]
    pub properties: Vec<Property>,

    #[serde(default)]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Assertion {
    /// Fail unconditionally
    #[serde(default)]
    pub fail: bool,

    #[serde(default)]
    pub message: Option<String>,

    /// Registered assertion capability to delegate to
    #[serde(default)]
    pub class_name: Option<String>,

    #[serde(default)]
    pub property: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Loop {
    #[serde(default)]
    pub max_iterations: u32,

    #[serde(default)]
    pub max_duration_ms: u64,

    /// INTEGER property bound to the iteration index
    #[serde(default)]
    pub index: Option<String>,

    #[serde(default)]
    pub wait_ms: u64,

    #[serde(default)]
    pub children: Vec<ScriptElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Foreach {
    /// LIST property to iterate
    pub list: String,

    /// Name each element is bound to while the body runs
    pub element: String,

    #[serde(default)]
    pub children: Vec<ScriptElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BreakLoop {
    /// Break when any guard holds; no guards means break unconditionally
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub name: String,

    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub children: Vec<ScriptElement>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyActionKind {
    Clear,
    Copy,
    Delete,
    Set,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyAction {
    pub action: PropertyActionKind,

    /// Target property
    pub property: String,

    /// COPY source
    #[serde(default)]
    pub source: Option<String>,

    /// SET literal
    #[serde(default)]
    pub value: Option<String>,

    /// Type used when SET creates a property that does not exist yet
    #[serde(default)]
    pub property_type: Option<PropertyType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedScript {
    pub script: TestScript,
}

/// Code handed to the scripting capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,

    pub source: String,

    #[serde(default)]
    pub properties: Vec<Property>,
}
