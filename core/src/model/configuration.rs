//! Test configuration tree
//!
//! A `TestConfiguration` is a tree of `TestConfigElement`s. Each element is
//! governed by a `SchemaElement` that decides whether it may carry scripts,
//! whether it may be skipped, and how its dependencies are checked.

use serde::{Deserialize, Serialize};

use super::property::Property;
use super::script::TestScript;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfiguration {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub release: Option<String>,

    #[serde(default)]
    pub elements: Vec<TestConfigElement>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionType {
    #[default]
    Automatic,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfigElement {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub order: u32,

    #[serde(default)]
    pub execution_type: ExecutionType,

    /// Set by the author, or transiently by a failed dependency check
    #[serde(default)]
    pub skip: bool,

    #[serde(default)]
    pub children: Vec<TestConfigElement>,

    #[serde(default)]
    pub scripts: Vec<TestScript>,

    /// Element ids checked by the custom dependency algorithm, in order
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub properties: Vec<Property>,

    #[serde(default)]
    pub schema: Option<SchemaElement>,
}

impl TestConfigElement {
    pub fn is_manual_leaf(&self) -> bool {
        self.execution_type == ExecutionType::Manual && self.children.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScriptPolicy {
    None,
    One,
    #[default]
    Many,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyAlgorithm {
    /// Result of the immediately preceding sibling
    #[default]
    Default,
    /// The element's explicit dependency list
    Custom,
}

/// Policy object attached to a config element; read-only during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaElement {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub level: u32,

    #[serde(default)]
    pub scripts: ScriptPolicy,

    #[serde(default)]
    pub skippable: bool,

    #[serde(default)]
    pub dependency_check: bool,

    #[serde(default)]
    pub dependency_algorithm: DependencyAlgorithm,

    /// Merge the element's properties into the context when visited
    #[serde(default)]
    pub property_container: bool,
}

/// Visit `items` in ascending `order`, keeping author order for ties
pub fn sort_by_order<T, F>(items: &mut [T], order: F)
where
    F: Fn(&T) -> u32,
{
    items.sort_by_key(|item| order(item));
}
