//! Property Store for one run
//!
//! The context is owned by the run's execution task and mutated by every
//! interpreter node. The cursor is shared with the job so status queries can
//! report where the run currently is.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::error::{EngineError, Interrupted, Result};
use crate::executions::JobControl;
use crate::model::Property;

/// Where the run currently is
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cursor {
    pub script: Option<String>,
    pub element: Option<String>,
}

#[derive(Debug, Default)]
pub struct TestContext {
    properties: HashMap<String, Property>,
    cursor: Arc<Mutex<Cursor>>,
    control: Option<Arc<JobControl>>,
    tracing_enabled: bool,
    user: Option<String>,
    engine_settings: HashMap<String, JsonValue>,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            tracing_enabled: true,
            ..Default::default()
        }
    }

    pub fn with_properties(properties: impl IntoIterator<Item = Property>) -> Self {
        let mut context = Self::new();
        context.merge(properties);
        context
    }

    /* ===================== Properties ===================== */

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Store under the property's own name, replacing any previous cell
    pub fn insert(&mut self, property: Property) -> Option<Property> {
        self.properties.insert(property.name.clone(), property)
    }

    pub fn remove(&mut self, name: &str) -> Option<Property> {
        self.properties.remove(name)
    }

    pub fn merge(&mut self, properties: impl IntoIterator<Item = Property>) {
        for property in properties {
            self.insert(property);
        }
    }

    /// Merge as `<scope>.<name>`; unscoped when `scope` is empty
    pub fn merge_scoped(&mut self, scope: &str, properties: impl IntoIterator<Item = Property>) {
        for property in properties {
            if scope.is_empty() {
                self.insert(property);
            } else {
                let name = format!("{}.{}", scope, property.name);
                self.insert(property.renamed(name));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Follow `property.reference`, type-checked against the property's own type
    pub fn resolve(&self, property: &Property) -> Result<Property> {
        let Some(target) = property.reference.as_deref() else {
            return Ok(property.clone());
        };
        let source = self.get(target).ok_or_else(|| {
            EngineError::Property(format!(
                "Property '{}' references unknown property '{}'",
                property.name, target
            ))
        })?;
        if source.kind() != property.kind() {
            return Err(EngineError::Property(format!(
                "Property '{}' expects {:?} but '{}' is {:?}",
                property.name,
                property.kind(),
                target,
                source.kind()
            )));
        }
        Ok(Property::new(property.name.clone(), source.value.clone()))
    }

    pub fn resolve_all(&self, properties: &[Property]) -> Result<Vec<Property>> {
        properties.iter().map(|p| self.resolve(p)).collect()
    }

    /* ===================== Run State ===================== */

    pub fn attach_control(&mut self, control: Arc<JobControl>) {
        self.control = Some(control);
    }

    pub fn control(&self) -> Option<&Arc<JobControl>> {
        self.control.as_ref()
    }

    /// Pause/interrupt check; a no-op for contexts outside a job
    pub async fn checkpoint(&self) -> std::result::Result<(), Interrupted> {
        match &self.control {
            Some(control) => control.checkpoint().await,
            None => Ok(()),
        }
    }

    /// Cancellable delay
    pub async fn sleep(&self, duration: Duration) {
        match &self.control {
            Some(control) => control.sleep(duration).await,
            None => tokio::time::sleep(duration).await,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor.lock().clone()
    }

    pub fn cursor_handle(&self) -> Arc<Mutex<Cursor>> {
        self.cursor.clone()
    }

    pub fn enter_script(&self, name: &str) {
        let mut cursor = self.cursor.lock();
        cursor.script = Some(name.to_string());
        cursor.element = None;
    }

    pub fn enter_element(&self, label: String) {
        self.cursor.lock().element = Some(label);
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracing_enabled
    }

    pub fn set_tracing_enabled(&mut self, enabled: bool) {
        self.tracing_enabled = enabled;
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn set_user(&mut self, user: Option<String>) {
        self.user = user;
    }

    /// Opaque per-backend configuration
    pub fn engine_settings(&self, engine: &str) -> Option<&JsonValue> {
        self.engine_settings.get(engine)
    }

    pub fn set_engine_settings(&mut self, engine: impl Into<String>, settings: JsonValue) {
        self.engine_settings.insert(engine.into(), settings);
    }
}
