//! PropertyAction and the log nodes

use chrono::Utc;
use tracing::{debug, error, info, trace, warn};

use super::Interpreter;
use crate::context::TestContext;
use crate::error::{EngineError, Flow, Visit};
use crate::model::script::{Logger, PropertyAction, PropertyActionKind, TextMessage};
use crate::model::{ElementKind, LogEntry, LogLevel, Property, PropertyType, PropertyValue, TestScriptResult};

impl Interpreter {
    pub(crate) fn visit_property_action(&self, node: &PropertyAction, ctx: &mut TestContext) -> Visit {
        match node.action {
            PropertyActionKind::Clear => {
                let target = ctx
                    .get_mut(&node.property)
                    .ok_or_else(|| missing(&node.property))?;
                target.clear();
            }
            PropertyActionKind::Delete => {
                if ctx.remove(&node.property).is_none() {
                    debug!(property = %node.property, "Delete of an unknown property");
                }
            }
            PropertyActionKind::Copy => copy(node, ctx)?,
            PropertyActionKind::Set => set(node, ctx)?,
        }
        Ok(Flow::Next)
    }

    pub(crate) fn visit_logger(&self, node: &Logger, ctx: &TestContext, out: &mut TestScriptResult) -> Visit {
        let parts: Vec<String> = node
            .children
            .iter()
            .filter_map(|child| match &child.kind {
                ElementKind::TextMessage(text) => Some(render(text, ctx)),
                other => {
                    debug!(kind = other.name(), "Logger ignores non-text child");
                    None
                }
            })
            .filter(|part| !part.is_empty())
            .collect();
        emit(node.level, parts.join(" "), ctx, out);
        Ok(Flow::Next)
    }

    pub(crate) fn visit_text_message(
        &self,
        node: &TextMessage,
        ctx: &TestContext,
        out: &mut TestScriptResult,
    ) -> Visit {
        emit(LogLevel::Info, render(node, ctx), ctx, out);
        Ok(Flow::Next)
    }
}

fn missing(name: &str) -> EngineError {
    EngineError::PropertyAction(format!("Property '{}' does not exist", name))
}

fn copy(node: &PropertyAction, ctx: &mut TestContext) -> Result<(), EngineError> {
    let source_name = node.source.as_deref().ok_or_else(|| {
        EngineError::PropertyAction(format!("Copy to '{}' has no source", node.property))
    })?;
    let source = ctx.get(source_name).cloned().ok_or_else(|| missing(source_name))?;

    let Some(target) = ctx.get_mut(&node.property) else {
        ctx.insert(source.renamed(node.property.clone()));
        return Ok(());
    };
    if target.kind() != source.kind() {
        return Err(EngineError::PropertyAction(format!(
            "Cannot copy {:?} property '{}' into {:?} property '{}'",
            source.kind(),
            source_name,
            target.kind(),
            node.property
        )));
    }
    match (&mut target.value, source.value) {
        (PropertyValue::List(items), PropertyValue::List(appended)) => items.extend(appended),
        (value, copied) => *value = copied,
    }
    Ok(())
}

fn set(node: &PropertyAction, ctx: &mut TestContext) -> Result<(), EngineError> {
    let literal = node.value.as_deref().ok_or_else(|| {
        EngineError::PropertyAction(format!("Set of '{}' has no value", node.property))
    })?;

    if !ctx.contains(&node.property) {
        let kind = node.property_type.unwrap_or(PropertyType::String);
        ctx.insert(Property::new(node.property.clone(), PropertyValue::null_of(kind)));
    }
    let target = ctx
        .get_mut(&node.property)
        .ok_or_else(|| missing(&node.property))?;
    target
        .set_from_str(literal)
        .map_err(|e| EngineError::PropertyAction(format!("Cannot set '{}': {}", node.property, e)))
}

fn render(node: &TextMessage, ctx: &TestContext) -> String {
    let value = node
        .property
        .as_deref()
        .and_then(|name| ctx.get(name))
        .and_then(|p| p.as_string());
    match value {
        Some(value) if node.text.is_empty() => value,
        Some(value) => format!("{} {}", node.text, value),
        None => node.text.clone(),
    }
}

/// Append to the script log and write through `tracing`
fn emit(level: LogLevel, message: String, ctx: &TestContext, out: &mut TestScriptResult) {
    let user = ctx.user().unwrap_or("-");
    match level {
        LogLevel::Trace => trace!(user, "{}", message),
        LogLevel::Debug => debug!(user, "{}", message),
        LogLevel::Info => info!(user, "{}", message),
        LogLevel::Warn => warn!(user, "{}", message),
        LogLevel::Error => error!(user, "{}", message),
    }
    out.log.push(LogEntry {
        timestamp: Utc::now(),
        level,
        user: ctx.user().map(str::to_string),
        message,
    });
}
