//! Config element visitor
//!
//! Each element gets a `TestResult` appended below its parent's result before
//! its scripts and children run, so a snapshot taken mid-run already shows
//! where the run is. Dependency checks read sibling results from the same
//! tree: siblings run strictly in order, so every predecessor's result is
//! final by the time the next element is visited.

use std::collections::HashMap;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error, info, warn, Instrument};

use super::{Interpreter, ResultHandle};
use crate::context::TestContext;
use crate::error::Interrupted;
use crate::model::configuration::sort_by_order;
use crate::model::{
    DependencyAlgorithm, Property, ResultPath, SchemaElement, ScriptPolicy, TestConfigElement,
    TestConfiguration, TestResult, TestScript,
};
use crate::types::ResultStatus;

impl Interpreter {
    /// Walk a whole configuration. Only an interruption ends the walk early.
    pub async fn run_configuration(
        &self,
        configuration: &mut TestConfiguration,
        ctx: &mut TestContext,
        results: &ResultHandle,
    ) -> Result<(), Interrupted> {
        ctx.checkpoint().await?;

        ctx.insert(Property::string("configuration", configuration.name.clone()));
        if let Some(environment) = &configuration.environment {
            ctx.insert(Property::string("environment", environment.clone()));
        }
        if let Some(release) = &configuration.release {
            ctx.insert(Property::string("release", release.clone()));
        }
        {
            let mut tree = results.lock();
            if tree.start.is_none() {
                tree.start = Some(Utc::now());
            }
        }

        for i in ordered(&configuration.elements, |e| e.order) {
            self.visit_config_element(&mut configuration.elements[i], ctx, results, Vec::new())
                .await?;
        }
        Ok(())
    }

    fn visit_config_element<'a>(
        &'a self,
        element: &'a mut TestConfigElement,
        ctx: &'a mut TestContext,
        results: &'a ResultHandle,
        parent: ResultPath,
    ) -> BoxFuture<'a, Result<(), Interrupted>> {
        let span = tracing::info_span!("element", name = %element.name);
        async move {
            ctx.checkpoint().await?;

            let Some(schema) = element.schema.clone() else {
                error!(element = %element.name, "Element has no schema element");
                let mut result = TestResult::new(element, None);
                result.fail(format!("Element '{}' has no schema element", element.name));
                record(results, &parent, result);
                return Ok(());
            };
            let mut result = TestResult::new(element, Some(&schema));

            if schema.skippable && element.skip {
                info!(element = %element.name, "Element skipped");
                result.skip(format!("Element '{}' is marked to be skipped", element.name));
                record(results, &parent, result);
                return Ok(());
            }

            if schema.dependency_check && !parent.is_empty() {
                if let Some(reason) = dependency_failure(element, &schema, results, &parent) {
                    info!(element = %element.name, reason = %reason, "Element skipped by dependency check");
                    element.skip = true;
                    result.skip(reason);
                    record(results, &parent, result);
                    element.skip = false;
                    return Ok(());
                }
            }

            if schema.property_container {
                ctx.merge(element.properties.iter().cloned());
            }

            let Some(path) = results.lock().append(&parent, result) else {
                error!(element = %element.name, "Parent result missing");
                return Ok(());
            };

            let outcome = self.visit_config_body(element, &schema, ctx, results, &path).await;

            if let Some(node) = results.lock().node_mut(&path) {
                if outcome.is_err() && node.status.is_none() {
                    node.fail("Execution interrupted");
                }
                node.finish(Utc::now());
            }
            outcome
        }
        .instrument(span)
        .boxed()
    }

    async fn visit_config_body(
        &self,
        element: &mut TestConfigElement,
        schema: &SchemaElement,
        ctx: &mut TestContext,
        results: &ResultHandle,
        path: &[usize],
    ) -> Result<(), Interrupted> {
        if element.is_manual_leaf() {
            return self.await_manual_result(element, ctx, results, path).await;
        }

        self.run_element_scripts(element, schema, ctx, results, path).await?;

        let skipped = results
            .lock()
            .node_mut(path)
            .map_or(false, |node| node.is_skipped());
        if skipped {
            return Ok(());
        }

        for i in ordered(&element.children, |e| e.order) {
            self.visit_config_element(&mut element.children[i], ctx, results, path.to_vec())
                .await?;
        }
        Ok(())
    }

    async fn run_element_scripts(
        &self,
        element: &TestConfigElement,
        schema: &SchemaElement,
        ctx: &mut TestContext,
        results: &ResultHandle,
        path: &[usize],
    ) -> Result<(), Interrupted> {
        if element.scripts.is_empty() {
            return Ok(());
        }
        match schema.scripts {
            ScriptPolicy::None => {
                warn!(element = %element.name, count = element.scripts.len(), "Scripts not permitted here, ignored");
                return Ok(());
            }
            ScriptPolicy::One if element.scripts.len() > 1 => {
                error!(element = %element.name, count = element.scripts.len(), "Only one script permitted");
                if let Some(node) = results.lock().node_mut(path) {
                    node.fail(format!(
                        "Configuration error: element '{}' permits one script but has {}",
                        element.name,
                        element.scripts.len()
                    ));
                }
                return Ok(());
            }
            _ => {}
        }

        let mut scripts: Vec<&TestScript> = element.scripts.iter().collect();
        sort_by_order(&mut scripts, |s| s.order);

        for script in scripts {
            let (script_result, outcome) = self.run_script(script, ctx).await;
            let failure = script_result
                .is_failed()
                .then(|| script_result.error_message.clone());

            if let Some(node) = results.lock().node_mut(path) {
                node.script_results.push(script_result);
                if let Some(message) = &failure {
                    node.status = Some(ResultStatus::Failed);
                    node.error_message = message.clone();
                }
            }
            outcome?;

            if failure.is_some() {
                debug!(element = %element.name, script = %script.name, "Remaining scripts not run");
                break;
            }
        }
        Ok(())
    }
}

/// Indices of `items` in visiting order
fn ordered<T>(items: &[T], order: impl Fn(&T) -> u32) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..items.len()).collect();
    sort_by_order(&mut indices, |&i| order(&items[i]));
    indices
}

/// Append a result that needs no further visiting
fn record(results: &ResultHandle, parent: &[usize], mut result: TestResult) {
    result.finish(Utc::now());
    if results.lock().append(parent, result).is_none() {
        error!("Parent result missing");
    }
}

/// Reason to skip `element`, if one of its dependencies did not pass.
/// Only elements below a parent result are checked.
fn dependency_failure(
    element: &TestConfigElement,
    schema: &SchemaElement,
    results: &ResultHandle,
    parent: &[usize],
) -> Option<String> {
    let tree = results.lock();
    let siblings = tree.children(parent)?;

    match schema.dependency_algorithm {
        DependencyAlgorithm::Default => {
            let predecessor = siblings.last()?;
            (predecessor.status != Some(ResultStatus::Passed)).then(|| {
                format!(
                    "Skipped because predecessor '{}' did not pass",
                    predecessor.name
                )
            })
        }
        DependencyAlgorithm::Custom => {
            let statuses: HashMap<&str, (&str, Option<ResultStatus>)> = siblings
                .iter()
                .map(|r| (r.element_id.as_str(), (r.name.as_str(), r.status)))
                .collect();
            element.dependencies.iter().find_map(|dependency| {
                match statuses.get(dependency.as_str()) {
                    Some((_, Some(ResultStatus::Passed))) => None,
                    Some((name, _)) => Some(format!(
                        "Skipped because dependency '{}' did not pass",
                        name
                    )),
                    None => Some(format!(
                        "Skipped because dependency '{}' has no result",
                        dependency
                    )),
                }
            })
        }
    }
}
