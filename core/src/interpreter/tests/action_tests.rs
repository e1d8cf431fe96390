use std::time::Duration;

use serde_json::json;

use super::helpers::*;
use crate::context::TestContext;
use crate::engines::EngineRegistry;
use crate::model::{Property, PropertyType};
use crate::types::ResultStatus;

fn recording() -> (RecordingEngine, crate::interpreter::Interpreter) {
    let engine = RecordingEngine::default();
    let interpreter = interpreter_with(EngineRegistry::with_builtins().with_engine("web", engine.clone()));
    (engine, interpreter)
}

#[tokio::test]
async fn test_action_merges_scoped_return_properties() {
    let (engine, interpreter) = recording();
    let script = script(json!([
        action("login", "web", "submit", json!([
            {"name": "user", "reference": "account", "type": "STRING", "value": null}
        ]))
    ]));
    let mut ctx = TestContext::with_properties(vec![Property::string("account", "alice")]);

    let result = run(&interpreter, &script, &mut ctx).await;
    assert_eq!(result.status, Some(ResultStatus::Passed));
    assert_eq!(*engine.calls.lock(), vec!["submit".to_string()]);
    assert_eq!(
        ctx.get("login.user").and_then(|p| p.as_string()).as_deref(),
        Some("alice")
    );

    let response = result.actions().next().unwrap();
    assert_eq!(response.traces.len(), 1);
}

#[tokio::test]
async fn test_action_reference_type_mismatch() {
    let (engine, interpreter) = recording();
    let script = script(json!([
        action("login", "web", "submit", json!([
            {"name": "user", "reference": "account", "type": "STRING", "value": null}
        ]))
    ]));
    let mut ctx = TestContext::with_properties(vec![Property::integer("account", 7)]);

    let result = run(&interpreter, &script, &mut ctx).await;
    assert_eq!(result.status, Some(ResultStatus::Failed));
    assert!(result.error_message.unwrap().starts_with("Property error"));
    assert!(engine.calls.lock().is_empty());
}

#[tokio::test]
async fn test_failed_action_fails_script() {
    let script = script(json!([
        {"order": 0, "type": "action", "name": "pay",
         "metadata": [{"name": "pay", "engine": "log", "operation": "charge"}],
         "properties": [{"name": "fail", "type": "BOOLEAN", "value": true}]},
        {"order": 1, "type": "text_message", "text": "not reached"}
    ]));

    let result = run(&interpreter(), &script, &mut TestContext::new()).await;
    assert_eq!(result.status, Some(ResultStatus::Failed));
    assert_eq!(
        result.error_message.as_deref(),
        Some("Test script failed: Requested failure")
    );
    assert!(result.log.is_empty());
    assert_eq!(result.actions().count(), 1);
}

#[tokio::test]
async fn test_unknown_engine_is_configuration_error() {
    let script = script(json!([action("open", "desktop", "click", json!([]))]));
    let result = run(&interpreter(), &script, &mut TestContext::new()).await;
    assert!(result
        .error_message
        .unwrap()
        .starts_with("Configuration error"));
}

#[tokio::test]
async fn test_traces_dropped_when_tracing_disabled() {
    let (_, interpreter) = recording();
    let script = script(json!([action("open", "web", "navigate", json!([]))]));
    let mut ctx = TestContext::new();
    ctx.set_tracing_enabled(false);

    let result = run(&interpreter, &script, &mut ctx).await;
    let response = result.actions().next().unwrap();
    assert!(response.traces.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_action_delay() {
    let mut fixture = action("open", "log", "navigate", json!([]));
    fixture["delay_ms"] = json!(1500);
    let script = script(json!([fixture]));
    let started = tokio::time::Instant::now();

    let result = run(&interpreter(), &script, &mut TestContext::new()).await;
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert_eq!(result.actions().next().unwrap().delay_ms, Some(1500));
}

#[tokio::test]
async fn test_function_merges_and_keeps_log() {
    let interpreter = interpreter_with(EngineRegistry::with_builtins().with_script_runner(PrefixRunner));
    let script = script(json!([
        {"type": "function", "name": "calc", "source": "return x",
         "properties": [{"name": "x", "type": "INTEGER", "value": 4}]}
    ]));
    let mut ctx = TestContext::new();

    let result = run(&interpreter, &script, &mut ctx).await;
    assert_eq!(result.status, Some(ResultStatus::Passed));
    assert_eq!(messages(&result), vec!["running calc"]);
    assert_eq!(ctx.get("calc.out_x").map(|p| p.kind()), Some(PropertyType::Integer));
}

#[tokio::test]
async fn test_function_failure_keeps_log() {
    let interpreter = interpreter_with(EngineRegistry::with_builtins().with_script_runner(PrefixRunner));
    let script = script(json!([
        {"type": "function", "name": "calc", "source": "fail"}
    ]));

    let result = run(&interpreter, &script, &mut TestContext::new()).await;
    assert_eq!(result.status, Some(ResultStatus::Failed));
    assert_eq!(messages(&result), vec!["running calc"]);
    assert!(result.error_message.unwrap().starts_with("Test script failed"));
}

#[tokio::test]
async fn test_function_without_runner() {
    let script = script(json!([
        {"type": "function", "name": "calc", "source": "x"}
    ]));
    let result = run(&interpreter(), &script, &mut TestContext::new()).await;
    assert_eq!(result.status, Some(ResultStatus::Failed));
    assert!(result.error_message.unwrap().starts_with("Configuration error"));
    assert!(result.elements.is_empty());
}
