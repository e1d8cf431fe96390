use serde_json::json;

use super::helpers::*;
use crate::context::TestContext;
use crate::model::{Property, PropertyType, PropertyValue};
use crate::types::ResultStatus;

#[tokio::test]
async fn test_set_date_literal() {
    let script = script(json!([
        {"type": "property_action", "action": "SET", "property": "due", "value": "13.12.2012",
         "property_type": "DATE"}
    ]));
    let mut ctx = TestContext::new();

    let result = run(&interpreter(), &script, &mut ctx).await;
    assert_eq!(result.status, Some(ResultStatus::Passed));
    let due = ctx.get("due").unwrap();
    assert_eq!(due.kind(), PropertyType::Date);
    assert_eq!(due.as_string().as_deref(), Some("13.12.2012"));
}

#[tokio::test]
async fn test_set_invalid_date_fails() {
    let script = script(json!([
        {"type": "property_action", "action": "SET", "property": "due", "value": "2012-12-13"}
    ]));
    let mut ctx = TestContext::with_properties(vec![Property::new("due", PropertyValue::Date(None))]);

    let result = run(&interpreter(), &script, &mut ctx).await;
    assert_eq!(result.status, Some(ResultStatus::Failed));
    assert!(result
        .error_message
        .unwrap()
        .starts_with("Property action failed"));
}

#[tokio::test]
async fn test_set_existing_uses_its_type() {
    let script = script(json!([
        {"type": "property_action", "action": "SET", "property": "count", "value": "12"}
    ]));
    let mut ctx = TestContext::with_properties(vec![Property::long("count", 1)]);

    run(&interpreter(), &script, &mut ctx).await;
    assert_eq!(ctx.get("count"), Some(&Property::long("count", 12)));
}

#[tokio::test]
async fn test_clear_and_delete() {
    let script = script(json!([
        {"order": 0, "type": "property_action", "action": "CLEAR", "property": "a"},
        {"order": 1, "type": "property_action", "action": "DELETE", "property": "b"}
    ]));
    let mut ctx = TestContext::with_properties(vec![Property::string("a", "x"), Property::integer("b", 1)]);

    run(&interpreter(), &script, &mut ctx).await;
    let a = ctx.get("a").unwrap();
    assert!(a.is_null());
    assert_eq!(a.kind(), PropertyType::String);
    assert!(!ctx.contains("b"));
}

#[tokio::test]
async fn test_clear_unknown_property_fails() {
    let script = script(json!([
        {"type": "property_action", "action": "CLEAR", "property": "ghost"}
    ]));
    let result = run(&interpreter(), &script, &mut TestContext::new()).await;
    assert_eq!(result.status, Some(ResultStatus::Failed));
}

#[tokio::test]
async fn test_copy_creates_independent_target() {
    let script = script(json!([
        {"order": 0, "type": "property_action", "action": "COPY", "property": "b", "source": "a"},
        {"order": 1, "type": "property_action", "action": "SET", "property": "b", "value": "changed"}
    ]));
    let mut ctx = TestContext::with_properties(vec![Property::string("a", "original")]);

    run(&interpreter(), &script, &mut ctx).await;
    assert_eq!(ctx.get("a").unwrap().as_string().as_deref(), Some("original"));
    assert_eq!(ctx.get("b").unwrap().as_string().as_deref(), Some("changed"));
}

#[tokio::test]
async fn test_copy_appends_lists() {
    let script = script(json!([
        {"type": "property_action", "action": "COPY", "property": "all", "source": "more"}
    ]));
    let mut ctx = TestContext::with_properties(vec![
        Property::list("all", vec![Property::integer("", 1)]),
        Property::list("more", vec![Property::integer("", 2), Property::integer("", 3)]),
    ]);

    run(&interpreter(), &script, &mut ctx).await;
    assert_eq!(ctx.get("all").unwrap().items().unwrap().len(), 3);
    assert_eq!(ctx.get("more").unwrap().items().unwrap().len(), 2);
}

#[tokio::test]
async fn test_copy_type_mismatch_fails() {
    let script = script(json!([
        {"type": "property_action", "action": "COPY", "property": "b", "source": "a"}
    ]));
    let mut ctx = TestContext::with_properties(vec![Property::string("a", "x"), Property::integer("b", 1)]);

    let result = run(&interpreter(), &script, &mut ctx).await;
    assert_eq!(result.status, Some(ResultStatus::Failed));
    assert_eq!(ctx.get("b"), Some(&Property::integer("b", 1)));
}
