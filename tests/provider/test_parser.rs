//! Unit tests for the provider event parser
//!
//! Tests the parsing of raw JSON payloads into typed provider events

use kodegen_agent_panels::{ProviderError, ProviderEvent, StatusEvent, parse_event};
use serde_json::json;

#[test]
fn test_parse_delta() {
    let event = parse_event(json!({ "type": "delta", "text": "Hello" })).unwrap();
    assert_eq!(event, ProviderEvent::Delta("Hello".to_string()));
    assert!(!event.is_terminal());
}

#[test]
fn test_parse_terminal_events() {
    let done = parse_event(json!({ "type": "turn_complete" })).unwrap();
    assert_eq!(done, ProviderEvent::TurnComplete);
    assert!(done.is_terminal());

    let failed = parse_event(json!({ "type": "error", "message": "rate limited" })).unwrap();
    assert_eq!(failed, ProviderEvent::Error("rate limited".to_string()));
    assert!(failed.is_terminal());
}

#[test]
fn test_parse_wrapped_status() {
    let data = json!({
        "type": "status",
        "event": { "type": "plan", "summary": "1. read 2. edit" }
    });
    assert_eq!(
        parse_event(data).unwrap(),
        ProviderEvent::Status(StatusEvent::Plan {
            summary: "1. read 2. edit".to_string()
        })
    );
}

#[test]
fn test_parse_direct_status() {
    let started = parse_event(json!({
        "type": "tool_started",
        "name": "bash",
        "detail": "cargo fmt"
    }))
    .unwrap();
    assert_eq!(
        started,
        ProviderEvent::Status(StatusEvent::ToolStarted {
            name: "bash".to_string(),
            detail: Some("cargo fmt".to_string()),
        })
    );

    // Optional fields fall back to their defaults
    let finished = parse_event(json!({ "type": "tool_finished", "name": "bash" })).unwrap();
    assert_eq!(
        finished,
        ProviderEvent::Status(StatusEvent::ToolFinished {
            name: "bash".to_string(),
            ok: true,
        })
    );
    assert_eq!(
        parse_event(json!({ "type": "thinking" })).unwrap(),
        ProviderEvent::Status(StatusEvent::Thinking { text: None })
    );
}

#[test]
fn test_parse_usage_keeps_payload() {
    let usage = json!({ "input_tokens": 1200, "output_tokens": 80 });
    let event = parse_event(json!({ "type": "usage", "usage": usage.clone() })).unwrap();
    assert_eq!(event, ProviderEvent::Status(StatusEvent::Usage { usage }));
}

#[test]
fn test_parse_invalid_event() {
    let result = parse_event(json!({ "type": "invalid_type", "data": "some data" }));
    assert!(matches!(result, Err(ProviderError::Protocol(_))));

    // Known type with a missing field
    let result = parse_event(json!({ "type": "delta" }));
    assert!(matches!(result, Err(ProviderError::Protocol(_))));
}

#[test]
fn test_parse_non_object() {
    assert!(parse_event(json!("delta")).is_err());
    assert!(parse_event(json!(null)).is_err());
}
