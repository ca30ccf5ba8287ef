//! Tests for delta coalescing and provider event handling

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use common::{Harness, drain, sent_turn};
use kodegen_agent_panels::{Changes, PanelUpdate, ProviderEvent, Role, StatusEvent};
use serde_json::json;

fn message_updates(updates: &[PanelUpdate]) -> usize {
    updates
        .iter()
        .filter(|u| matches!(u, PanelUpdate::Session { changes, .. } if changes.contains(Changes::MESSAGES)))
        .count()
}

#[test]
fn test_newline_flushes_immediately() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("hi");
    let mut updates = h.manager.subscribe();

    h.delta(&id, turn, "Hello ");
    assert_eq!(h.manager.session(&id).unwrap().messages.len(), 1);

    h.delta(&id, turn, "world\n");
    let session = h.manager.session(&id).unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[1].role, Role::Assistant);
    assert_eq!(session.messages[1].content, "Hello world\n");
    assert_eq!(message_updates(&drain(&mut updates)), 1);

    // The cancelled debounce never fires a second flush
    let _ = h.advance(Duration::from_millis(100));
    assert_eq!(message_updates(&drain(&mut updates)), 0);
    assert_eq!(h.manager.session(&id).unwrap().messages[1].content, "Hello world\n");
}

#[test]
fn test_fragments_flush_after_debounce() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("hi");

    h.delta(&id, turn, "a");
    h.delta(&id, turn, "b");
    let _ = h.advance(Duration::from_millis(10));
    assert_eq!(h.manager.session(&id).unwrap().messages.len(), 1);

    let _ = h.advance(Duration::from_millis(40));
    let session = h.manager.session(&id).unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[1].content, "ab");

    // Later fragments extend the same assistant message
    h.delta(&id, turn, "c\n");
    let session = h.manager.session(&id).unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[1].content, "abc\n");
}

#[test]
fn test_empty_flush_is_idempotent() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("hi");
    h.delta(&id, turn, "line\n");
    let before = h.manager.session(&id).unwrap().messages.clone();
    let mut updates = h.manager.subscribe();

    h.manager.flush(&id);
    h.manager.flush(&id);

    assert_eq!(h.manager.session(&id).unwrap().messages, before);
    assert_eq!(message_updates(&drain(&mut updates)), 0);
}

#[test]
fn test_new_turn_never_extends_previous_reply() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("first");
    h.delta(&id, turn, "one\n");
    h.complete(&id, turn);

    let effects = h.manager.enqueue(&id, "second").unwrap();
    let turn = sent_turn(&effects).expect("connected session sends at once");
    h.delta(&id, turn, "two\n");

    let roles: Vec<_> = h
        .manager
        .session(&id)
        .unwrap()
        .messages
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect();
    assert_eq!(
        roles,
        vec![
            (Role::User, "first".to_string()),
            (Role::Assistant, "one\n".to_string()),
            (Role::User, "second".to_string()),
            (Role::Assistant, "two\n".to_string()),
        ]
    );
}

#[test]
fn test_pending_text_flushes_on_completion() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("hi");
    h.delta(&id, turn, "no newline yet.");
    h.complete(&id, turn);

    let session = h.manager.session(&id).unwrap();
    assert!(!session.streaming);
    assert_eq!(session.status, "Ready");
    assert_eq!(session.messages[1].content, "no newline yet.");
}

#[test]
fn test_stale_turn_events_are_dropped() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("hi");

    assert!(h.delta(&id, turn + 1, "future\n").is_empty());
    assert!(h.delta(&id, turn - 1, "past\n").is_empty());
    assert_eq!(h.manager.session(&id).unwrap().messages.len(), 1);
    assert!(h.manager.activity(&id).is_none());
}

#[test]
fn test_status_events_update_status_and_usage() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("run the tests");

    h.event(
        &id,
        turn,
        ProviderEvent::Status(StatusEvent::ToolStarted {
            name: "bash".to_string(),
            detail: Some("cargo test".to_string()),
        }),
    );
    assert_eq!(
        h.manager.session(&id).unwrap().status,
        "Running tool: bash: cargo test"
    );

    h.event(
        &id,
        turn,
        ProviderEvent::Status(StatusEvent::Usage {
            usage: json!({ "remaining": 42 }),
        }),
    );
    let session = h.manager.session(&id).unwrap();
    assert_eq!(session.usage, Some(json!({ "remaining": 42 })));
    // Status events never touch the message log
    assert_eq!(session.messages.len(), 1);
}

#[test]
fn test_sessions_stream_independently() {
    let mut h = Harness::standard();
    let (a, turn_a) = h.streaming_session("a");
    let (b, turn_b) = h.streaming_session("b");

    h.delta(&a, turn_a, "from a\n");
    h.delta(&b, turn_b, "from b\n");
    h.event(&b, turn_b, ProviderEvent::Error("boom".to_string()));

    let session_a = h.manager.session(&a).unwrap();
    assert!(session_a.streaming);
    assert_eq!(session_a.messages[1].content, "from a\n");

    let session_b = h.manager.session(&b).unwrap();
    assert!(!session_b.streaming);
    assert_eq!(session_b.messages.last().unwrap().role, Role::System);
}
