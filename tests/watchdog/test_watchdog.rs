//! Tests for the stall watchdog and activity tracking

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use common::{Harness, connect_generation, drain, sent_messages, sent_turn};
use kodegen_agent_panels::{
    ConnectionState, Effect, ManagerConfig, PanelUpdate, ProviderError, ProviderEvent, Role,
    StatusEvent,
};

fn count_interrupts(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Interrupt { .. }))
        .count()
}

fn thinking() -> ProviderEvent {
    ProviderEvent::Status(StatusEvent::Thinking { text: None })
}

#[test]
fn test_stall_triggers_single_reconnect() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("hello");
    h.delta(&id, turn, "partial answer\n");

    let effects = h.advance(Duration::from_secs(91));
    assert_eq!(count_interrupts(&effects), 1);
    assert!(effects.contains(&Effect::Disconnect {
        session_id: id.clone()
    }));
    let generation = connect_generation(&effects).expect("reconnect issued");

    let session = h.manager.session(&id).unwrap();
    assert!(session.stalled);
    assert!(session.streaming);
    assert_eq!(session.connection_state, ConnectionState::Connecting);

    // Further sweeps before the reconnect resolves do nothing
    assert!(h.manager.sweep().is_empty());
    assert!(h.advance(Duration::from_secs(5)).is_empty());

    // Events from the stalled stream are discarded
    assert!(h.delta(&id, turn, "late\n").is_empty());

    // On reconnect the partial reply is dropped and the turn resent
    let effects = h.manager.on_connect_result(&id, generation, Ok(()));
    assert_eq!(sent_messages(&effects), vec!["hello".to_string()]);
    let resent = sent_turn(&effects).unwrap();
    assert!(resent > turn);

    let session = h.manager.session(&id).unwrap();
    assert!(!session.stalled);
    assert_eq!(session.connection_state, ConnectionState::Connected);
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].role, Role::User);

    h.delta(&id, resent, "full answer\n");
    h.complete(&id, resent);
    let session = h.manager.session(&id).unwrap();
    assert_eq!(session.messages[1].content, "full answer\n");
}

#[test]
fn test_session_without_activity_is_never_flagged() {
    let mut h = Harness::standard();
    let (id, _) = h.streaming_session("quiet");

    let effects = h.advance(Duration::from_secs(200));
    assert!(effects.is_empty());
    assert!(!h.manager.session(&id).unwrap().stalled);
}

#[test]
fn test_active_session_is_not_flagged() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("busy");

    for _ in 0..4 {
        h.event(&id, turn, thinking());
        assert!(h.advance(Duration::from_secs(60)).is_empty());
    }
    assert!(!h.manager.session(&id).unwrap().stalled);
}

#[test]
fn test_stuck_connect_is_recovered() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("first");
    h.delta(&id, turn, "All done.\n");
    h.complete(&id, turn);
    let _ = h.manager.disconnect(&id).unwrap();

    // The next turn waits on a connect that never answers
    let effects = h.manager.enqueue(&id, "second").unwrap();
    let hung = connect_generation(&effects).unwrap();
    assert_eq!(
        h.manager.session(&id).unwrap().connection_state,
        ConnectionState::Connecting
    );

    let effects = h.advance(Duration::from_secs(91));
    let generation = connect_generation(&effects).expect("fresh connect issued");
    assert_ne!(generation, hung);
    assert!(h.manager.session(&id).unwrap().stalled);
    assert!(h.manager.sweep().is_empty());

    // The hung attempt answering late changes nothing
    assert!(h.manager.on_connect_result(&id, hung, Ok(())).is_empty());
    let effects = h.manager.on_connect_result(&id, generation, Ok(()));
    assert_eq!(sent_messages(&effects), vec!["second".to_string()]);
    assert!(!h.manager.session(&id).unwrap().stalled);
}

#[test]
fn test_failed_reconnect_leaves_session_disconnected() {
    let mut h = Harness::new(
        ManagerConfig::builder()
            .connect_retry(2, Duration::from_millis(500))
            .build(),
    );
    let (id, turn) = h.streaming_session("hello");
    h.event(&id, turn, thinking());

    let effects = h.advance(Duration::from_secs(95));
    let first = connect_generation(&effects).unwrap();
    let _ = h
        .manager
        .on_connect_result(&id, first, Err(ProviderError::connection("agent crashed")));
    let effects = h.advance(Duration::from_millis(500));
    let second = connect_generation(&effects).unwrap();
    let _ = h
        .manager
        .on_connect_result(&id, second, Err(ProviderError::connection("agent crashed")));

    let session = h.manager.session(&id).unwrap();
    assert_eq!(session.connection_state, ConnectionState::Disconnected);
    assert!(!session.streaming);
    assert!(!session.stalled);
    assert_eq!(session.status, "Connection failed: agent crashed");
    assert_eq!(session.messages.last().unwrap().role, Role::System);
}

#[test]
fn test_identical_events_coalesce_within_window() {
    let mut h = Harness::standard();
    let id = h.create();

    h.manager.mark_activity(&id, &thinking());
    h.clock.advance(Duration::from_secs(4));
    h.manager.mark_activity(&id, &thinking());

    let record = h.manager.activity(&id).unwrap();
    assert_eq!(record.recent.len(), 1);
    assert_eq!(record.recent[0].count, 2);
    assert_eq!(record.total_events, 2);

    h.clock.advance(Duration::from_secs(5));
    h.manager.mark_activity(&id, &thinking());
    let record = h.manager.activity(&id).unwrap();
    assert_eq!(record.recent.len(), 2);
    assert_eq!(record.recent[0].count, 1);
    assert_eq!(record.last_event_label, "Thinking");
}

#[test]
fn test_seed_keeps_history() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("first");
    h.event(&id, turn, thinking());
    h.complete(&id, turn);
    let before = h.manager.activity(&id).unwrap().clone();

    h.clock.advance(Duration::from_secs(30));
    let _ = h.manager.enqueue(&id, "second").unwrap();

    let record = h.manager.activity(&id).unwrap();
    assert_eq!(record.last_event_label, "Started");
    assert!(record.last_event_at > before.last_event_at);
    assert_eq!(record.total_events, before.total_events);
    assert_eq!(record.recent, before.recent);
}

#[test]
fn test_background_work_clears_turn_complete() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("spawn helpers");
    h.complete(&id, turn);
    assert!(h.manager.is_turn_complete(&id));

    h.manager.mark_activity(
        &id,
        &ProviderEvent::Status(StatusEvent::Subagent {
            name: "indexer".to_string(),
            detail: None,
        }),
    );
    assert!(!h.manager.is_turn_complete(&id));
}

#[test]
fn test_activity_snapshots_are_throttled() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("hi");
    let mut updates = h.manager.subscribe();

    for i in 0..5 {
        h.delta(&id, turn, &format!("chunk {i} "));
    }
    assert!(
        drain(&mut updates)
            .iter()
            .all(|u| !matches!(u, PanelUpdate::Activity { .. }))
    );

    let _ = h.advance(Duration::from_millis(250));
    let snapshots: Vec<_> = drain(&mut updates)
        .into_iter()
        .filter_map(|u| match u {
            PanelUpdate::Activity { session_id, snapshot } if session_id == id => Some(snapshot),
            _ => None,
        })
        .collect();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].total_events, 5);
    assert_eq!(snapshots[0].recent[0].label, "Writing");
}
