//! Tests for history archiving, reopening and deletion

#[path = "../common/mod.rs"]
mod common;

use std::path::Path;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{Harness, WORKSPACE, sent_turn};
use kodegen_agent_panels::{
    ChatMessage, DeleteScope, Effect, HistoryEntry, HistoryId, ManagerConfig, MemoryStore,
    ModelId, PanelError, PermissionMode, Role, SandboxMode, SessionId, SessionOptions,
};

/// One full exchange in `root`, returning the session and its history entry
fn converse(h: &mut Harness, root: &str, text: &str) -> (SessionId, HistoryId) {
    let id = h
        .manager
        .create_session(root, SessionOptions::default())
        .unwrap();
    let effects = h.manager.enqueue(&id, text).unwrap();
    let effects = h.accept_connects(effects);
    let turn = sent_turn(&effects).unwrap();
    h.delta(&id, turn, "Sure.\n");
    h.complete(&id, turn);
    let history_id = h.manager.session(&id).unwrap().history_id.clone().unwrap();
    (id, history_id)
}

fn titles(h: &Harness, root: &str) -> Vec<String> {
    h.manager
        .history_for_workspace(Path::new(root))
        .iter()
        .map(|e| e.title.clone())
        .collect()
}

#[test]
fn test_close_and_reopen_round_trip() {
    let mut h = Harness::standard();
    let (id, history_id) = converse(&mut h, WORKSPACE, "Summarize the README");
    h.manager.close_session(&id).unwrap();
    assert_eq!(h.manager.history().len(), 1);

    let reopened = h.manager.open_history(&history_id).unwrap();
    assert_ne!(reopened, id);
    let session = h.manager.session(&reopened).unwrap();
    assert_eq!(session.title, "Summarize the README");
    assert_eq!(session.history_id.as_ref(), Some(&history_id));
    let log: Vec<_> = session
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        log,
        vec![(Role::User, "Summarize the README"), (Role::Assistant, "Sure.\n")]
    );

    // Opening again returns the live session
    assert_eq!(h.manager.open_history(&history_id).unwrap(), reopened);

    // Continuing updates the same entry
    let effects = h.manager.enqueue(&reopened, "And the license?").unwrap();
    let effects = h.accept_connects(effects);
    let turn = sent_turn(&effects).unwrap();
    h.delta(&reopened, turn, "MIT.\n");
    h.complete(&reopened, turn);

    let history = h.manager.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, history_id);
    assert_eq!(history[0].messages.len(), 4);
    assert_eq!(h.store.history()[0].messages.len(), 4);
}

#[test]
fn test_empty_session_is_not_archived() {
    let mut h = Harness::standard();
    let id = h.create();
    h.manager.close_session(&id).unwrap();
    assert!(h.manager.history().is_empty());
    assert_eq!(h.store.history_saves(), 0);
}

#[test]
fn test_delete_entry_closes_bound_session() {
    let mut h = Harness::standard();
    let (id, history_id) = converse(&mut h, WORKSPACE, "hello");
    let (other, _) = converse(&mut h, WORKSPACE, "unrelated");

    let effects = h
        .manager
        .delete_history(&DeleteScope::Entry(history_id.clone()))
        .unwrap();
    assert_eq!(
        effects,
        vec![Effect::Disconnect {
            session_id: id.clone()
        }]
    );
    assert!(h.manager.session(&id).is_none());
    assert!(h.manager.session(&other).is_some());
    assert!(h.manager.history_entry(&history_id).is_none());
    assert_eq!(h.store.history().len(), 1);

    assert!(matches!(
        h.manager.delete_history(&DeleteScope::Entry(history_id)),
        Err(PanelError::HistoryEntryNotFound(_))
    ));
}

#[test]
fn test_delete_all() {
    let mut h = Harness::standard();
    converse(&mut h, WORKSPACE, "one");
    converse(&mut h, "/work/other", "two");

    let effects = h.manager.delete_history(&DeleteScope::All).unwrap();
    assert_eq!(effects.len(), 2);
    assert!(h.manager.history().is_empty());
    assert_eq!(h.manager.live_count(), 0);
    assert!(h.store.history().is_empty());
}

#[test]
fn test_delete_this_and_older_stays_in_workspace() {
    let mut h = Harness::standard();
    converse(&mut h, WORKSPACE, "oldest");
    let _ = h.advance(Duration::from_secs(1));
    converse(&mut h, "/work/other", "elsewhere");
    let _ = h.advance(Duration::from_secs(1));
    let (_, anchor) = converse(&mut h, WORKSPACE, "middle");
    let _ = h.advance(Duration::from_secs(1));
    converse(&mut h, WORKSPACE, "newest");

    let effects = h
        .manager
        .delete_history(&DeleteScope::ThisAndOlder(anchor))
        .unwrap();
    assert_eq!(effects.len(), 2);
    assert_eq!(titles(&h, WORKSPACE), vec!["newest".to_string()]);
    assert_eq!(titles(&h, "/work/other"), vec!["elsewhere".to_string()]);
}

#[test]
fn test_history_cap_is_per_workspace() {
    let mut h = Harness::new(ManagerConfig::builder().max_history_entries(2).build());
    for text in ["first", "second", "third"] {
        let (id, _) = converse(&mut h, WORKSPACE, text);
        h.manager.close_session(&id).unwrap();
        let _ = h.advance(Duration::from_secs(1));
    }
    converse(&mut h, "/work/other", "other");

    assert_eq!(
        titles(&h, WORKSPACE),
        vec!["third".to_string(), "second".to_string()]
    );
    assert_eq!(titles(&h, "/work/other").len(), 1);
    assert_eq!(h.manager.history().len(), 3);
}

#[test]
fn test_loaded_history_is_sorted_newest_first() {
    let entry = |id: &str, secs: i64| HistoryEntry {
        id: HistoryId::from(id),
        title: id.to_string(),
        saved_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        workspace_root: WORKSPACE.into(),
        model: ModelId::from("default"),
        permission_mode: PermissionMode::default(),
        sandbox: SandboxMode::default(),
        font_scale: 1.0,
        messages: vec![ChatMessage::user(id, Utc::now())],
    };
    let store = MemoryStore::with_history(vec![entry("old", 0), entry("new", 60)]);
    let h = Harness::with_store(ManagerConfig::default(), store);

    let ids: Vec<_> = h.manager.history().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);
}

#[test]
fn test_open_unknown_entry() {
    let mut h = Harness::standard();
    assert!(matches!(
        h.manager.open_history(&HistoryId::from("missing")),
        Err(PanelError::HistoryEntryNotFound(_))
    ));
}
