//! Tests for session admission, settings and app-state restore

#[path = "../common/mod.rs"]
mod common;

use common::{Harness, WORKSPACE, connect_generation};
use kodegen_agent_panels::{
    ConnectionState, Effect, ManagerConfig, MemoryStore, ModelId, PanelError, PanelUpdate,
    PermissionMode, SandboxMode, SessionOptions, WorkspaceSettings,
};

#[test]
fn test_create_rejects_at_capacity() {
    let mut h = Harness::new(ManagerConfig::builder().max_live_sessions(2).build());
    h.create();
    h.create();

    let result = h.manager.create_session(WORKSPACE, SessionOptions::default());
    assert!(matches!(result, Err(PanelError::MaxSessionsReached(2))));
    assert_eq!(h.manager.live_count(), 2);
}

#[test]
fn test_create_applies_workspace_defaults_and_limits() {
    let locked = WorkspaceSettings {
        default_model: ModelId::from("small"),
        max_sandbox: SandboxMode::ReadOnly,
        max_permission: PermissionMode::VerifyFirst,
    };
    let mut h = Harness::new(ManagerConfig::builder().workspace("/locked", locked).build());

    let id = h
        .manager
        .create_session(
            "/locked",
            SessionOptions::default()
                .sandbox_mode(SandboxMode::WorkspaceWrite)
                .permission_mode(PermissionMode::ProceedAlways),
        )
        .unwrap();
    let session = h.manager.session(&id).unwrap();
    assert_eq!(session.model, ModelId::from("small"));
    assert_eq!(session.sandbox_mode, SandboxMode::ReadOnly);
    assert_eq!(session.permission_mode, PermissionMode::VerifyFirst);
    assert_eq!(session.connection_state, ConnectionState::Disconnected);

    // Unlisted workspaces fall back to the default settings
    let open = h.create();
    let session = h.manager.session(&open).unwrap();
    assert_eq!(session.sandbox_mode, SandboxMode::WorkspaceWrite);
    assert_eq!(session.permission_mode, PermissionMode::VerifyFirst);
}

#[test]
fn test_sessions_keep_creation_order() {
    let mut h = Harness::standard();
    let a = h.create();
    let b = h.create();
    let c = h.create();
    h.manager.close_session(&b).unwrap();

    let ids: Vec<_> = h.manager.sessions().iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids, vec![a, c]);
}

#[test]
fn test_close_archives_and_disconnects() {
    let mut h = Harness::standard();
    let mut updates = h.manager.subscribe();
    let (id, turn) = h.streaming_session("Explain the build");
    h.delta(&id, turn, "It uses cargo.\n");

    let effects = h.manager.close_session(&id).unwrap();
    assert_eq!(
        effects,
        vec![Effect::Disconnect {
            session_id: id.clone()
        }]
    );
    assert!(h.manager.session(&id).is_none());

    let history = h.manager.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].title, "Explain the build");
    assert_eq!(history[0].messages.len(), 2);

    let closed = common::drain(&mut updates).into_iter().any(|u| {
        matches!(u, PanelUpdate::Session { session_id, changes } if session_id == id && changes.contains(kodegen_agent_panels::Changes::CLOSED))
    });
    assert!(closed);

    // Late events for the closed session are dropped
    assert!(h.delta(&id, turn, "late").is_empty());
}

#[test]
fn test_close_unknown_session() {
    let mut h = Harness::standard();
    let id = h.create();
    h.manager.close_session(&id).unwrap();
    assert!(matches!(
        h.manager.close_session(&id),
        Err(PanelError::SessionNotFound(_))
    ));
}

#[test]
fn test_workspace_change_abandons_turn() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("hello");

    let effects = h.manager.set_workspace_root(&id, "/work/other").unwrap();
    assert!(effects.contains(&Effect::Disconnect {
        session_id: id.clone()
    }));

    let session = h.manager.session(&id).unwrap();
    assert!(!session.streaming);
    assert_eq!(session.connection_state, ConnectionState::Disconnected);
    assert!(session.status.starts_with("Workspace changed"));
    assert_eq!(session.messages.len(), 1);

    // The old turn's output never lands
    assert!(h.delta(&id, turn, "stale\n").is_empty());
    assert_eq!(h.manager.session(&id).unwrap().messages.len(), 1);

    // Next send connects in the new workspace
    let effects = h.manager.enqueue(&id, "again").unwrap();
    let request = effects.iter().find_map(|e| match e {
        Effect::Connect { request, .. } => Some(request.clone()),
        _ => None,
    });
    assert_eq!(request.unwrap().cwd, std::path::PathBuf::from("/work/other"));
}

#[test]
fn test_rebind_moves_every_bound_session() {
    let mut h = Harness::standard();
    let a = h.create();
    let b = h.create();
    let elsewhere = h
        .manager
        .create_session("/elsewhere", SessionOptions::default())
        .unwrap();

    let _ = h
        .manager
        .rebind_workspace(std::path::Path::new(WORKSPACE), std::path::Path::new("/moved"));
    for id in [&a, &b] {
        assert_eq!(
            h.manager.session(id).unwrap().workspace_root,
            std::path::PathBuf::from("/moved")
        );
    }
    assert_eq!(
        h.manager.session(&elsewhere).unwrap().workspace_root,
        std::path::PathBuf::from("/elsewhere")
    );
}

#[test]
fn test_settings_are_refused_while_streaming() {
    let mut h = Harness::standard();
    let (id, _) = h.streaming_session("hello");

    assert!(matches!(
        h.manager.set_model(&id, "bigger"),
        Err(PanelError::SessionBusy(_))
    ));
    assert!(matches!(
        h.manager
            .set_modes(&id, PermissionMode::ProceedAlways, SandboxMode::ReadOnly),
        Err(PanelError::SessionBusy(_))
    ));
}

#[test]
fn test_set_model_resets_connection() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("hello");
    h.complete(&id, turn);

    let effects = h.manager.set_model(&id, "bigger").unwrap();
    assert_eq!(
        effects,
        vec![Effect::Disconnect {
            session_id: id.clone()
        }]
    );
    let session = h.manager.session(&id).unwrap();
    assert_eq!(session.model, ModelId::from("bigger"));
    assert_eq!(session.connection_state, ConnectionState::Disconnected);
}

#[test]
fn test_set_modes_clamps_to_workspace() {
    let locked = WorkspaceSettings {
        max_sandbox: SandboxMode::ReadOnly,
        ..WorkspaceSettings::default()
    };
    let mut h = Harness::new(ManagerConfig::builder().workspace(WORKSPACE, locked).build());
    let id = h.create();

    let _ = h
        .manager
        .set_modes(&id, PermissionMode::ProceedAlways, SandboxMode::WorkspaceWrite)
        .unwrap();
    let session = h.manager.session(&id).unwrap();
    assert_eq!(session.sandbox_mode, SandboxMode::ReadOnly);
    assert_eq!(session.permission_mode, PermissionMode::ProceedAlways);
}

#[test]
fn test_restore_resends_queued_inputs() {
    let store = MemoryStore::new();
    {
        let mut h = Harness::with_store(ManagerConfig::default(), store.clone());
        let (id, turn) = h.streaming_session("first");
        h.delta(&id, turn, "partial");
        h.manager.enqueue(&id, "second").unwrap();
        h.manager.set_draft(&id, "unsent").unwrap();
        h.manager.set_font_scale(&id, 1.25).unwrap();
    }

    let saved = store.app_state().expect("app state saved");
    assert_eq!(saved.sessions.len(), 1);
    assert_eq!(saved.sessions[0].pending_inputs.len(), 1);

    let mut h = Harness::with_store(ManagerConfig::default(), store);
    let effects = h.manager.restore_from_store();
    assert!(connect_generation(&effects).is_some());

    let session = h.manager.sessions()[0].clone();
    assert!(session.streaming);
    assert!(session.pending_inputs.is_empty());
    assert_eq!(session.input_draft, "unsent");
    assert!((session.font_scale - 1.25).abs() < f32::EPSILON);
    assert_eq!(session.messages.last().unwrap().content, "second");
}

#[test]
fn test_restore_drops_sessions_over_cap() {
    let store = MemoryStore::new();
    {
        let mut h = Harness::with_store(ManagerConfig::default(), store.clone());
        h.create();
        h.create();
        h.create();
    }

    let mut h = Harness::with_store(
        ManagerConfig::builder().max_live_sessions(2).build(),
        store,
    );
    let _ = h.manager.restore_from_store();
    assert_eq!(h.manager.live_count(), 2);
}

#[test]
fn test_shutdown_archives_and_keeps_app_state() {
    let mut h = Harness::standard();
    let (id, turn) = h.streaming_session("keep me");
    h.delta(&id, turn, "working on it");

    let effects = h.manager.shutdown();
    assert_eq!(
        effects,
        vec![Effect::Disconnect {
            session_id: id.clone()
        }]
    );
    assert_eq!(h.store.history().len(), 1);
    assert_eq!(h.store.history()[0].messages[1].content, "working on it");
    assert_eq!(h.store.app_state().unwrap().sessions.len(), 1);

    // Sessions stay live for the final snapshot
    assert!(h.manager.session(&id).is_some());
}
