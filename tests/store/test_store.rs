//! Tests for the JSON file store

#[path = "../common/mod.rs"]
mod common;

use std::fs;

use anyhow::Result;
use chrono::Utc;
use common::WORKSPACE;
use kodegen_agent_panels::store::{APP_STATE_FILE, CHAT_HISTORY_FILE};
use kodegen_agent_panels::{
    AppStateSnapshot, ChatMessage, HistoryEntry, HistoryId, HistoryStore, JsonFileStore,
    ManagerConfig, ModelId, PermissionMode, SandboxMode, SessionManager, SessionOptions,
    SessionSnapshot,
};
use serde_json::json;
use tempfile::TempDir;

fn entry(title: &str) -> HistoryEntry {
    HistoryEntry {
        id: HistoryId::generate(),
        title: title.to_string(),
        saved_at: Utc::now(),
        workspace_root: WORKSPACE.into(),
        model: ModelId::from("default"),
        permission_mode: PermissionMode::VerifyFirst,
        sandbox: SandboxMode::ReadOnly,
        font_scale: 1.1,
        messages: vec![
            ChatMessage::user(title, Utc::now()),
            ChatMessage::assistant("ok", Utc::now()),
        ],
    }
}

#[test]
fn test_missing_files_load_empty() -> Result<()> {
    let dir = TempDir::new()?;
    let store = JsonFileStore::new(dir.path().join("not-yet-created"));
    assert!(store.load_chat_history()?.is_empty());
    assert!(store.load_app_state()?.is_none());
    Ok(())
}

#[test]
fn test_history_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let mut store = JsonFileStore::new(dir.path().join("state"));
    let entries = vec![entry("first"), entry("second")];

    store.save_chat_history(&entries)?;
    assert!(dir.path().join("state").join(CHAT_HISTORY_FILE).exists());
    assert_eq!(store.load_chat_history()?, entries);
    Ok(())
}

#[test]
fn test_malformed_entries_are_skipped() -> Result<()> {
    let dir = TempDir::new()?;
    let good = serde_json::to_value(entry("good"))?;
    let raw = json!([good, { "id": 5, "title": null }, "not an entry"]);
    fs::write(dir.path().join(CHAT_HISTORY_FILE), serde_json::to_vec(&raw)?)?;

    let store = JsonFileStore::new(dir.path());
    let loaded = store.load_chat_history()?;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].title, "good");
    Ok(())
}

#[test]
fn test_unreadable_files_are_ignored() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join(CHAT_HISTORY_FILE), "{ not json")?;
    fs::write(dir.path().join(APP_STATE_FILE), "[]]")?;

    let store = JsonFileStore::new(dir.path());
    assert!(store.load_chat_history()?.is_empty());
    assert!(store.load_app_state()?.is_none());
    Ok(())
}

#[test]
fn test_app_state_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let mut store = JsonFileStore::new(dir.path());
    let snapshot = AppStateSnapshot {
        sessions: vec![SessionSnapshot {
            workspace_root: WORKSPACE.into(),
            history_id: None,
            title: "draft only".to_string(),
            model: ModelId::from("default"),
            interaction_mode: Default::default(),
            permission_mode: PermissionMode::ProceedAlways,
            sandbox_mode: SandboxMode::WorkspaceWrite,
            messages: Vec::new(),
            input_draft: "half a thought".to_string(),
            pending_inputs: Vec::new(),
            font_scale: 0.9,
        }],
    };

    store.save_app_state(&snapshot)?;
    assert_eq!(store.load_app_state()?, Some(snapshot));
    // No temp file is left behind
    let leftovers: Vec<_> = fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

#[test]
fn test_manager_reloads_history_from_disk() -> Result<()> {
    common::init_logging();
    let dir = TempDir::new()?;

    {
        let mut manager =
            SessionManager::new(ManagerConfig::default(), Box::new(JsonFileStore::new(dir.path())))?;
        let options = SessionOptions {
            messages: vec![
                ChatMessage::user("Where is the config loaded?", Utc::now()),
                ChatMessage::assistant("In src/config.rs.", Utc::now()),
            ],
            ..SessionOptions::default()
        };
        let id = manager.create_session(WORKSPACE, options)?;
        let _ = manager.close_session(&id)?;
    }

    let manager =
        SessionManager::new(ManagerConfig::default(), Box::new(JsonFileStore::new(dir.path())))?;
    assert_eq!(manager.history().len(), 1);
    assert_eq!(manager.history()[0].title, "Where is the config loaded?");
    Ok(())
}
