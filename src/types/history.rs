//! Persisted conversation history entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::identifiers::{HistoryId, ModelId};
use super::messages::ChatMessage;
use super::modes::{PermissionMode, SandboxMode};
use super::session::DEFAULT_FONT_SCALE;

/// Snapshot of a finished or closed session's conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Entry id (also stored on the session that produced it)
    pub id: HistoryId,
    /// Summarized title
    pub title: String,
    /// When the entry was last written
    pub saved_at: DateTime<Utc>,
    /// Workspace the conversation ran in
    pub workspace_root: PathBuf,
    /// Model used
    pub model: ModelId,
    /// Permission mode at archive time
    #[serde(default)]
    pub permission_mode: PermissionMode,
    /// Sandbox mode at archive time
    #[serde(default)]
    pub sandbox: SandboxMode,
    /// Panel text scale
    #[serde(default = "default_font_scale")]
    pub font_scale: f32,
    /// Deep copy of the message log, synthetic messages removed
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

fn default_font_scale() -> f32 {
    DEFAULT_FONT_SCALE
}

/// Which entries a delete request removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScope {
    /// A single entry
    Entry(HistoryId),
    /// Every entry
    All,
    /// The given entry and every entry of the same workspace saved at or before it
    ThisAndOlder(HistoryId),
}
