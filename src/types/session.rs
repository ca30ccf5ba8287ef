//! Session (panel) data model

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

use super::identifiers::{HistoryId, ModelId, SessionId, TurnId};
use super::messages::{Attachment, ChatMessage, PendingInput, Role};
use super::modes::{ConnectionState, InteractionMode, PermissionMode, SandboxMode};

/// Default text scale for a new panel
pub const DEFAULT_FONT_SCALE: f32 = 1.0;

/// One independent conversation bound to a workspace and a provider connection
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique while live
    pub id: SessionId,
    /// Workspace the provider process runs in
    pub workspace_root: PathBuf,
    /// Linked history entry, assigned on first archive
    pub history_id: Option<HistoryId>,
    /// Display title
    pub title: String,
    /// Model used for turns
    pub model: ModelId,
    /// Agent/plan/ask/debug
    pub interaction_mode: InteractionMode,
    /// Tool confirmation policy (clamped to the workspace limit)
    pub permission_mode: PermissionMode,
    /// Filesystem access (clamped to the workspace limit)
    pub sandbox_mode: SandboxMode,
    /// Provider connection state
    pub connection_state: ConnectionState,
    /// A turn is in flight
    pub streaming: bool,
    /// Ordered message log
    pub messages: Vec<ChatMessage>,
    /// Attachments staged for the next send
    pub attachments: Vec<Attachment>,
    /// Unsent composer text
    pub input_draft: String,
    /// Inputs waiting for the current turn to finish
    pub pending_inputs: VecDeque<PendingInput>,
    /// Panel text scale
    pub font_scale: f32,
    /// Provider rate-limit counters (opaque)
    pub usage: Option<serde_json::Value>,
    /// Free-text status hint
    pub status: String,
    /// Automatic continuations since the last user send
    pub auto_continue_count: u32,
    /// Current turn generation
    pub turn: TurnId,
    /// Set by the watchdog until the reconnect resolves
    pub stalled: bool,
}

impl Session {
    pub(crate) fn new(id: SessionId, workspace_root: PathBuf, model: ModelId) -> Self {
        Self {
            id,
            workspace_root,
            history_id: None,
            title: String::new(),
            model,
            interaction_mode: InteractionMode::default(),
            permission_mode: PermissionMode::default(),
            sandbox_mode: SandboxMode::default(),
            connection_state: ConnectionState::Disconnected,
            streaming: false,
            messages: Vec::new(),
            attachments: Vec::new(),
            input_draft: String::new(),
            pending_inputs: VecDeque::new(),
            font_scale: DEFAULT_FONT_SCALE,
            usage: None,
            status: String::from("Disconnected"),
            auto_continue_count: 0,
            turn: 0,
            stalled: false,
        }
    }

    /// Index of the most recent message with the given role
    #[must_use]
    pub fn last_index_of(&self, role: Role) -> Option<usize> {
        self.messages.iter().rposition(|m| m.role == role)
    }

    /// Index of the assistant message the current turn is streaming into
    ///
    /// Only an assistant message that comes after the latest user message
    /// belongs to the current turn; anything older is a previous turn's
    /// output and must not be extended.
    #[must_use]
    pub fn live_assistant_index(&self) -> Option<usize> {
        if !self.streaming {
            return None;
        }
        let assistant = self.last_index_of(Role::Assistant)?;
        match self.last_index_of(Role::User) {
            Some(user) if user > assistant => None,
            _ => Some(assistant),
        }
    }

    /// Whether the log holds genuine user/assistant content
    #[must_use]
    pub fn has_conversation(&self) -> bool {
        self.messages
            .iter()
            .any(|m| !m.synthetic && m.is_conversational() && !m.content.trim().is_empty())
    }
}

/// Overrides accepted by `create_session`
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Explicit model; falls back to the workspace default
    pub model: Option<ModelId>,
    /// Initial title
    pub title: Option<String>,
    /// Interaction mode
    pub interaction_mode: Option<InteractionMode>,
    /// Requested permission mode (clamped)
    pub permission_mode: Option<PermissionMode>,
    /// Requested sandbox mode (clamped)
    pub sandbox_mode: Option<SandboxMode>,
    /// Panel text scale
    pub font_scale: Option<f32>,
    /// Existing history entry this session continues
    pub history_id: Option<HistoryId>,
    /// Initial message log (reopened history)
    pub messages: Vec<ChatMessage>,
}

impl SessionOptions {
    /// Use the given model
    #[must_use]
    pub fn model(mut self, model: impl Into<ModelId>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Use the given title
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Request a permission mode
    #[must_use]
    pub const fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = Some(mode);
        self
    }

    /// Request a sandbox mode
    #[must_use]
    pub const fn sandbox_mode(mut self, mode: SandboxMode) -> Self {
        self.sandbox_mode = Some(mode);
        self
    }

    /// Use an interaction mode
    #[must_use]
    pub const fn interaction_mode(mut self, mode: InteractionMode) -> Self {
        self.interaction_mode = Some(mode);
        self
    }
}

/// Restorable part of a live session, persisted as app state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Workspace root
    pub workspace_root: PathBuf,
    /// Linked history entry
    #[serde(default)]
    pub history_id: Option<HistoryId>,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Model id
    pub model: ModelId,
    /// Interaction mode
    #[serde(default)]
    pub interaction_mode: InteractionMode,
    /// Permission mode
    #[serde(default)]
    pub permission_mode: PermissionMode,
    /// Sandbox mode
    #[serde(default)]
    pub sandbox_mode: SandboxMode,
    /// Message log
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Unsent draft
    #[serde(default)]
    pub input_draft: String,
    /// Queued inputs
    #[serde(default)]
    pub pending_inputs: Vec<PendingInput>,
    /// Text scale
    #[serde(default = "default_font_scale")]
    pub font_scale: f32,
}

fn default_font_scale() -> f32 {
    DEFAULT_FONT_SCALE
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            workspace_root: session.workspace_root.clone(),
            history_id: session.history_id.clone(),
            title: session.title.clone(),
            model: session.model.clone(),
            interaction_mode: session.interaction_mode,
            permission_mode: session.permission_mode,
            sandbox_mode: session.sandbox_mode,
            messages: session.messages.clone(),
            input_draft: session.input_draft.clone(),
            pending_inputs: session.pending_inputs.iter().cloned().collect(),
            font_scale: session.font_scale,
        }
    }
}

/// Whole-application snapshot handed to the persistence boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppStateSnapshot {
    /// Live sessions in creation order
    #[serde(default)]
    pub sessions: Vec<SessionSnapshot>,
}
