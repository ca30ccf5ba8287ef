//! Message-related type definitions
//!
//! This module contains the chat log entries of a session, staged
//! attachments, and queued user inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::identifiers::MessageId;

// ============================================================================
// Chat Log
// ============================================================================

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sent by the user (or an automatic continuation on their behalf)
    User,
    /// Streamed back by the provider
    Assistant,
    /// Internal diagnostics
    System,
}

/// How message content should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Plain text
    #[default]
    Text,
    /// Markdown
    Markdown,
}

/// One entry in a session's message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message identifier
    pub id: MessageId,
    /// Message author
    pub role: Role,
    /// Message body
    pub content: String,
    /// Rendering hint
    #[serde(default)]
    pub format: MessageFormat,
    /// When the message was appended
    pub created_at: DateTime<Utc>,
    /// Inserted automatically by the auto-continue policy
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl ChatMessage {
    fn build(role: Role, content: String, format: MessageFormat, at: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content,
            format,
            created_at: at,
            synthetic: false,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::build(Role::User, content.into(), MessageFormat::Text, at)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::build(Role::Assistant, content.into(), MessageFormat::Markdown, at)
    }

    /// Create a system (diagnostic) message
    pub fn system(content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::build(Role::System, content.into(), MessageFormat::Text, at)
    }

    /// Mark this message as an automatic continuation prompt
    #[must_use]
    pub fn into_synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    /// Whether this is genuine conversation content (user or assistant)
    #[must_use]
    pub fn is_conversational(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant)
    }
}

// ============================================================================
// Attachments and Queued Inputs
// ============================================================================

/// File attached to an outgoing user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Path on disk
    pub path: PathBuf,
    /// Display name
    pub name: String,
    /// MIME type, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl Attachment {
    /// Create an attachment named after the file
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            path,
            name,
            mime: None,
        }
    }
}

/// User input waiting for the current turn to finish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInput {
    /// Message text
    pub text: String,
    /// Attachments captured at enqueue time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Queued by the auto-continue policy rather than the user
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl PendingInput {
    /// Create a user-initiated input
    pub fn user(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            text: text.into(),
            attachments,
            synthetic: false,
        }
    }

    /// Create an automatic continuation input
    pub fn synthetic(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
            synthetic: true,
        }
    }
}
