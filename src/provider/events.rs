//! Typed provider events

use serde::{Deserialize, Serialize};

/// Everything a provider can report during a turn
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Fragment of streamed assistant text
    Delta(String),
    /// Progress or bookkeeping that does not change the message log
    Status(StatusEvent),
    /// The turn finished normally
    TurnComplete,
    /// The turn failed mid-stream
    Error(String),
}

impl ProviderEvent {
    /// Whether this event ends the turn
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TurnComplete | Self::Error(_))
    }
}

/// Non-textual progress reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Model is reasoning
    Thinking {
        /// Reasoning summary, when exposed
        #[serde(default)]
        text: Option<String>,
    },
    /// A tool call started
    ToolStarted {
        /// Tool name
        name: String,
        /// Command line, path, or other short description
        #[serde(default)]
        detail: Option<String>,
    },
    /// A tool call finished
    ToolFinished {
        /// Tool name
        name: String,
        /// Whether the tool succeeded
        #[serde(default = "default_true")]
        ok: bool,
    },
    /// A sub-agent or background task is working
    Subagent {
        /// Sub-agent name
        name: String,
        /// What it is doing
        #[serde(default)]
        detail: Option<String>,
    },
    /// The agent updated its plan
    Plan {
        /// Plan summary
        summary: String,
    },
    /// Rate-limit / token counters (opaque to the core)
    Usage {
        /// Provider-specific counters
        usage: serde_json::Value,
    },
    /// Free-form informational notice
    Notice {
        /// Notice text
        message: String,
    },
}

fn default_true() -> bool {
    true
}
