//! Session mode enumerations
//!
//! Permission and sandbox modes are ordered from most to least restrictive so
//! workspace limits can be applied with a plain `min`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the agent should approach a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Full agentic editing
    #[default]
    Agent,
    /// Produce a plan without editing
    Plan,
    /// Answer questions only
    Ask,
    /// Diagnose a problem
    Debug,
}

/// Whether tool use requires confirmation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionMode {
    /// Ask before running tools
    #[default]
    VerifyFirst,
    /// Run tools without asking
    ProceedAlways,
}

/// Filesystem access granted to the agent process
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    /// No writes
    #[default]
    ReadOnly,
    /// Writes inside the workspace root
    WorkspaceWrite,
}

/// Logical connection from a session to its provider process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No live connection; the next send connects first
    #[default]
    Disconnected,
    /// Preflight/connect in progress
    Connecting,
    /// Ready for turns (idle or streaming, see `Session::streaming`)
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(label)
    }
}
