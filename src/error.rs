//! Error types for the agent panel core

use thiserror::Error;

use crate::types::identifiers::{HistoryId, ProviderId, SessionId};

/// Main error type for session manager operations
#[derive(Error, Debug)]
pub enum PanelError {
    /// Live session cap reached; the create request was rejected
    #[error("Maximum live sessions reached: {0}")]
    MaxSessionsReached(usize),

    /// Session id is not in the live set
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// History entry id is unknown
    #[error("History entry not found: {0}")]
    HistoryEntryNotFound(HistoryId),

    /// Operation requires an idle session but a turn is in flight
    #[error("Session {0} has a turn in flight")]
    SessionBusy(SessionId),

    /// Queue index does not address a pending input
    #[error("Queued input {index} does not exist (queue length {len})")]
    QueueIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Current queue length
        len: usize,
    },

    /// No sent user message is available to recall
    #[error("Session {0} has no user message to recall")]
    NothingToRecall(SessionId),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The runtime event loop is no longer running
    #[error("Panel runtime is closed")]
    RuntimeClosed,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for panel operations
pub type Result<T> = std::result::Result<T, PanelError>;

impl PanelError {
    /// Create a session not found error
    pub fn session_not_found(id: &SessionId) -> Self {
        Self::SessionNotFound(id.clone())
    }

    /// Create a history entry not found error
    pub fn history_not_found(id: &HistoryId) -> Self {
        Self::HistoryEntryNotFound(id.clone())
    }

    /// Create a session busy error
    pub fn session_busy(id: &SessionId) -> Self {
        Self::SessionBusy(id.clone())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Failures raised at the provider process boundary
///
/// These never propagate into session state updates as errors; the manager
/// turns each one into a status line, a system message, or a retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Provider is not installed or not authenticated
    #[error("{provider} is not ready: {remediation}")]
    Unready {
        /// Provider that failed the preflight
        provider: ProviderId,
        /// What the user should do about it
        remediation: String,
    },

    /// Connection attempt failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Transport error while a turn was streaming
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Provider emitted a payload that could not be validated
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Provider process I/O failure
    #[error("IO error: {0}")]
    Io(String),

    /// Provider call timed out
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl ProviderError {
    /// Create a provider-not-ready error
    pub fn unready(provider: impl Into<ProviderId>, remediation: impl Into<String>) -> Self {
        Self::Unready {
            provider: provider.into(),
            remediation: remediation.into(),
        }
    }

    /// Create a connection failure
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Create a mid-turn send failure
    pub fn send(msg: impl Into<String>) -> Self {
        Self::SendFailed(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Message without the category prefix
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Unready { remediation, .. } => remediation.clone(),
            Self::ConnectionFailed(msg)
            | Self::SendFailed(msg)
            | Self::Protocol(msg)
            | Self::Io(msg)
            | Self::Timeout(msg) => msg.clone(),
        }
    }

    /// Whether retrying the same connect can succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unready { .. })
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
