//! Provider process boundary
//!
//! The core treats every external agent process as an opaque asynchronous
//! collaborator behind [`AgentProvider`]. Raw payloads are validated once by
//! [`parse_event`] and cross into the core only as the closed
//! [`ProviderEvent`] union.

mod events;
mod parser;
mod scripted;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ProviderError;
use crate::types::identifiers::{ModelId, ProviderId, SessionId};
use crate::types::messages::Attachment;
use crate::types::modes::{InteractionMode, PermissionMode, SandboxMode};

pub use events::{ProviderEvent, StatusEvent};
pub use parser::parse_event;
pub use scripted::{ProviderCall, SCRIPTED_PROVIDER_ID, ScriptedProvider, ScriptedTurn};

/// Stream of events for one turn
pub type EventStream = BoxStream<'static, ProviderEvent>;

/// Parameters for opening a session's provider connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRequest {
    /// Session being connected
    pub session_id: SessionId,
    /// Working directory for the provider process
    pub cwd: PathBuf,
    /// Model to run
    pub model: ModelId,
    /// Tool confirmation policy
    pub permission_mode: PermissionMode,
    /// Filesystem access
    pub sandbox: SandboxMode,
}

/// One outgoing user turn
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    /// Session the turn belongs to
    pub session_id: SessionId,
    /// User message text
    pub message: String,
    /// Attached files
    pub attachments: Vec<Attachment>,
    /// Interaction mode for the turn
    pub interaction_mode: InteractionMode,
}

/// Interface to the external agent processes
///
/// Implementations must be cheap to share (`Arc<dyn AgentProvider>`); each
/// call may run concurrently with calls for other sessions.
pub trait AgentProvider: Send + Sync + 'static {
    /// Identity used in diagnostics and remediation messages
    fn id(&self) -> ProviderId;

    /// Readiness preflight (installed, authenticated)
    ///
    /// # Errors
    /// Returns `ProviderError::Unready` with a remediation message
    fn check_ready(&self) -> BoxFuture<'_, Result<(), ProviderError>>;

    /// Open the logical connection for a session
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'_, Result<(), ProviderError>>;

    /// Start a turn and stream its events
    ///
    /// The stream should end after `TurnComplete` or `Error`; a stream that
    /// ends without either is treated as a failed send.
    fn send(&self, request: SendRequest) -> BoxFuture<'_, Result<EventStream, ProviderError>>;

    /// Ask the provider to stop the current turn
    fn interrupt(&self, session_id: SessionId) -> BoxFuture<'_, Result<(), ProviderError>>;

    /// Tear down the session's connection
    fn disconnect(&self, session_id: SessionId) -> BoxFuture<'_, Result<(), ProviderError>>;

    /// Check that a provider answers at all
    fn ping_provider(&self, provider: ProviderId) -> BoxFuture<'_, Result<Duration, ProviderError>>;

    /// Check that a model of a provider answers
    fn ping_model(
        &self,
        provider: ProviderId,
        model: ModelId,
    ) -> BoxFuture<'_, Result<Duration, ProviderError>>;
}
