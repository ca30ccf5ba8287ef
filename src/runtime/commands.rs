//! Messages into the runtime event loop
//!
//! Handles talk to the loop through [`RuntimeCommand`]s, each carrying a
//! oneshot channel for its result. Provider tasks report back through
//! [`LoopEvent`]s tagged with the session and the turn or connect attempt
//! they belong to.

use tokio::sync::oneshot;

use crate::error::ProviderError;
use crate::manager::{Effect, SessionManager};
use crate::provider::ProviderEvent;
use crate::types::identifiers::{SessionId, TurnId};

/// Work run against the manager inside the event loop
///
/// The job sends its own result back and returns the effects to execute.
pub(super) type ManagerJob = Box<dyn FnOnce(&mut SessionManager) -> Vec<Effect> + Send>;

/// Commands that can be sent to the runtime event loop
pub(super) enum RuntimeCommand {
    /// Run a job against the manager
    Apply(ManagerJob),

    /// Archive and disconnect every session, then stop the loop
    Shutdown {
        /// Channel to send the shutdown confirmation back
        response_tx: oneshot::Sender<()>,
    },
}

/// Results of provider work spawned by the event loop
#[derive(Debug)]
pub(super) enum LoopEvent {
    /// Preflight plus connect finished
    Connected {
        session_id: SessionId,
        generation: u64,
        result: Result<(), ProviderError>,
    },
    /// One event of a turn's stream
    Provider {
        session_id: SessionId,
        turn: TurnId,
        event: ProviderEvent,
    },
    /// The stream ended without a terminal event
    StreamClosed { session_id: SessionId, turn: TurnId },
    /// `send` itself failed
    SendRejected {
        session_id: SessionId,
        turn: TurnId,
        error: ProviderError,
    },
}
