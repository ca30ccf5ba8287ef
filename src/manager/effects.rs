//! Effects and update notifications
//!
//! Manager operations never perform provider I/O themselves. They return
//! [`Effect`]s for the runtime to execute and broadcast [`PanelUpdate`]s for
//! the presentation layer.

use bitflags::bitflags;

use crate::probe::{ProbeOutcome, ProbeTarget};
use crate::provider::{ConnectRequest, SendRequest};
use crate::types::activity::ActivityEntry;
use crate::types::identifiers::{SessionId, TurnId};

/// Provider-boundary work requested by the manager
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Run the readiness preflight, then connect
    Connect {
        /// Session being connected
        session_id: SessionId,
        /// Attempt generation; stale results are ignored
        generation: u64,
        /// Connection parameters
        request: ConnectRequest,
    },
    /// Start a turn and stream its events back tagged with `turn`
    Send {
        /// Session sending
        session_id: SessionId,
        /// Turn the events belong to
        turn: TurnId,
        /// Outgoing message
        request: SendRequest,
    },
    /// Ask the provider to stop the current turn (best effort)
    Interrupt {
        /// Session to interrupt
        session_id: SessionId,
    },
    /// Tear down the provider connection (best effort)
    Disconnect {
        /// Session to disconnect
        session_id: SessionId,
    },
}

impl Effect {
    /// Session the effect targets
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Connect { session_id, .. }
            | Self::Send { session_id, .. }
            | Self::Interrupt { session_id }
            | Self::Disconnect { session_id } => session_id,
        }
    }
}

bitflags! {
    /// Which parts of a session changed
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Changes: u32 {
        /// Session was created
        const CREATED = 1 << 0;
        /// Session was closed
        const CLOSED = 1 << 1;
        /// Message log changed
        const MESSAGES = 1 << 2;
        /// Status text changed
        const STATUS = 1 << 3;
        /// Pending inputs changed
        const QUEUE = 1 << 4;
        /// Connection state changed
        const CONNECTION = 1 << 5;
        /// Streaming flag changed
        const STREAMING = 1 << 6;
        /// Draft or staged attachments changed
        const DRAFT = 1 << 7;
        /// Model, modes, title, font scale or workspace changed
        const SETTINGS = 1 << 8;
    }
}

/// Throttled view of a session's activity record
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySnapshot {
    /// Label of the last event
    pub last_event_label: String,
    /// Total events observed
    pub total_events: u64,
    /// Newest first
    pub recent: Vec<ActivityEntry>,
    /// The turn reported done and no background work followed
    pub turn_complete: bool,
}

/// Notification for observers of the core
#[derive(Debug, Clone, PartialEq)]
pub enum PanelUpdate {
    /// Session state changed
    Session {
        /// Session that changed
        session_id: SessionId,
        /// What changed
        changes: Changes,
    },
    /// Activity snapshot (published at a fixed cadence)
    Activity {
        /// Session the snapshot belongs to
        session_id: SessionId,
        /// Snapshot
        snapshot: ActivitySnapshot,
    },
    /// History list changed
    History {
        /// Entries after the change
        entries: usize,
    },
    /// A health probe finished
    Probe {
        /// Probed target
        target: ProbeTarget,
        /// Result
        outcome: ProbeOutcome,
    },
}
