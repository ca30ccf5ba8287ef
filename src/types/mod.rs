//! Type definitions for the agent panel core
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `HistoryId`, ...)
//! - [`modes`] - Interaction, permission, sandbox and connection enums
//! - [`messages`] - Chat messages, attachments and queued inputs
//! - [`session`] - The session data model and its persisted snapshot
//! - [`history`] - Conversation history entries
//! - [`activity`] - Activity records for the watchdog and status display

pub mod activity;
pub mod history;
pub mod identifiers;
pub mod messages;
pub mod modes;
pub mod session;

pub use activity::{ActivityEntry, ActivityKind, ActivityLabel, ActivityRecord};
pub use history::{DeleteScope, HistoryEntry};
pub use identifiers::{HistoryId, MessageId, ModelId, ProviderId, SessionId, TurnId};
pub use messages::{Attachment, ChatMessage, MessageFormat, PendingInput, Role};
pub use modes::{ConnectionState, InteractionMode, PermissionMode, SandboxMode};
pub use session::{AppStateSnapshot, Session, SessionOptions, SessionSnapshot};
