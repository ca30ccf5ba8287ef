//! # Agent panel session core
//!
//! Concurrency core for running several coding-agent conversations side by
//! side, each in its own panel. It owns the sessions, decides when input is
//! delivered, buffers streamed output, watches for stalled turns, archives
//! conversations and probes provider health. Rendering is left to the
//! caller; external agent processes sit behind the [`AgentProvider`] trait.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use kodegen_agent_panels::{
//!     CommandProvider, CommandSpec, JsonFileStore, ManagerConfig, PanelRuntime, PanelUpdate,
//!     SessionManager, SessionOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     env_logger::init();
//!
//!     let store = JsonFileStore::new("/tmp/panels");
//!     let manager = SessionManager::new(ManagerConfig::default(), Box::new(store))?;
//!     let provider = CommandProvider::new(CommandSpec::new("claude", "claude"));
//!     let handle = PanelRuntime::spawn(manager, Arc::new(provider));
//!
//!     let mut updates = handle.subscribe();
//!     let session = handle.create_session("/work/repo", SessionOptions::default()).await?;
//!     handle.enqueue(&session, "Summarize the README").await?;
//!
//!     while let Ok(update) = updates.recv().await {
//!         if let PanelUpdate::Session { session_id, .. } = update
//!             && let Some(s) = handle.session(&session_id).await?
//!             && !s.streaming
//!         {
//!             break;
//!         }
//!     }
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`manager`]: the synchronous [`SessionManager`]; every operation returns
//!   [`Effect`]s instead of doing I/O
//! - [`runtime`]: the tokio event loop executing effects and timers
//! - [`provider`]: the provider boundary, typed events and a scripted provider
//! - [`transport`]: a provider for JSON-lines agent CLIs
//! - [`probe`]: bounded-concurrency provider/model health checks
//! - [`store`]: history and app-state persistence
//! - [`clock`]: clocks and the timer queue
//! - [`config`]: tunables and per-workspace limits
//! - [`types`]: sessions, messages, history and activity data
//! - [`error`]: error types
//!
//! ## Error Handling
//!
//! Manager operations return [`Result<T, PanelError>`](Result). Provider
//! failures ([`ProviderError`]) never surface as errors from operations;
//! they become status lines, system messages or retries on the session.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod error;
pub mod manager;
pub mod probe;
pub mod provider;
pub mod runtime;
pub mod store;
pub mod transport;
pub mod types;

// Re-export commonly used types for external API
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ManagerConfig, ManagerConfigBuilder, WorkspaceSettings};
pub use error::{PanelError, ProviderError, Result};
pub use manager::{
    ActivityClassifier, ActivitySnapshot, Changes, DefaultActivityClassifier,
    DefaultTitleSummarizer, DefaultTruncationHeuristic, Effect, PanelUpdate, SessionManager,
    TitleSummarizer, TruncationHeuristic,
};
pub use probe::{HealthProbe, ProbeOutcome, ProbeTarget};
pub use provider::{
    AgentProvider, ConnectRequest, EventStream, ProviderCall, ProviderEvent, SCRIPTED_PROVIDER_ID,
    ScriptedProvider, ScriptedTurn, SendRequest, StatusEvent, parse_event,
};
pub use runtime::{PanelHandle, PanelRuntime};
pub use store::{HistoryStore, JsonFileStore, MemoryStore};
pub use transport::{CommandProvider, CommandSpec};

// Re-export type submodules for flat public API
pub use types::activity::{ActivityEntry, ActivityKind, ActivityLabel, ActivityRecord};
pub use types::history::{DeleteScope, HistoryEntry};
pub use types::identifiers::{HistoryId, MessageId, ModelId, ProviderId, SessionId, TurnId};
pub use types::messages::{Attachment, ChatMessage, MessageFormat, PendingInput, Role};
pub use types::modes::{ConnectionState, InteractionMode, PermissionMode, SandboxMode};
pub use types::session::{AppStateSnapshot, Session, SessionOptions, SessionSnapshot};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
