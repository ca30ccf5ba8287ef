//! Command-line agent transport
//!
//! [`CommandProvider`] implements [`AgentProvider`](crate::provider::AgentProvider)
//! for agent CLIs that speak JSON lines over stdio. Each connected session
//! owns one child process started in the session's workspace with its model,
//! permission mode and sandbox passed as flags.
//!
//! Requests written to stdin:
//!
//! ```text
//! {"type":"user","message":"...","attachments":["/path"],"mode":"agent"}
//! {"type":"interrupt"}
//! ```
//!
//! Events read from stdout are anything [`parse_event`](crate::provider::parse_event)
//! accepts.

mod command;
mod config;
mod process;
mod provider;

pub use config::{CommandSpec, DANGEROUS_ENV_VARS, DEFAULT_CHECK_TIMEOUT_MS, DEFAULT_MAX_BUFFER_SIZE};
pub use provider::CommandProvider;
