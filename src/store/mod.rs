//! Persistence boundary
//!
//! The core loads chat history and app state once at startup and saves them
//! whenever they change. The on-disk schema belongs to the store; the core
//! only needs these four calls. Failures are logged by the caller and never
//! abort a state update.

mod json_file;
mod memory;

use crate::error::Result;
use crate::types::history::HistoryEntry;
use crate::types::session::AppStateSnapshot;

pub use json_file::{APP_STATE_FILE, CHAT_HISTORY_FILE, JsonFileStore};
pub use memory::MemoryStore;

/// Storage for conversation history and application state
pub trait HistoryStore: Send {
    /// Load every readable history entry; malformed entries are skipped
    ///
    /// # Errors
    /// Returns error only when the backing storage cannot be read at all
    fn load_chat_history(&self) -> Result<Vec<HistoryEntry>>;

    /// Replace the stored history
    ///
    /// # Errors
    /// Returns error if the history cannot be written
    fn save_chat_history(&mut self, entries: &[HistoryEntry]) -> Result<()>;

    /// Load the last saved app state, if any
    ///
    /// # Errors
    /// Returns error only when the backing storage cannot be read at all
    fn load_app_state(&self) -> Result<Option<AppStateSnapshot>>;

    /// Replace the stored app state
    ///
    /// # Errors
    /// Returns error if the state cannot be written
    fn save_app_state(&mut self, snapshot: &AppStateSnapshot) -> Result<()>;
}
