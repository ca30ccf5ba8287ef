//! In-memory store

use parking_lot::Mutex;
use std::sync::Arc;

use super::HistoryStore;
use crate::error::Result;
use crate::types::history::HistoryEntry;
use crate::types::session::AppStateSnapshot;

#[derive(Debug, Default)]
struct MemoryState {
    history: Vec<HistoryEntry>,
    app_state: Option<AppStateSnapshot>,
    history_saves: usize,
}

/// Store that keeps everything in memory
///
/// Clones share the same contents, so a test can keep one handle and give
/// another to the manager.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with history entries
    #[must_use]
    pub fn with_history(entries: Vec<HistoryEntry>) -> Self {
        let store = Self::new();
        store.state.lock().history = entries;
        store
    }

    /// Current stored history
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().history.clone()
    }

    /// Current stored app state
    #[must_use]
    pub fn app_state(&self) -> Option<AppStateSnapshot> {
        self.state.lock().app_state.clone()
    }

    /// Number of history saves performed
    #[must_use]
    pub fn history_saves(&self) -> usize {
        self.state.lock().history_saves
    }
}

impl HistoryStore for MemoryStore {
    fn load_chat_history(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.state.lock().history.clone())
    }

    fn save_chat_history(&mut self, entries: &[HistoryEntry]) -> Result<()> {
        let mut state = self.state.lock();
        state.history = entries.to_vec();
        state.history_saves += 1;
        Ok(())
    }

    fn load_app_state(&self) -> Result<Option<AppStateSnapshot>> {
        Ok(self.state.lock().app_state.clone())
    }

    fn save_app_state(&mut self, snapshot: &AppStateSnapshot) -> Result<()> {
        self.state.lock().app_state = Some(snapshot.clone());
        Ok(())
    }
}
