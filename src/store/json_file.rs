//! JSON file store with atomic replace-on-write

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::HistoryStore;
use crate::error::{PanelError, Result};
use crate::types::history::HistoryEntry;
use crate::types::session::AppStateSnapshot;

/// File holding the history array
pub const CHAT_HISTORY_FILE: &str = "chat_history.json";

/// File holding the app state snapshot
pub const APP_STATE_FILE: &str = "app_state.json";

/// Store keeping history and app state as JSON files in one directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Use `dir` for both files; it is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read(&self, name: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PanelError::Io(e)),
        }
    }

    /// Write through a temp file and rename so readers never see half a file
    fn write_atomic(&self, name: &str, contents: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        Ok(())
    }
}

impl HistoryStore for JsonFileStore {
    fn load_chat_history(&self) -> Result<Vec<HistoryEntry>> {
        let Some(raw) = self.read(CHAT_HISTORY_FILE)? else {
            return Ok(Vec::new());
        };

        let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(values) => values,
            Err(e) => {
                log::warn!("Chat history is unreadable, starting empty: {e}");
                return Ok(Vec::new());
            }
        };

        let mut entries = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<HistoryEntry>(value) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("Skipping malformed history entry {index}: {e}"),
            }
        }
        Ok(entries)
    }

    fn save_chat_history(&mut self, entries: &[HistoryEntry]) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        self.write_atomic(CHAT_HISTORY_FILE, &json)
    }

    fn load_app_state(&self) -> Result<Option<AppStateSnapshot>> {
        let Some(raw) = self.read(APP_STATE_FILE)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                log::warn!("App state is unreadable, ignoring it: {e}");
                Ok(None)
            }
        }
    }

    fn save_app_state(&mut self, snapshot: &AppStateSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        self.write_atomic(APP_STATE_FILE, &json)
    }
}
