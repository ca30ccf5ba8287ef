//! Conversation history
//!
//! Sessions with genuine content are snapshotted into [`HistoryEntry`]s on
//! turn completion and on close. Entries are kept newest first; each
//! workspace keeps at most `max_history_entries` of them.

use std::collections::HashSet;
use std::path::Path;

use super::{Effect, SessionManager};
use crate::error::{PanelError, Result};
use crate::types::history::{DeleteScope, HistoryEntry};
use crate::types::identifiers::{HistoryId, SessionId};
use crate::types::messages::{ChatMessage, Role};
use crate::types::session::{Session, SessionOptions};

/// Longest generated title
const MAX_TITLE_CHARS: usize = 60;

/// Title used when no user text is available
pub const UNTITLED: &str = "New conversation";

/// Produces a short title for a conversation
///
/// Implementations must be deterministic for the same input.
pub trait TitleSummarizer: Send {
    /// Title for a (synthetic-free) message log
    fn summarize(&self, messages: &[ChatMessage]) -> String;
}

/// First line of the first user message, shortened
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTitleSummarizer;

impl TitleSummarizer for DefaultTitleSummarizer {
    fn summarize(&self, messages: &[ChatMessage]) -> String {
        let Some(line) = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .flat_map(|m| m.content.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
        else {
            return UNTITLED.to_string();
        };

        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.chars().count() <= MAX_TITLE_CHARS {
            return collapsed;
        }
        let mut title: String = collapsed.chars().take(MAX_TITLE_CHARS - 1).collect();
        title.truncate(title.trim_end().len());
        title.push('…');
        title
    }
}

/// In-memory history list plus its summarizer
pub(crate) struct HistoryArchiver {
    entries: Vec<HistoryEntry>,
    max_per_workspace: usize,
    summarizer: Box<dyn TitleSummarizer>,
}

impl HistoryArchiver {
    pub(crate) fn new(mut entries: Vec<HistoryEntry>, max_per_workspace: usize) -> Self {
        entries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        let mut archiver = Self {
            entries,
            max_per_workspace,
            summarizer: Box::new(DefaultTitleSummarizer),
        };
        let roots: HashSet<_> = archiver
            .entries
            .iter()
            .map(|e| e.workspace_root.clone())
            .collect();
        for root in roots {
            archiver.trim(&root);
        }
        archiver
    }

    pub(crate) fn set_summarizer(&mut self, summarizer: Box<dyn TitleSummarizer>) {
        self.summarizer = summarizer;
    }

    pub(crate) fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Write the session's snapshot to the front of the list
    ///
    /// Returns `None` when there is nothing worth keeping.
    fn upsert(&mut self, session: &Session, now: chrono::DateTime<chrono::Utc>) -> Option<HistoryId> {
        if !session.has_conversation() {
            return None;
        }
        let messages: Vec<ChatMessage> = session
            .messages
            .iter()
            .filter(|m| !m.synthetic)
            .cloned()
            .collect();

        let id = session.history_id.clone().unwrap_or_else(HistoryId::generate);
        let entry = HistoryEntry {
            id: id.clone(),
            title: self.summarizer.summarize(&messages),
            saved_at: now,
            workspace_root: session.workspace_root.clone(),
            model: session.model.clone(),
            permission_mode: session.permission_mode,
            sandbox: session.sandbox_mode,
            font_scale: session.font_scale,
            messages,
        };

        self.entries.retain(|e| e.id != id);
        self.entries.insert(0, entry);
        self.trim(&session.workspace_root);
        Some(id)
    }

    /// Evict the oldest entries of one workspace beyond the cap
    fn trim(&mut self, root: &Path) {
        let mut kept = 0;
        let max = self.max_per_workspace;
        self.entries.retain(|e| {
            if e.workspace_root != root {
                return true;
            }
            kept += 1;
            kept <= max
        });
    }

    /// Concrete ids a delete request covers
    fn resolve(&self, scope: &DeleteScope) -> Result<HashSet<HistoryId>> {
        match scope {
            DeleteScope::All => Ok(self.entries.iter().map(|e| e.id.clone()).collect()),
            DeleteScope::Entry(id) => {
                let entry = self.find(id)?;
                Ok(HashSet::from([entry.id.clone()]))
            }
            DeleteScope::ThisAndOlder(id) => {
                let anchor = self.find(id)?;
                Ok(self
                    .entries
                    .iter()
                    .filter(|e| {
                        e.workspace_root == anchor.workspace_root && e.saved_at <= anchor.saved_at
                    })
                    .map(|e| e.id.clone())
                    .collect())
            }
        }
    }

    fn find(&self, id: &HistoryId) -> Result<&HistoryEntry> {
        self.entries
            .iter()
            .find(|e| &e.id == id)
            .ok_or_else(|| PanelError::history_not_found(id))
    }
}

impl SessionManager {
    /// Snapshot a session into history if it holds real conversation
    ///
    /// Links the entry back to the session and saves the history list.
    pub(crate) fn archive_session(&mut self, session_id: &SessionId) -> Option<HistoryId> {
        let session = self.sessions.get(session_id)?;
        let id = self.archiver.upsert(session, self.clock.wall())?;
        let title = self
            .archiver
            .entries
            .first()
            .map(|e| e.title.clone())
            .unwrap_or_default();

        if let Some(session) = self.sessions.get_mut(session_id) {
            session.history_id = Some(id.clone());
            if session.title.is_empty() {
                session.title = title;
            }
        }
        log::debug!("[{session_id}] Archived to history entry {id}");
        self.save_history();
        Some(id)
    }

    /// All history entries, newest first
    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        self.archiver.entries()
    }

    /// History entries of one workspace, newest first
    #[must_use]
    pub fn history_for_workspace(&self, root: &Path) -> Vec<&HistoryEntry> {
        self.archiver
            .entries()
            .iter()
            .filter(|e| e.workspace_root == root)
            .collect()
    }

    /// A single history entry
    #[must_use]
    pub fn history_entry(&self, id: &HistoryId) -> Option<&HistoryEntry> {
        self.archiver.find(id).ok()
    }

    /// Delete history entries
    ///
    /// Live sessions bound to a deleted entry are closed first without being
    /// archived again.
    ///
    /// # Errors
    /// Returns `PanelError::HistoryEntryNotFound` if the named entry is unknown
    pub fn delete_history(&mut self, scope: &DeleteScope) -> Result<Vec<Effect>> {
        let ids = self.archiver.resolve(scope)?;

        let bound: Vec<SessionId> = self
            .order
            .iter()
            .filter(|id| {
                self.sessions
                    .get(*id)
                    .and_then(|s| s.history_id.as_ref())
                    .is_some_and(|h| ids.contains(h))
            })
            .cloned()
            .collect();

        let mut effects = Vec::new();
        for session_id in bound {
            effects.extend(self.remove_session(&session_id, false)?);
        }

        self.archiver.entries.retain(|e| !ids.contains(&e.id));
        log::info!("Deleted {} history entries", ids.len());
        self.save_history();
        Ok(effects)
    }

    /// Reopen a history entry as a live session
    ///
    /// Returns the live session already bound to the entry if there is one.
    ///
    /// # Errors
    /// Returns `HistoryEntryNotFound` or `MaxSessionsReached`
    pub fn open_history(&mut self, id: &HistoryId) -> Result<SessionId> {
        if let Some(live) = self.order.iter().find(|sid| {
            self.sessions
                .get(*sid)
                .is_some_and(|s| s.history_id.as_ref() == Some(id))
        }) {
            return Ok(live.clone());
        }

        let entry = self.archiver.find(id)?.clone();
        let mut options = SessionOptions::default()
            .model(entry.model)
            .title(entry.title)
            .permission_mode(entry.permission_mode)
            .sandbox_mode(entry.sandbox);
        options.font_scale = Some(entry.font_scale);
        options.history_id = Some(entry.id);
        options.messages = entry.messages;
        self.create_session(entry.workspace_root, options)
    }
}
