//! Session registry
//!
//! Admission (the live session cap), creation with workspace defaults and
//! limits, closing, workspace rebinding, per-session settings, and the
//! app-state snapshot used to restore sessions across restarts.

use std::path::{Path, PathBuf};

use super::{Changes, Effect, SessionManager};
use crate::error::{PanelError, Result};
use crate::types::identifiers::{ModelId, SessionId};
use crate::types::messages::Attachment;
use crate::types::modes::{ConnectionState, InteractionMode, PermissionMode, SandboxMode};
use crate::types::session::{AppStateSnapshot, Session, SessionOptions, SessionSnapshot};

impl SessionManager {
    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Create a session bound to a workspace
    ///
    /// The model falls back to the workspace default; permission and sandbox
    /// modes are clamped to the workspace limits.
    ///
    /// # Errors
    /// Returns `PanelError::MaxSessionsReached` at the live session cap; no
    /// state changes in that case
    pub fn create_session(
        &mut self,
        workspace_root: impl Into<PathBuf>,
        options: SessionOptions,
    ) -> Result<SessionId> {
        let max = self.config.max_live_sessions;
        if self.sessions.len() >= max {
            log::warn!("Refusing new session: {max} sessions already live");
            return Err(PanelError::MaxSessionsReached(max));
        }

        let workspace_root = workspace_root.into();
        let settings = self.config.workspace_settings(&workspace_root).clone();

        let mut id = SessionId::generate();
        while self.sessions.contains_key(&id) {
            id = SessionId::generate();
        }

        let model = options.model.unwrap_or(settings.default_model);
        let mut session = Session::new(id.clone(), workspace_root, model);
        session.title = options.title.unwrap_or_default();
        session.interaction_mode = options.interaction_mode.unwrap_or_default();
        session.permission_mode = options
            .permission_mode
            .unwrap_or_default()
            .min(settings.max_permission);
        session.sandbox_mode = options
            .sandbox_mode
            .unwrap_or(settings.max_sandbox)
            .min(settings.max_sandbox);
        if let Some(scale) = options.font_scale {
            session.font_scale = scale;
        }
        session.history_id = options.history_id;
        session.messages = options.messages;

        log::info!(
            "[{id}] Created session in {} (model {})",
            session.workspace_root.display(),
            session.model
        );
        self.sessions.insert(id.clone(), session);
        self.order.push(id.clone());
        self.notify(&id, Changes::CREATED);
        self.save_app_state();
        Ok(id)
    }

    /// Close a session
    ///
    /// Pending output is flushed and a non-trivial conversation archived
    /// before the session leaves the live set. The disconnect is best
    /// effort; results still in flight for this session are dropped.
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn close_session(&mut self, session_id: &SessionId) -> Result<Vec<Effect>> {
        self.remove_session(session_id, true)
    }

    pub(crate) fn remove_session(
        &mut self,
        session_id: &SessionId,
        archive: bool,
    ) -> Result<Vec<Effect>> {
        if !self.sessions.contains_key(session_id) {
            return Err(PanelError::session_not_found(session_id));
        }

        self.flush_now(session_id);
        if archive {
            self.archive_session(session_id);
        }
        self.discard_deltas(session_id);
        self.activity.discard(session_id);
        self.watchdog.resolve(session_id);
        self.cancel_connect(session_id);
        self.active_turns.remove(session_id);
        self.sessions.remove(session_id);
        self.order.retain(|id| id != session_id);

        log::info!("[{session_id}] Closed session");
        self.notify(session_id, Changes::CLOSED);
        self.save_app_state();
        Ok(vec![Effect::Disconnect {
            session_id: session_id.clone(),
        }])
    }

    /// Archive every live session and disconnect them all
    ///
    /// Sessions stay in the app-state snapshot so they can be restored.
    #[must_use]
    pub fn shutdown(&mut self) -> Vec<Effect> {
        let ids = self.order.clone();
        for session_id in &ids {
            self.flush_now(session_id);
            self.archive_session(session_id);
            self.discard_deltas(session_id);
            self.cancel_connect(session_id);
        }
        self.save_app_state();
        log::info!("Shut down with {} live sessions", ids.len());
        ids.into_iter()
            .map(|session_id| Effect::Disconnect { session_id })
            .collect()
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// A live session
    #[must_use]
    pub fn session(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Live sessions in creation order
    #[must_use]
    pub fn sessions(&self) -> Vec<&Session> {
        self.order
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .collect()
    }

    /// Number of live sessions
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.sessions.len()
    }

    fn session_mut(&mut self, session_id: &SessionId) -> Result<&mut Session> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| PanelError::session_not_found(session_id))
    }

    // ========================================================================
    // WORKSPACE AND CONNECTION SETTINGS
    // ========================================================================

    /// Point a session at a different workspace
    ///
    /// The connection drops and any turn in flight is abandoned; messages are
    /// kept and the next send connects in the new workspace.
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn set_workspace_root(
        &mut self,
        session_id: &SessionId,
        root: impl Into<PathBuf>,
    ) -> Result<Vec<Effect>> {
        let root = root.into();
        let settings = self.config.workspace_settings(&root).clone();
        let session = self.session_mut(session_id)?;
        if session.workspace_root == root {
            return Ok(Vec::new());
        }
        session.workspace_root = root;
        session.permission_mode = session.permission_mode.min(settings.max_permission);
        session.sandbox_mode = session.sandbox_mode.min(settings.max_sandbox);
        let status = format!(
            "Workspace changed to {}; reconnecting on next send",
            session.workspace_root.display()
        );
        log::info!("[{session_id}] {status}");

        self.watchdog.resolve(session_id);
        self.abandon_turn(session_id);
        let mut effects = self.reset_connection(session_id);
        self.set_status(session_id, status);
        self.notify(session_id, Changes::SETTINGS);
        effects.extend(self.kick(session_id));
        self.save_app_state();
        Ok(effects)
    }

    /// Move every session bound to `old` over to `new`
    #[must_use]
    pub fn rebind_workspace(&mut self, old: &Path, new: &Path) -> Vec<Effect> {
        let bound: Vec<SessionId> = self
            .order
            .iter()
            .filter(|id| self.sessions.get(*id).is_some_and(|s| s.workspace_root == old))
            .cloned()
            .collect();
        bound
            .iter()
            .filter_map(|id| self.set_workspace_root(id, new).ok())
            .flatten()
            .collect()
    }

    /// Drop the provider connection so the next send reconnects
    fn reset_connection(&mut self, session_id: &SessionId) -> Vec<Effect> {
        self.cancel_connect(session_id);
        let Some(session) = self.sessions.get_mut(session_id) else {
            return Vec::new();
        };
        session.stalled = false;
        if session.connection_state == ConnectionState::Disconnected {
            return Vec::new();
        }
        session.connection_state = ConnectionState::Disconnected;
        self.notify(session_id, Changes::CONNECTION);
        vec![Effect::Disconnect {
            session_id: session_id.clone(),
        }]
    }

    /// Change the model; takes effect on the next connect
    ///
    /// # Errors
    /// Returns `SessionNotFound`, or `SessionBusy` while a turn is in flight
    pub fn set_model(&mut self, session_id: &SessionId, model: impl Into<ModelId>) -> Result<Vec<Effect>> {
        let session = self.session_mut(session_id)?;
        if session.streaming {
            return Err(PanelError::session_busy(session_id));
        }
        session.model = model.into();
        let effects = self.reset_connection(session_id);
        self.notify(session_id, Changes::SETTINGS);
        self.save_app_state();
        Ok(effects)
    }

    /// Change permission and sandbox modes, clamped to the workspace limits
    ///
    /// # Errors
    /// Returns `SessionNotFound`, or `SessionBusy` while a turn is in flight
    pub fn set_modes(
        &mut self,
        session_id: &SessionId,
        permission: PermissionMode,
        sandbox: SandboxMode,
    ) -> Result<Vec<Effect>> {
        let root = self
            .session(session_id)
            .map(|s| s.workspace_root.clone())
            .ok_or_else(|| PanelError::session_not_found(session_id))?;
        let settings = self.config.workspace_settings(&root).clone();

        let session = self.session_mut(session_id)?;
        if session.streaming {
            return Err(PanelError::session_busy(session_id));
        }
        let permission = permission.min(settings.max_permission);
        let sandbox = sandbox.min(settings.max_sandbox);
        if session.permission_mode == permission && session.sandbox_mode == sandbox {
            return Ok(Vec::new());
        }
        session.permission_mode = permission;
        session.sandbox_mode = sandbox;
        let effects = self.reset_connection(session_id);
        self.notify(session_id, Changes::SETTINGS);
        self.save_app_state();
        Ok(effects)
    }

    // ========================================================================
    // PRESENTATION STATE
    // ========================================================================

    /// Change the interaction mode used by the next turn
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn set_interaction_mode(&mut self, session_id: &SessionId, mode: InteractionMode) -> Result<()> {
        self.session_mut(session_id)?.interaction_mode = mode;
        self.notify(session_id, Changes::SETTINGS);
        Ok(())
    }

    /// Replace the composer draft
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn set_draft(&mut self, session_id: &SessionId, text: impl Into<String>) -> Result<()> {
        self.session_mut(session_id)?.input_draft = text.into();
        self.notify(session_id, Changes::DRAFT);
        Ok(())
    }

    /// Stage an attachment for the next send
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn stage_attachment(&mut self, session_id: &SessionId, attachment: Attachment) -> Result<()> {
        self.session_mut(session_id)?.attachments.push(attachment);
        self.notify(session_id, Changes::DRAFT);
        Ok(())
    }

    /// Drop all staged attachments
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn clear_attachments(&mut self, session_id: &SessionId) -> Result<()> {
        self.session_mut(session_id)?.attachments.clear();
        self.notify(session_id, Changes::DRAFT);
        Ok(())
    }

    /// Change the panel text scale
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn set_font_scale(&mut self, session_id: &SessionId, scale: f32) -> Result<()> {
        self.session_mut(session_id)?.font_scale = scale;
        self.notify(session_id, Changes::SETTINGS);
        self.save_app_state();
        Ok(())
    }

    /// Rename a session
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn set_title(&mut self, session_id: &SessionId, title: impl Into<String>) -> Result<()> {
        self.session_mut(session_id)?.title = title.into();
        self.notify(session_id, Changes::SETTINGS);
        self.save_app_state();
        Ok(())
    }

    // ========================================================================
    // APP STATE
    // ========================================================================

    /// Restorable state of every live session, in creation order
    #[must_use]
    pub fn snapshot_state(&self) -> AppStateSnapshot {
        AppStateSnapshot {
            sessions: self
                .sessions()
                .into_iter()
                .map(SessionSnapshot::from)
                .collect(),
        }
    }

    /// Recreate sessions from a snapshot
    ///
    /// Sessions beyond the live cap are dropped. Restored sessions start
    /// disconnected; queued inputs are sent right away.
    #[must_use]
    pub fn restore_state(&mut self, snapshot: AppStateSnapshot) -> Vec<Effect> {
        let mut effects = Vec::new();
        for saved in snapshot.sessions {
            let mut options = SessionOptions::default()
                .model(saved.model)
                .title(saved.title)
                .interaction_mode(saved.interaction_mode)
                .permission_mode(saved.permission_mode)
                .sandbox_mode(saved.sandbox_mode);
            options.font_scale = Some(saved.font_scale);
            options.history_id = saved.history_id;
            options.messages = saved.messages;

            let session_id = match self.create_session(saved.workspace_root, options) {
                Ok(id) => id,
                Err(e) => {
                    log::warn!("Dropping restored session: {e}");
                    continue;
                }
            };
            if let Some(session) = self.sessions.get_mut(&session_id) {
                session.input_draft = saved.input_draft;
                session.pending_inputs = saved.pending_inputs.into();
            }
            effects.extend(self.kick(&session_id));
        }
        self.save_app_state();
        effects
    }

    /// Load and restore the app state saved by a previous run
    #[must_use]
    pub fn restore_from_store(&mut self) -> Vec<Effect> {
        match self.store.load_app_state() {
            Ok(Some(snapshot)) => {
                log::info!("Restoring {} sessions", snapshot.sessions.len());
                self.restore_state(snapshot)
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("Failed to load app state: {e}");
                Vec::new()
            }
        }
    }
}
