//! Async runtime around the session manager
//!
//! [`PanelRuntime::spawn`] moves a [`SessionManager`] into a tokio task and
//! returns a cloneable [`PanelHandle`]. The handle is the presentation
//! layer's entry point: it forwards operations to the event loop, exposes
//! state snapshots, runs health probes and streams [`PanelUpdate`]s.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kodegen_agent_panels::{
//!     ManagerConfig, MemoryStore, PanelRuntime, ScriptedProvider, SessionManager, SessionOptions,
//! };
//!
//! # async fn example() -> kodegen_agent_panels::Result<()> {
//! let manager = SessionManager::new(ManagerConfig::default(), Box::new(MemoryStore::new()))?;
//! let handle = PanelRuntime::spawn(manager, Arc::new(ScriptedProvider::new()));
//!
//! let session = handle.create_session("/work/repo", SessionOptions::default()).await?;
//! handle.enqueue(&session, "Explain the build script").await?;
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod commands;
mod event_loop;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{PanelError, Result};
use crate::manager::{Effect, PanelUpdate, SessionManager};
use crate::probe::{HealthProbe, ProbeOutcome, ProbeTarget};
use crate::provider::AgentProvider;
use crate::types::activity::ActivityRecord;
use crate::types::history::{DeleteScope, HistoryEntry};
use crate::types::identifiers::{HistoryId, SessionId};
use crate::types::messages::Attachment;
use crate::types::session::{Session, SessionOptions};

use commands::{ManagerJob, RuntimeCommand};
use event_loop::EventLoop;

/// Spawns the event loop that drives a [`SessionManager`]
#[derive(Debug, Clone, Copy)]
pub struct PanelRuntime;

impl PanelRuntime {
    /// Start the event loop on the current tokio runtime
    ///
    /// Runs the startup health probe in the background when the
    /// configuration asks for one.
    pub fn spawn(manager: SessionManager, provider: Arc<dyn AgentProvider>) -> PanelHandle {
        let config = manager.config().clone();
        let updates = manager.update_sender();
        let probe = HealthProbe::new(config.probe_concurrency).with_updates(updates.clone());
        let cancel = CancellationToken::new();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let event_loop = EventLoop {
            manager,
            provider: Arc::clone(&provider),
            command_rx,
            event_tx,
            event_rx,
            cancel: cancel.clone(),
        };
        tokio::spawn(event_loop.run());

        if config.probe_on_startup && !config.probe_targets.is_empty() {
            let probe = probe.clone();
            let provider = Arc::clone(&provider);
            let cancel = cancel.clone();
            let targets = config.probe_targets;
            tokio::spawn(async move {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    _ = probe.probe_all(provider.as_ref(), targets) => {}
                }
            });
        }

        PanelHandle {
            command_tx,
            updates,
            probe,
            provider,
            cancel,
        }
    }
}

/// Cloneable handle to a running [`PanelRuntime`]
#[derive(Clone)]
pub struct PanelHandle {
    command_tx: mpsc::UnboundedSender<RuntimeCommand>,
    updates: broadcast::Sender<PanelUpdate>,
    probe: HealthProbe,
    provider: Arc<dyn AgentProvider>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PanelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelHandle")
            .field("provider", &self.provider.id())
            .field("closed", &self.command_tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl PanelHandle {
    /// Run a closure against the manager inside the event loop
    ///
    /// The closure returns its value plus any effects to execute.
    ///
    /// # Errors
    /// Returns `PanelError::RuntimeClosed` if the loop has stopped
    pub async fn with_manager<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut SessionManager) -> (R, Vec<Effect>) + Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        let job: ManagerJob = Box::new(move |manager| {
            let (value, effects) = f(manager);
            let _ = response_tx.send(value);
            effects
        });
        self.command_tx
            .send(RuntimeCommand::Apply(job))
            .map_err(|_| PanelError::RuntimeClosed)?;
        response_rx.await.map_err(|_| PanelError::RuntimeClosed)
    }

    /// Run a fallible manager operation that produces effects
    async fn run<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut SessionManager) -> Result<Vec<Effect>> + Send + 'static,
    {
        self.with_manager(move |manager| match f(manager) {
            Ok(effects) => (Ok(()), effects),
            Err(e) => (Err(e), Vec::new()),
        })
        .await?
    }

    /// Run a manager operation that produces no effects
    async fn query<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut SessionManager) -> R + Send + 'static,
    {
        self.with_manager(move |manager| (f(manager), Vec::new()))
            .await
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    /// Create a session
    ///
    /// # Errors
    /// Returns `MaxSessionsReached` at the live cap, or `RuntimeClosed`
    pub async fn create_session(
        &self,
        workspace_root: impl Into<PathBuf>,
        options: SessionOptions,
    ) -> Result<SessionId> {
        let root = workspace_root.into();
        self.query(move |m| m.create_session(root, options)).await?
    }

    /// Close a session
    ///
    /// # Errors
    /// Returns `SessionNotFound` or `RuntimeClosed`
    pub async fn close_session(&self, session_id: &SessionId) -> Result<()> {
        let id = session_id.clone();
        self.run(move |m| m.close_session(&id)).await
    }

    /// Submit user input
    ///
    /// # Errors
    /// Returns `SessionNotFound` or `RuntimeClosed`
    pub async fn enqueue(&self, session_id: &SessionId, text: impl Into<String>) -> Result<()> {
        let id = session_id.clone();
        let text = text.into();
        self.run(move |m| m.enqueue(&id, text)).await
    }

    /// Stop the current turn
    ///
    /// # Errors
    /// Returns `SessionNotFound` or `RuntimeClosed`
    pub async fn interrupt(&self, session_id: &SessionId) -> Result<()> {
        let id = session_id.clone();
        self.run(move |m| m.interrupt(&id)).await
    }

    /// Pull a queued input back into the draft
    ///
    /// # Errors
    /// Returns `SessionNotFound`, `QueueIndexOutOfRange` or `RuntimeClosed`
    pub async fn edit_queued(&self, session_id: &SessionId, index: usize) -> Result<String> {
        let id = session_id.clone();
        self.query(move |m| m.edit_queued(&id, index)).await?
    }

    /// Pull the last sent user message back into the draft
    ///
    /// # Errors
    /// Returns `SessionNotFound`, `SessionBusy`, `NothingToRecall` or
    /// `RuntimeClosed`
    pub async fn recall_last(&self, session_id: &SessionId) -> Result<String> {
        let id = session_id.clone();
        self.query(move |m| m.recall_last(&id)).await?
    }

    /// Point a session at another workspace
    ///
    /// # Errors
    /// Returns `SessionNotFound` or `RuntimeClosed`
    pub async fn set_workspace_root(
        &self,
        session_id: &SessionId,
        root: impl Into<PathBuf>,
    ) -> Result<()> {
        let id = session_id.clone();
        let root = root.into();
        self.run(move |m| m.set_workspace_root(&id, root)).await
    }

    /// Replace the composer draft
    ///
    /// # Errors
    /// Returns `SessionNotFound` or `RuntimeClosed`
    pub async fn set_draft(&self, session_id: &SessionId, text: impl Into<String>) -> Result<()> {
        let id = session_id.clone();
        let text = text.into();
        self.query(move |m| m.set_draft(&id, text)).await?
    }

    /// Stage an attachment for the next send
    ///
    /// # Errors
    /// Returns `SessionNotFound` or `RuntimeClosed`
    pub async fn stage_attachment(&self, session_id: &SessionId, attachment: Attachment) -> Result<()> {
        let id = session_id.clone();
        self.query(move |m| m.stage_attachment(&id, attachment)).await?
    }

    /// Restore sessions saved by a previous run
    ///
    /// # Errors
    /// Returns `RuntimeClosed` if the loop has stopped
    pub async fn restore_app_state(&self) -> Result<usize> {
        self.with_manager(|m| {
            let effects = m.restore_from_store();
            (m.live_count(), effects)
        })
        .await
    }

    /// Snapshot of one session
    ///
    /// # Errors
    /// Returns `RuntimeClosed` if the loop has stopped
    pub async fn session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        let id = session_id.clone();
        self.query(move |m| m.session(&id).cloned()).await
    }

    /// Snapshots of every live session, in creation order
    ///
    /// # Errors
    /// Returns `RuntimeClosed` if the loop has stopped
    pub async fn sessions(&self) -> Result<Vec<Session>> {
        self.query(|m| m.sessions().into_iter().cloned().collect())
            .await
    }

    /// Activity record of a session
    ///
    /// # Errors
    /// Returns `RuntimeClosed` if the loop has stopped
    pub async fn activity(&self, session_id: &SessionId) -> Result<Option<ActivityRecord>> {
        let id = session_id.clone();
        self.query(move |m| m.activity(&id).cloned()).await
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    /// History entries, newest first
    ///
    /// # Errors
    /// Returns `RuntimeClosed` if the loop has stopped
    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        self.query(|m| m.history().to_vec()).await
    }

    /// Delete history entries
    ///
    /// # Errors
    /// Returns `HistoryEntryNotFound` or `RuntimeClosed`
    pub async fn delete_history(&self, scope: DeleteScope) -> Result<()> {
        self.run(move |m| m.delete_history(&scope)).await
    }

    /// Reopen a history entry as a live session
    ///
    /// # Errors
    /// Returns `HistoryEntryNotFound`, `MaxSessionsReached` or `RuntimeClosed`
    pub async fn open_history(&self, history_id: &HistoryId) -> Result<SessionId> {
        let id = history_id.clone();
        self.query(move |m| m.open_history(&id)).await?
    }

    // ========================================================================
    // PROBING AND OBSERVATION
    // ========================================================================

    /// Probe provider/model targets with bounded concurrency
    pub async fn probe_all(
        &self,
        targets: impl IntoIterator<Item = ProbeTarget>,
    ) -> HashMap<ProbeTarget, ProbeOutcome> {
        self.probe.probe_all(self.provider.as_ref(), targets).await
    }

    /// Latest probe outcome per target
    #[must_use]
    pub fn probe_results(&self) -> HashMap<ProbeTarget, ProbeOutcome> {
        self.probe.results()
    }

    /// Probe targets not yet finished
    #[must_use]
    pub fn probe_pending(&self) -> HashSet<ProbeTarget> {
        self.probe.pending()
    }

    /// Subscribe to state updates
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PanelUpdate> {
        self.updates.subscribe()
    }

    /// Whether the event loop has stopped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Archive and disconnect every session, then stop the event loop
    ///
    /// Returns once the loop has finished; a loop that already stopped
    /// counts as shut down.
    pub async fn shutdown(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .command_tx
            .send(RuntimeCommand::Shutdown { response_tx })
            .is_err()
        {
            self.cancel.cancel();
            return;
        }
        let _ = response_rx.await;
    }
}
