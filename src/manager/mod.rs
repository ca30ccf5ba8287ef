//! Session manager
//!
//! One [`SessionManager`] owns every live session together with the
//! per-session buffers, timers, activity records and connection bookkeeping
//! that the concurrency logic needs. It never awaits: operations mutate state
//! synchronously and return [`Effect`]s describing provider work for the
//! runtime to carry out. Results flow back through
//! [`SessionManager::on_connect_result`], [`SessionManager::on_provider_event`]
//! and [`SessionManager::on_stream_closed`], each guarded against stale
//! results by session id and turn (or attempt) generation.
//!
//! The implementation is split by concern:
//!
//! - `registry`: create/close sessions, workspace rebinding, settings
//! - `coalescer`: delta buffering and flush
//! - `activity`: per-session activity records and throttled publishing
//! - `watchdog`: periodic stall sweep
//! - `connection`: connect/retry/reconnect/interrupt state machine
//! - `queue`: single-flight turns and FIFO input delivery
//! - `auto_continue`: bounded re-prompting of truncated turns
//! - `archiver`: history upsert, deletion and reopening

mod activity;
mod archiver;
mod auto_continue;
mod coalescer;
mod connection;
mod effects;
mod queue;
mod registry;
mod watchdog;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use crate::clock::{Clock, SystemClock, TimerQueue, TimerTask};
use crate::config::ManagerConfig;
use crate::error::Result;
use crate::provider::SendRequest;
use crate::store::HistoryStore;
use crate::types::identifiers::SessionId;
use crate::types::session::Session;

pub use activity::{ActivityClassifier, DefaultActivityClassifier};
pub use archiver::{DefaultTitleSummarizer, TitleSummarizer};
pub use auto_continue::{DefaultTruncationHeuristic, TruncationHeuristic};
pub use effects::{ActivitySnapshot, Changes, Effect, PanelUpdate};

use activity::ActivityTracker;
use archiver::HistoryArchiver;
use coalescer::DeltaCoalescer;
use connection::ConnectionTable;
use watchdog::StallWatchdog;

/// Capacity of the update broadcast channel
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Owner of all live sessions and their concurrency state
pub struct SessionManager {
    config: ManagerConfig,
    clock: Arc<dyn Clock>,
    timers: TimerQueue,
    sessions: HashMap<SessionId, Session>,
    /// Creation order of live sessions
    order: Vec<SessionId>,
    /// Outgoing request of each session's in-flight turn
    active_turns: HashMap<SessionId, SendRequest>,
    coalescer: DeltaCoalescer,
    activity: ActivityTracker,
    watchdog: StallWatchdog,
    connections: ConnectionTable,
    archiver: HistoryArchiver,
    truncation: Box<dyn TruncationHeuristic>,
    store: Box<dyn HistoryStore>,
    updates: broadcast::Sender<PanelUpdate>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.order)
            .field("timers", &self.timers.len())
            .field("history", &self.archiver.entries().len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager on the system clock and load history from `store`
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn new(config: ManagerConfig, store: Box<dyn HistoryStore>) -> Result<Self> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Create a manager on an explicit clock
    ///
    /// History is loaded once here; an unreadable store starts empty.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn with_clock(
        config: ManagerConfig,
        store: Box<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let entries = store.load_chat_history().unwrap_or_else(|e| {
            log::warn!("Failed to load chat history, starting empty: {e}");
            Vec::new()
        });
        log::debug!("Loaded {} history entries", entries.len());

        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let mut manager = Self {
            archiver: HistoryArchiver::new(entries, config.max_history_entries),
            activity: ActivityTracker::new(config.activity_coalesce_window),
            config,
            clock,
            timers: TimerQueue::new(),
            sessions: HashMap::new(),
            order: Vec::new(),
            active_turns: HashMap::new(),
            coalescer: DeltaCoalescer::default(),
            watchdog: StallWatchdog::default(),
            connections: ConnectionTable::default(),
            truncation: Box::new(DefaultTruncationHeuristic),
            store,
            updates,
        };
        manager.arm_watchdog();
        Ok(manager)
    }

    /// Replace the activity classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: Box<dyn ActivityClassifier>) -> Self {
        self.activity.set_classifier(classifier);
        self
    }

    /// Replace the truncation heuristic used by auto-continue
    #[must_use]
    pub fn with_truncation_heuristic(mut self, heuristic: Box<dyn TruncationHeuristic>) -> Self {
        self.truncation = heuristic;
        self
    }

    /// Replace the history title summarizer
    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Box<dyn TitleSummarizer>) -> Self {
        self.archiver.set_summarizer(summarizer);
        self
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Subscribe to state change notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PanelUpdate> {
        self.updates.subscribe()
    }

    /// Sender side of the update channel, shared with the probe pool
    #[must_use]
    pub fn update_sender(&self) -> broadcast::Sender<PanelUpdate> {
        self.updates.clone()
    }

    // ========================================================================
    // TIMERS
    // ========================================================================

    /// Earliest pending timer deadline
    #[must_use]
    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Run every timer whose deadline has passed
    #[must_use]
    pub fn run_due_timers(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        while let Some((handle, task)) = self.timers.pop_due(self.clock.now()) {
            match task {
                TimerTask::FlushDeltas(session_id) => {
                    self.coalescer.timer_fired(&session_id, handle);
                    self.flush(&session_id);
                }
                TimerTask::WatchdogSweep => {
                    effects.extend(self.sweep());
                    self.arm_watchdog();
                }
                TimerTask::PublishActivity => self.publish_activity(),
                TimerTask::RetryConnect(session_id) => {
                    effects.extend(self.retry_connect(&session_id, handle));
                }
            }
        }
        effects
    }

    // ========================================================================
    // NOTIFICATION AND PERSISTENCE HELPERS
    // ========================================================================

    fn notify(&self, session_id: &SessionId, changes: Changes) {
        // No receivers is fine
        let _ = self.updates.send(PanelUpdate::Session {
            session_id: session_id.clone(),
            changes,
        });
    }

    fn save_app_state(&mut self) {
        let snapshot = self.snapshot_state();
        if let Err(e) = self.store.save_app_state(&snapshot) {
            log::warn!("Failed to save app state: {e}");
        }
    }

    fn save_history(&mut self) {
        if let Err(e) = self.store.save_chat_history(self.archiver.entries()) {
            log::warn!("Failed to save chat history: {e}");
        }
        let _ = self.updates.send(PanelUpdate::History {
            entries: self.archiver.entries().len(),
        });
    }

    fn set_status(&mut self, session_id: &SessionId, status: impl Into<String>) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.status = status.into();
            self.notify(session_id, Changes::STATUS);
        }
    }
}
