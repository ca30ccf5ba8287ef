//! Connection state machine
//!
//! `Disconnected -> Connecting -> Connected`, with `Session::streaming`
//! distinguishing idle from streaming once connected. Errors and stalls drop
//! a session back to `Disconnected`; the next send reconnects it.
//!
//! Connect attempts are tagged with a generation number. A result whose
//! generation no longer matches the session's slot (the session closed, was
//! rebound, or started a newer attempt) is ignored.

use std::collections::HashMap;

use super::{Changes, Effect, SessionManager};
use crate::clock::{TimerHandle, TimerTask};
use crate::error::{PanelError, ProviderError, Result};
use crate::provider::ConnectRequest;
use crate::types::identifiers::SessionId;
use crate::types::messages::{ChatMessage, Role};
use crate::types::modes::ConnectionState;

/// Bookkeeping for one in-progress `connect_with_retry`
#[derive(Debug)]
struct ConnectSlot {
    generation: u64,
    attempt: u32,
    max_attempts: u32,
    retry_timer: Option<TimerHandle>,
}

/// In-progress connects keyed by session
#[derive(Debug, Default)]
pub(crate) struct ConnectionTable {
    slots: HashMap<SessionId, ConnectSlot>,
    next_generation: u64,
}

impl ConnectionTable {
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    pub(crate) fn is_connecting(&self, session_id: &SessionId) -> bool {
        self.slots.contains_key(session_id)
    }
}

impl SessionManager {
    /// Connect a session with a single attempt
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn connect(&mut self, session_id: &SessionId) -> Result<Vec<Effect>> {
        self.connect_with_retry(session_id, 1)
    }

    /// Connect a session, retrying up to `max_attempts` times
    ///
    /// Joins an attempt already in progress instead of starting another.
    /// A provider that reports itself unready stops the retries at once.
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn connect_with_retry(
        &mut self,
        session_id: &SessionId,
        max_attempts: u32,
    ) -> Result<Vec<Effect>> {
        if !self.sessions.contains_key(session_id) {
            return Err(PanelError::session_not_found(session_id));
        }
        if self.connections.is_connecting(session_id) {
            return Ok(Vec::new());
        }

        let generation = self.connections.next_generation();
        self.connections.slots.insert(
            session_id.clone(),
            ConnectSlot {
                generation,
                attempt: 1,
                max_attempts: max_attempts.max(1),
                retry_timer: None,
            },
        );

        if let Some(session) = self.sessions.get_mut(session_id) {
            session.connection_state = ConnectionState::Connecting;
            session.status = String::from("Connecting…");
        }
        self.notify(session_id, Changes::CONNECTION | Changes::STATUS);
        log::debug!("[{session_id}] Connecting (up to {max_attempts} attempts)");

        Ok(self.connect_effect(session_id, generation).into_iter().collect())
    }

    fn connect_effect(&self, session_id: &SessionId, generation: u64) -> Option<Effect> {
        let session = self.sessions.get(session_id)?;
        Some(Effect::Connect {
            session_id: session_id.clone(),
            generation,
            request: ConnectRequest {
                session_id: session_id.clone(),
                cwd: session.workspace_root.clone(),
                model: session.model.clone(),
                permission_mode: session.permission_mode,
                sandbox: session.sandbox_mode,
            },
        })
    }

    pub(crate) fn retry_connect(&mut self, session_id: &SessionId, fired: TimerHandle) -> Vec<Effect> {
        let next = self.connections.next_generation();
        let Some(slot) = self.connections.slots.get_mut(session_id) else {
            return Vec::new();
        };
        if slot.retry_timer != Some(fired) {
            return Vec::new();
        }
        slot.retry_timer = None;
        slot.attempt += 1;
        slot.generation = next;
        log::debug!(
            "[{session_id}] Connect attempt {}/{}",
            slot.attempt,
            slot.max_attempts
        );
        self.connect_effect(session_id, next).into_iter().collect()
    }

    /// Drop any in-progress connect for a session
    pub(crate) fn cancel_connect(&mut self, session_id: &SessionId) {
        if let Some(slot) = self.connections.slots.remove(session_id)
            && let Some(handle) = slot.retry_timer
        {
            self.timers.cancel(handle);
        }
    }

    /// Apply the outcome of a connect attempt
    ///
    /// On success the waiting turn, if any, is sent. A turn interrupted by a
    /// stall is sent again with its partial output dropped.
    #[must_use]
    pub fn on_connect_result(
        &mut self,
        session_id: &SessionId,
        generation: u64,
        result: std::result::Result<(), ProviderError>,
    ) -> Vec<Effect> {
        let current = self
            .connections
            .slots
            .get(session_id)
            .is_some_and(|slot| slot.generation == generation);
        if !current || !self.sessions.contains_key(session_id) {
            log::debug!("[{session_id}] Ignoring stale connect result (generation {generation})");
            return Vec::new();
        }

        match result {
            Ok(()) => {
                self.cancel_connect(session_id);
                self.on_connected(session_id)
            }
            Err(error) => self.on_connect_failed(session_id, error),
        }
    }

    fn on_connected(&mut self, session_id: &SessionId) -> Vec<Effect> {
        log::info!("[{session_id}] Connected");
        self.watchdog.resolve(session_id);

        let Some(session) = self.sessions.get_mut(session_id) else {
            return Vec::new();
        };
        session.connection_state = ConnectionState::Connected;
        session.status = String::from("Connected");
        let was_stalled = std::mem::replace(&mut session.stalled, false);
        let mut changes = Changes::CONNECTION | Changes::STATUS;

        if was_stalled && session.streaming {
            // Output of the stalled attempt is regenerated by the resend
            if let Some(user) = session.last_index_of(Role::User) {
                let before = session.messages.len();
                let mut index = 0;
                session.messages.retain(|m| {
                    let keep = index <= user || m.role != Role::Assistant;
                    index += 1;
                    keep
                });
                if session.messages.len() != before {
                    changes |= Changes::MESSAGES;
                }
            }
        }
        self.notify(session_id, changes);

        self.send_active_turn(session_id).into_iter().collect()
    }

    fn on_connect_failed(&mut self, session_id: &SessionId, error: ProviderError) -> Vec<Effect> {
        let Some(slot) = self.connections.slots.get_mut(session_id) else {
            return Vec::new();
        };
        log::warn!(
            "[{session_id}] Connect attempt {}/{} failed: {error}",
            slot.attempt,
            slot.max_attempts
        );

        if error.is_retryable() && slot.attempt < slot.max_attempts {
            let handle = self.timers.schedule(
                self.clock.now(),
                self.config.connect_retry_delay,
                TimerTask::RetryConnect(session_id.clone()),
            );
            slot.retry_timer = Some(handle);
            let status = format!(
                "Connection failed (attempt {}/{}), retrying…",
                slot.attempt, slot.max_attempts
            );
            self.set_status(session_id, status);
            return Vec::new();
        }

        self.cancel_connect(session_id);
        self.fail_connection(session_id, &error)
    }

    /// Leave the session disconnected after the last failed attempt
    fn fail_connection(&mut self, session_id: &SessionId, error: &ProviderError) -> Vec<Effect> {
        self.watchdog.resolve(session_id);
        self.flush_now(session_id);
        let now = self.clock.wall();
        let Some(session) = self.sessions.get_mut(session_id) else {
            return Vec::new();
        };
        session.connection_state = ConnectionState::Disconnected;
        session.stalled = false;

        let mut changes = Changes::CONNECTION | Changes::STATUS;
        match error {
            ProviderError::Unready { provider, remediation } => {
                session.status = format!("{provider} is not ready: {remediation}");
            }
            other => {
                let text = format!("Connection failed: {}", other.detail());
                session.messages.push(ChatMessage::system(text.clone(), now));
                session.status = text;
                changes |= Changes::MESSAGES;
            }
        }
        self.notify(session_id, changes);

        self.abandon_turn(session_id);
        self.kick(session_id)
    }

    /// Tear down a stalled connection and connect again
    ///
    /// At most one reconnect per session is in flight; further calls are
    /// ignored until it resolves. The stalled turn stays open and is sent
    /// again once the connection is back.
    #[must_use]
    pub fn reconnect(&mut self, session_id: &SessionId, reason: &str) -> Vec<Effect> {
        if !self.sessions.contains_key(session_id) || !self.watchdog.begin(session_id) {
            return Vec::new();
        }
        log::info!("[{session_id}] Reconnecting: {reason}");

        self.flush_now(session_id);
        self.cancel_connect(session_id);
        if let Some(session) = self.sessions.get_mut(session_id) {
            // Late events of the stalled stream are discarded
            session.turn += 1;
            session.connection_state = ConnectionState::Disconnected;
            session.status = format!("Reconnecting: {reason}");
        }
        self.notify(session_id, Changes::CONNECTION | Changes::STATUS);

        let mut effects = vec![
            Effect::Interrupt {
                session_id: session_id.clone(),
            },
            Effect::Disconnect {
                session_id: session_id.clone(),
            },
        ];
        let attempts = self.config.connect_attempts;
        effects.extend(self.connect_with_retry(session_id, attempts).unwrap_or_default());
        effects
    }

    /// Disconnect a session (best effort)
    ///
    /// A turn in flight is abandoned. Queued inputs stay queued until the
    /// next `enqueue`, which sends the oldest of them first.
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn disconnect(&mut self, session_id: &SessionId) -> Result<Vec<Effect>> {
        if !self.sessions.contains_key(session_id) {
            return Err(PanelError::session_not_found(session_id));
        }
        self.cancel_connect(session_id);
        self.watchdog.resolve(session_id);
        self.abandon_turn(session_id);
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.connection_state = ConnectionState::Disconnected;
            session.stalled = false;
            session.status = String::from("Disconnected");
        }
        self.notify(session_id, Changes::CONNECTION | Changes::STATUS);
        Ok(vec![Effect::Disconnect {
            session_id: session_id.clone(),
        }])
    }

    /// Stop the current turn
    ///
    /// The turn ends locally right away and its late events are discarded;
    /// the provider is asked to stop as a best effort. Queued inputs are sent
    /// next.
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn interrupt(&mut self, session_id: &SessionId) -> Result<Vec<Effect>> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| PanelError::session_not_found(session_id))?;
        if !session.streaming {
            return Ok(Vec::new());
        }
        log::info!("[{session_id}] Interrupting turn {}", session.turn);

        let mut effects = Vec::new();
        if session.connection_state == ConnectionState::Connected {
            effects.push(Effect::Interrupt {
                session_id: session_id.clone(),
            });
        }
        self.watchdog.resolve(session_id);
        self.abandon_turn(session_id);
        self.set_status(session_id, "Interrupted");
        self.archive_session(session_id);
        effects.extend(self.kick(session_id));
        Ok(effects)
    }
}
