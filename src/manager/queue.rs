//! Input queue and turn lifecycle
//!
//! A session runs at most one turn at a time. Input arriving while a turn is
//! in flight waits in `pending_inputs` and is dispatched, in order, each time
//! the session stops streaming.
//!
//! Provider events carry the turn generation they were produced for. Every
//! transition that ends a turn early (interrupt, stall, workspace change)
//! bumps the generation, so late events of the old turn are dropped here.

use super::{Changes, Effect, SessionManager};
use crate::error::{PanelError, Result};
use crate::provider::{ProviderEvent, SendRequest, StatusEvent};
use crate::types::identifiers::{SessionId, TurnId};
use crate::types::messages::{ChatMessage, PendingInput, Role};
use crate::types::modes::ConnectionState;

impl SessionManager {
    /// Submit user input to a session
    ///
    /// Staged attachments travel with the input and the draft is cleared.
    /// While a turn is streaming, or older inputs are still waiting, the input
    /// joins the back of the queue and the log is left alone; otherwise it is
    /// dispatched at once.
    ///
    /// # Errors
    /// Returns `PanelError::SessionNotFound` if the session is not live
    pub fn enqueue(&mut self, session_id: &SessionId, text: impl Into<String>) -> Result<Vec<Effect>> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PanelError::session_not_found(session_id))?;

        let attachments = std::mem::take(&mut session.attachments);
        session.input_draft.clear();
        let input = PendingInput::user(text, attachments);

        if session.streaming || !session.pending_inputs.is_empty() {
            session.pending_inputs.push_back(input);
            log::debug!(
                "[{session_id}] Queued input ({} pending)",
                session.pending_inputs.len()
            );
            self.notify(session_id, Changes::QUEUE | Changes::DRAFT);
            self.save_app_state();
            return Ok(self.kick(session_id));
        }

        self.notify(session_id, Changes::DRAFT);
        Ok(self.dispatch(session_id, input))
    }

    /// Dispatch the head of the queue if the session is idle
    ///
    /// Called on every transition of `streaming` to false.
    #[must_use]
    pub fn kick(&mut self, session_id: &SessionId) -> Vec<Effect> {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return Vec::new();
        };
        if session.streaming {
            return Vec::new();
        }
        let Some(input) = session.pending_inputs.pop_front() else {
            return Vec::new();
        };
        log::debug!(
            "[{session_id}] Sending queued input ({} still pending)",
            session.pending_inputs.len()
        );
        self.notify(session_id, Changes::QUEUE);
        self.dispatch(session_id, input)
    }

    /// Start a turn: log the user message, then send or connect first
    pub(crate) fn dispatch(&mut self, session_id: &SessionId, input: PendingInput) -> Vec<Effect> {
        let now = self.clock.wall();
        let Some(session) = self.sessions.get_mut(session_id) else {
            return Vec::new();
        };

        let mut message = ChatMessage::user(input.text.clone(), now);
        if input.synthetic {
            message = message.into_synthetic();
        } else {
            session.auto_continue_count = 0;
        }
        session.messages.push(message);
        session.streaming = true;
        session.stalled = false;
        session.turn += 1;
        let connection_state = session.connection_state;

        self.active_turns.insert(
            session_id.clone(),
            SendRequest {
                session_id: session_id.clone(),
                message: input.text,
                attachments: input.attachments,
                interaction_mode: session.interaction_mode,
            },
        );
        self.notify(session_id, Changes::MESSAGES | Changes::STREAMING);
        self.seed_activity(session_id);

        match connection_state {
            ConnectionState::Connected => self.send_active_turn(session_id).into_iter().collect(),
            // The waiting turn is sent once the attempt in progress succeeds
            ConnectionState::Connecting => Vec::new(),
            ConnectionState::Disconnected => {
                let attempts = self.config.connect_attempts;
                self.connect_with_retry(session_id, attempts)
                    .unwrap_or_default()
            }
        }
    }

    /// Send the waiting turn of a connected session
    pub(crate) fn send_active_turn(&mut self, session_id: &SessionId) -> Option<Effect> {
        let session = self.sessions.get(session_id)?;
        if !session.streaming {
            return None;
        }
        let request = self.active_turns.get(session_id)?.clone();
        let turn = session.turn;
        log::debug!("[{session_id}] Sending turn {turn}");

        self.seed_activity(session_id);
        self.set_status(session_id, "Working…");
        Some(Effect::Send {
            session_id: session_id.clone(),
            turn,
            request,
        })
    }

    /// End the current turn locally and invalidate its late events
    pub(crate) fn abandon_turn(&mut self, session_id: &SessionId) {
        self.flush_now(session_id);
        self.active_turns.remove(session_id);
        if let Some(session) = self.sessions.get_mut(session_id)
            && session.streaming
        {
            session.streaming = false;
            session.turn += 1;
            self.notify(session_id, Changes::STREAMING);
        }
    }

    fn is_current_turn(&self, session_id: &SessionId, turn: TurnId) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|s| s.streaming && s.turn == turn)
    }

    // ========================================================================
    // PROVIDER RESULTS
    // ========================================================================

    /// Apply one event of a turn's stream
    #[must_use]
    pub fn on_provider_event(
        &mut self,
        session_id: &SessionId,
        turn: TurnId,
        event: ProviderEvent,
    ) -> Vec<Effect> {
        if !self.is_current_turn(session_id, turn) {
            log::debug!("[{session_id}] Dropping event of stale turn {turn}");
            return Vec::new();
        }
        self.mark_activity(session_id, &event);

        match event {
            ProviderEvent::Delta(text) => {
                self.queue_delta(session_id, &text);
                Vec::new()
            }
            ProviderEvent::Status(StatusEvent::Usage { usage }) => {
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.usage = Some(usage);
                    self.notify(session_id, Changes::STATUS);
                }
                Vec::new()
            }
            ProviderEvent::Status(_) => {
                if let Some(record) = self.activity(session_id) {
                    let label = record.recent.front().map(|entry| {
                        if entry.detail.is_empty() {
                            entry.label.clone()
                        } else {
                            format!("{}: {}", entry.label, entry.detail)
                        }
                    });
                    if let Some(label) = label {
                        self.set_status(session_id, label);
                    }
                }
                Vec::new()
            }
            ProviderEvent::TurnComplete => self.complete_turn(session_id),
            ProviderEvent::Error(message) => self.fail_turn(session_id, &message),
        }
    }

    /// A turn's stream ended
    ///
    /// A stream that ends before reporting completion or failure counts as a
    /// failed send.
    #[must_use]
    pub fn on_stream_closed(&mut self, session_id: &SessionId, turn: TurnId) -> Vec<Effect> {
        if !self.is_current_turn(session_id, turn) {
            return Vec::new();
        }
        self.fail_turn(session_id, "stream ended before the turn completed")
    }

    /// The provider refused to start a turn
    #[must_use]
    pub fn on_send_rejected(
        &mut self,
        session_id: &SessionId,
        turn: TurnId,
        error: &crate::error::ProviderError,
    ) -> Vec<Effect> {
        if !self.is_current_turn(session_id, turn) {
            return Vec::new();
        }
        self.fail_turn(session_id, &error.detail())
    }

    fn complete_turn(&mut self, session_id: &SessionId) -> Vec<Effect> {
        log::debug!("[{session_id}] Turn complete");
        self.flush_now(session_id);
        self.active_turns.remove(session_id);
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.streaming = false;
        }
        self.set_status(session_id, "Ready");
        self.notify(session_id, Changes::STREAMING);
        self.mark_turn_complete(session_id);

        self.archive_session(session_id);
        let mut effects = self.maybe_auto_continue(session_id);
        effects.extend(self.kick(session_id));
        self.save_app_state();
        effects
    }

    /// Mid-turn transport failure
    ///
    /// The turn ends with a system message, the session drops to
    /// disconnected and queued inputs are kept.
    fn fail_turn(&mut self, session_id: &SessionId, message: &str) -> Vec<Effect> {
        log::warn!("[{session_id}] Turn failed: {message}");
        self.flush_now(session_id);
        self.active_turns.remove(session_id);

        let now = self.clock.wall();
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.streaming = false;
            session.connection_state = ConnectionState::Disconnected;
            session.status = format!("Send failed: {message}");
            session
                .messages
                .push(ChatMessage::system(format!("Send failed: {message}"), now));
        }
        self.notify(
            session_id,
            Changes::STREAMING | Changes::CONNECTION | Changes::STATUS | Changes::MESSAGES,
        );

        self.archive_session(session_id);
        let effects = self.kick(session_id);
        self.save_app_state();
        effects
    }

    // ========================================================================
    // EDITING
    // ========================================================================

    /// Pull a queued input back into the draft
    ///
    /// The input leaves the queue and its attachments are staged again.
    ///
    /// # Errors
    /// Returns `SessionNotFound` or `QueueIndexOutOfRange`
    pub fn edit_queued(&mut self, session_id: &SessionId, index: usize) -> Result<String> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PanelError::session_not_found(session_id))?;
        let len = session.pending_inputs.len();
        let input = session
            .pending_inputs
            .remove(index)
            .ok_or(PanelError::QueueIndexOutOfRange { index, len })?;

        session.input_draft.clone_from(&input.text);
        let mut attachments = input.attachments;
        attachments.append(&mut session.attachments);
        session.attachments = attachments;

        self.notify(session_id, Changes::QUEUE | Changes::DRAFT);
        self.save_app_state();
        Ok(input.text)
    }

    /// Pull the most recent user message back into the draft
    ///
    /// The message and everything after it leave the log. Only allowed
    /// between turns.
    ///
    /// # Errors
    /// Returns `SessionNotFound`, `SessionBusy` while streaming, or
    /// `NothingToRecall` when no user message exists
    pub fn recall_last(&mut self, session_id: &SessionId) -> Result<String> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PanelError::session_not_found(session_id))?;
        if session.streaming {
            return Err(PanelError::session_busy(session_id));
        }
        let index = session
            .messages
            .iter()
            .rposition(|m| m.role == Role::User && !m.synthetic)
            .ok_or_else(|| PanelError::NothingToRecall(session_id.clone()))?;

        let text = session.messages[index].content.clone();
        session.messages.truncate(index);
        session.input_draft.clone_from(&text);

        self.notify(session_id, Changes::MESSAGES | Changes::DRAFT);
        self.save_app_state();
        Ok(text)
    }
}
