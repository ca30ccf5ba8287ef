//! Delta coalescing
//!
//! Streamed fragments accumulate per session and are written into the
//! message log either immediately (the fragment carries a line break) or
//! after a short debounce, so bursts of tiny fragments cost one log mutation.

use std::collections::HashMap;

use super::{Changes, SessionManager};
use crate::clock::{TimerHandle, TimerTask};
use crate::types::identifiers::SessionId;
use crate::types::messages::ChatMessage;

/// Per-session accumulators and their pending flush timers
#[derive(Debug, Default)]
pub(crate) struct DeltaCoalescer {
    buffers: HashMap<SessionId, String>,
    timers: HashMap<SessionId, TimerHandle>,
}

impl DeltaCoalescer {
    fn push(&mut self, session_id: &SessionId, fragment: &str) {
        self.buffers
            .entry(session_id.clone())
            .or_default()
            .push_str(fragment);
    }

    /// Swap the accumulator for an empty one
    fn take(&mut self, session_id: &SessionId) -> Option<String> {
        let buffer = self.buffers.get_mut(session_id)?;
        if buffer.is_empty() {
            return None;
        }
        Some(std::mem::take(buffer))
    }

    /// Forget a timer that has just fired
    pub(crate) fn timer_fired(&mut self, session_id: &SessionId, handle: TimerHandle) {
        if self.timers.get(session_id) == Some(&handle) {
            self.timers.remove(session_id);
        }
    }

    /// Drop buffer and timer handle, returning the handle for cancellation
    pub(crate) fn discard(&mut self, session_id: &SessionId) -> Option<TimerHandle> {
        self.buffers.remove(session_id);
        self.timers.remove(session_id)
    }

    #[cfg(test)]
    fn pending(&self, session_id: &SessionId) -> &str {
        self.buffers.get(session_id).map_or("", String::as_str)
    }
}

impl SessionManager {
    /// Buffer a streamed fragment for a session
    ///
    /// A fragment containing a line break flushes at once and cancels the
    /// pending debounce; otherwise a flush is scheduled if none is pending.
    pub fn queue_delta(&mut self, session_id: &SessionId, fragment: &str) {
        if fragment.is_empty() || !self.sessions.contains_key(session_id) {
            return;
        }
        self.coalescer.push(session_id, fragment);

        if fragment.contains('\n') {
            if let Some(handle) = self.coalescer.timers.remove(session_id) {
                self.timers.cancel(handle);
            }
            self.flush(session_id);
        } else if !self.coalescer.timers.contains_key(session_id) {
            let handle = self.timers.schedule(
                self.clock.now(),
                self.config.delta_flush_delay,
                TimerTask::FlushDeltas(session_id.clone()),
            );
            self.coalescer.timers.insert(session_id.clone(), handle);
        }
    }

    /// Apply a session's buffered text to its message log
    ///
    /// Extends the live assistant message of the current turn in place, or
    /// appends a new assistant message when there is none. Flushing an empty
    /// buffer does nothing.
    pub fn flush(&mut self, session_id: &SessionId) {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        let Some(text) = self.coalescer.take(session_id) else {
            return;
        };

        match session.live_assistant_index() {
            Some(index) => session.messages[index].content.push_str(&text),
            None => session
                .messages
                .push(ChatMessage::assistant(text, self.clock.wall())),
        }
        self.notify(session_id, Changes::MESSAGES);
    }

    /// Cancel the pending flush and pending text of a session
    pub(crate) fn discard_deltas(&mut self, session_id: &SessionId) {
        if let Some(handle) = self.coalescer.discard(session_id) {
            self.timers.cancel(handle);
        }
    }

    /// Flush, then cancel any timer still pending for the session
    pub(crate) fn flush_now(&mut self, session_id: &SessionId) {
        if let Some(handle) = self.coalescer.timers.remove(session_id) {
            self.timers.cancel(handle);
        }
        self.flush(session_id);
    }
}
