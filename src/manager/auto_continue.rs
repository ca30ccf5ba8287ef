//! Bounded auto-continuation of truncated turns

use super::{Effect, SessionManager};
use crate::types::identifiers::SessionId;
use crate::types::messages::{PendingInput, Role};

/// Decides whether a finished assistant message looks cut off
///
/// Implementations must be deterministic for the same input.
pub trait TruncationHeuristic: Send {
    /// Whether `content` looks truncated
    fn looks_incomplete(&self, content: &str) -> bool;
}

/// Default heuristic
///
/// Flags an odd number of code fences, a trailing `:` `,` or `...`, and a
/// final line that ends mid-word in plain prose.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTruncationHeuristic;

impl TruncationHeuristic for DefaultTruncationHeuristic {
    fn looks_incomplete(&self, content: &str) -> bool {
        let text = content.trim_end();
        if text.is_empty() {
            return false;
        }

        let fences = text
            .lines()
            .filter(|line| line.trim_start().starts_with("```"))
            .count();
        if fences % 2 == 1 {
            return true;
        }

        if text.ends_with("...") || text.ends_with(':') || text.ends_with(',') {
            return true;
        }

        let Some(last_line) = text.lines().last().map(str::trim) else {
            return false;
        };
        // Lists, headings, tables and code end without sentence punctuation
        if last_line.starts_with(['-', '*', '#', '|', '>'])
            || last_line.starts_with(|c: char| c.is_ascii_digit())
            || (fences > 0 && last_line.starts_with("```"))
        {
            return false;
        }
        last_line
            .chars()
            .last()
            .is_some_and(|c| c.is_alphabetic())
            && last_line.split_whitespace().count() > 3
    }
}

impl SessionManager {
    /// Queue the continuation prompt after a truncated turn, within bounds
    ///
    /// Skipped when user input is already waiting; the counter only resets
    /// when the user sends something.
    pub(crate) fn maybe_auto_continue(&mut self, session_id: &SessionId) -> Vec<Effect> {
        let max = self.config.max_auto_continuations;
        let Some(session) = self.sessions.get(session_id) else {
            return Vec::new();
        };
        if session.streaming || !session.pending_inputs.is_empty() {
            return Vec::new();
        }

        let last_user = session.last_index_of(Role::User);
        let Some(reply) = session
            .last_index_of(Role::Assistant)
            .filter(|&i| last_user.is_none_or(|u| i > u))
            .map(|i| &session.messages[i])
        else {
            return Vec::new();
        };
        if !self.truncation.looks_incomplete(&reply.content) {
            return Vec::new();
        }
        if session.auto_continue_count >= max {
            log::info!("[{session_id}] Reply looks truncated but auto-continue limit ({max}) reached");
            return Vec::new();
        }

        let count = session.auto_continue_count + 1;
        log::info!("[{session_id}] Reply looks truncated, continuing ({count}/{max})");
        let prompt = self.config.continuation_prompt.clone();
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.auto_continue_count = count;
        }
        self.dispatch(session_id, PendingInput::synthetic(prompt))
    }
}
