//! Activity records kept per session for the watchdog and status display

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

/// Capacity of `ActivityRecord::recent`
pub const RECENT_CAPACITY: usize = 10;

/// Label used by `seed` at turn start
pub const STARTED_LABEL: &str = "Started";

/// Broad category of a protocol event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Assistant text streaming
    Output,
    /// Model reasoning
    Thinking,
    /// Tool execution
    Tool,
    /// Sub-agent or other background work
    Background,
    /// Turn lifecycle (started, completed)
    Lifecycle,
    /// Errors and warnings
    Error,
    /// Anything else
    Info,
}

impl ActivityKind {
    /// Whether this kind means work is still running after the turn reported done
    #[must_use]
    pub fn is_background_work(self) -> bool {
        matches!(self, Self::Background | Self::Tool)
    }
}

/// Classifier output for one protocol event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityLabel {
    /// Short label ("Running tool")
    pub label: String,
    /// Detail ("cargo test")
    pub detail: String,
    /// Category
    pub kind: ActivityKind,
}

impl ActivityLabel {
    /// Build a label
    pub fn new(label: impl Into<String>, detail: impl Into<String>, kind: ActivityKind) -> Self {
        Self {
            label: label.into(),
            detail: detail.into(),
            kind,
        }
    }
}

/// One line of recent activity
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    /// Monotonic id within the record
    pub id: u64,
    /// Short label
    pub label: String,
    /// Detail text
    pub detail: String,
    /// Category
    pub kind: ActivityKind,
    /// Last time this entry was observed
    pub at: Instant,
    /// How many consecutive duplicates were folded into this entry
    pub count: u32,
}

/// Per-session recency and labeled history of protocol events
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    /// Time of the last event (or turn start, see `seed`)
    pub last_event_at: Instant,
    /// Label of the last event
    pub last_event_label: String,
    /// Total events observed
    pub total_events: u64,
    /// Newest first, at most `RECENT_CAPACITY` entries
    pub recent: VecDeque<ActivityEntry>,
    pub(crate) next_entry_id: u64,
}

impl ActivityRecord {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            last_event_at: now,
            last_event_label: String::new(),
            total_events: 0,
            recent: VecDeque::with_capacity(RECENT_CAPACITY),
            next_entry_id: 0,
        }
    }
}
