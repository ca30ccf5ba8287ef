//! Activity tracking
//!
//! Every provider event is classified into a short label and folded into the
//! session's [`ActivityRecord`]. Records feed the stall watchdog (recency)
//! and the status display (labeled history). Snapshots go out to observers
//! at a fixed cadence rather than once per event.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use super::{ActivitySnapshot, PanelUpdate, SessionManager};
use crate::clock::{TimerHandle, TimerTask};
use crate::provider::{ProviderEvent, StatusEvent};
use crate::types::activity::{
    ActivityEntry, ActivityKind, ActivityLabel, ActivityRecord, RECENT_CAPACITY, STARTED_LABEL,
};
use crate::types::identifiers::SessionId;

/// Longest detail text kept on an activity entry
const MAX_DETAIL_CHARS: usize = 120;

/// Maps provider events to activity labels
pub trait ActivityClassifier: Send {
    /// Label, detail and kind for one event
    fn classify(&self, event: &ProviderEvent) -> ActivityLabel;
}

/// Built-in classifier covering every [`ProviderEvent`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultActivityClassifier;

impl ActivityClassifier for DefaultActivityClassifier {
    fn classify(&self, event: &ProviderEvent) -> ActivityLabel {
        match event {
            ProviderEvent::Delta(_) => ActivityLabel::new("Writing", "", ActivityKind::Output),
            ProviderEvent::TurnComplete => {
                ActivityLabel::new("Turn complete", "", ActivityKind::Lifecycle)
            }
            ProviderEvent::Error(message) => {
                ActivityLabel::new("Error", truncate(message), ActivityKind::Error)
            }
            ProviderEvent::Status(status) => match status {
                StatusEvent::Thinking { text } => ActivityLabel::new(
                    "Thinking",
                    truncate(text.as_deref().unwrap_or_default()),
                    ActivityKind::Thinking,
                ),
                StatusEvent::ToolStarted { name, detail } => {
                    let detail = match detail {
                        Some(detail) => format!("{name}: {detail}"),
                        None => name.clone(),
                    };
                    ActivityLabel::new("Running tool", truncate(&detail), ActivityKind::Tool)
                }
                StatusEvent::ToolFinished { name, ok } => {
                    let label = if *ok { "Tool finished" } else { "Tool failed" };
                    ActivityLabel::new(label, truncate(name), ActivityKind::Tool)
                }
                StatusEvent::Subagent { name, detail } => {
                    let detail = match detail {
                        Some(detail) => format!("{name}: {detail}"),
                        None => name.clone(),
                    };
                    ActivityLabel::new("Sub-agent", truncate(&detail), ActivityKind::Background)
                }
                StatusEvent::Plan { summary } => {
                    ActivityLabel::new("Updated plan", truncate(summary), ActivityKind::Info)
                }
                StatusEvent::Usage { .. } => {
                    ActivityLabel::new("Usage updated", "", ActivityKind::Info)
                }
                StatusEvent::Notice { message } => {
                    ActivityLabel::new("Notice", truncate(message), ActivityKind::Info)
                }
            },
        }
    }
}

fn truncate(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    if line.chars().count() <= MAX_DETAIL_CHARS {
        return line.to_string();
    }
    let mut short: String = line.chars().take(MAX_DETAIL_CHARS - 1).collect();
    short.push('…');
    short
}

/// Activity records plus throttled publishing state
pub(crate) struct ActivityTracker {
    records: HashMap<SessionId, ActivityRecord>,
    /// Sessions whose turn reported done with no background work since
    turn_complete: HashSet<SessionId>,
    /// Sessions changed since the last publish
    dirty: HashSet<SessionId>,
    publish_timer: Option<TimerHandle>,
    window: Duration,
    classifier: Box<dyn ActivityClassifier>,
}

impl ActivityTracker {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            records: HashMap::new(),
            turn_complete: HashSet::new(),
            dirty: HashSet::new(),
            publish_timer: None,
            window,
            classifier: Box::new(DefaultActivityClassifier),
        }
    }

    pub(crate) fn set_classifier(&mut self, classifier: Box<dyn ActivityClassifier>) {
        self.classifier = classifier;
    }

    /// Fold one classified event into the session's record
    fn record_label(&mut self, session_id: &SessionId, now: Instant, label: ActivityLabel) {
        if label.kind.is_background_work() {
            self.turn_complete.remove(session_id);
        }

        let record = self
            .records
            .entry(session_id.clone())
            .or_insert_with(|| ActivityRecord::new(now));

        let duplicate = record.recent.front_mut().filter(|head| {
            head.label == label.label
                && head.detail == label.detail
                && now.saturating_duration_since(head.at) <= self.window
        });
        match duplicate {
            Some(head) => {
                head.count += 1;
                head.at = now;
            }
            None => {
                let id = record.next_entry_id;
                record.next_entry_id += 1;
                record.recent.push_front(ActivityEntry {
                    id,
                    label: label.label.clone(),
                    detail: label.detail,
                    kind: label.kind,
                    at: now,
                    count: 1,
                });
                record.recent.truncate(RECENT_CAPACITY);
            }
        }

        record.total_events += 1;
        record.last_event_at = now;
        record.last_event_label = label.label;
        self.dirty.insert(session_id.clone());
    }

    fn seed(&mut self, session_id: &SessionId, now: Instant) {
        self.turn_complete.remove(session_id);
        if let Some(record) = self.records.get_mut(session_id) {
            record.last_event_at = now;
            record.last_event_label = STARTED_LABEL.to_string();
            self.dirty.insert(session_id.clone());
        }
    }

    pub(crate) fn record(&self, session_id: &SessionId) -> Option<&ActivityRecord> {
        self.records.get(session_id)
    }

    pub(crate) fn discard(&mut self, session_id: &SessionId) {
        self.records.remove(session_id);
        self.turn_complete.remove(session_id);
        self.dirty.remove(session_id);
    }

    fn snapshot(&self, session_id: &SessionId) -> Option<ActivitySnapshot> {
        let record = self.records.get(session_id)?;
        Some(ActivitySnapshot {
            last_event_label: record.last_event_label.clone(),
            total_events: record.total_events,
            recent: record.recent.iter().cloned().collect(),
            turn_complete: self.turn_complete.contains(session_id),
        })
    }
}

impl SessionManager {
    /// Record a provider event in the session's activity record
    pub fn mark_activity(&mut self, session_id: &SessionId, event: &ProviderEvent) {
        if !self.sessions.contains_key(session_id) {
            return;
        }
        let label = self.activity.classifier.classify(event);
        self.activity
            .record_label(session_id, self.clock.now(), label);
        self.schedule_activity_publish();
    }

    /// Reset recency at turn start without touching the labeled history
    ///
    /// Only an existing record is touched; a session that has never produced
    /// an event keeps no record, so the watchdog leaves it alone.
    pub fn seed_activity(&mut self, session_id: &SessionId) {
        self.activity.seed(session_id, self.clock.now());
        self.schedule_activity_publish();
    }

    /// Mark the session's turn as reported done
    pub fn mark_turn_complete(&mut self, session_id: &SessionId) {
        if self.sessions.contains_key(session_id) {
            self.activity.turn_complete.insert(session_id.clone());
            self.activity.dirty.insert(session_id.clone());
            self.schedule_activity_publish();
        }
    }

    /// Whether the turn reported done and no background work followed
    #[must_use]
    pub fn is_turn_complete(&self, session_id: &SessionId) -> bool {
        self.activity.turn_complete.contains(session_id)
    }

    /// Activity record of a session, if it has produced any event
    #[must_use]
    pub fn activity(&self, session_id: &SessionId) -> Option<&ActivityRecord> {
        self.activity.record(session_id)
    }

    fn schedule_activity_publish(&mut self) {
        if self.activity.dirty.is_empty() || self.activity.publish_timer.is_some() {
            return;
        }
        let handle = self.timers.schedule(
            self.clock.now(),
            self.config.activity_publish_interval,
            TimerTask::PublishActivity,
        );
        self.activity.publish_timer = Some(handle);
    }

    /// Send one snapshot per session changed since the last publish
    pub(crate) fn publish_activity(&mut self) {
        self.activity.publish_timer = None;
        let mut dirty: Vec<SessionId> = self.activity.dirty.drain().collect();
        dirty.sort();
        for session_id in dirty {
            if let Some(snapshot) = self.activity.snapshot(&session_id) {
                let _ = self.updates.send(PanelUpdate::Activity {
                    session_id,
                    snapshot,
                });
            }
        }
    }
}
