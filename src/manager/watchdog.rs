//! Stall watchdog

use std::collections::HashSet;

use super::{Effect, SessionManager};
use crate::clock::TimerTask;
use crate::types::identifiers::SessionId;

/// Sessions with a watchdog-triggered reconnect still unresolved
#[derive(Debug, Default)]
pub(crate) struct StallWatchdog {
    reconnecting: HashSet<SessionId>,
}

impl StallWatchdog {
    pub(crate) fn begin(&mut self, session_id: &SessionId) -> bool {
        self.reconnecting.insert(session_id.clone())
    }

    pub(crate) fn resolve(&mut self, session_id: &SessionId) {
        self.reconnecting.remove(session_id);
    }

    pub(crate) fn is_reconnecting(&self, session_id: &SessionId) -> bool {
        self.reconnecting.contains(session_id)
    }
}

impl SessionManager {
    pub(crate) fn arm_watchdog(&mut self) {
        self.timers.schedule(
            self.clock.now(),
            self.config.watchdog_interval,
            TimerTask::WatchdogSweep,
        );
    }

    /// Check every streaming session for a stall
    ///
    /// A session is stalled when it has an activity record and has been idle
    /// longer than the stall timeout, whether its stream went quiet or its
    /// connect never finished. Sessions with a reconnect already in flight
    /// are skipped until it resolves.
    #[must_use]
    pub fn sweep(&mut self) -> Vec<Effect> {
        let now = self.clock.now();
        let timeout = self.config.stall_timeout;

        let stalled: Vec<(SessionId, u64)> = self
            .order
            .iter()
            .filter_map(|id| {
                let session = self.sessions.get(id)?;
                if !session.streaming || self.watchdog.is_reconnecting(id) {
                    return None;
                }
                let record = self.activity.record(id)?;
                let idle = now.saturating_duration_since(record.last_event_at);
                (idle > timeout).then(|| (id.clone(), idle.as_secs()))
            })
            .collect();

        let mut effects = Vec::new();
        for (session_id, idle_secs) in stalled {
            log::warn!("[{session_id}] No activity for {idle_secs}s, reconnecting");
            if let Some(session) = self.sessions.get_mut(&session_id) {
                session.stalled = true;
            }
            effects.extend(self.reconnect(&session_id, &format!("no activity for {idle_secs}s")));
        }
        effects
    }
}
