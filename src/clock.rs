//! Clock and timer scheduling
//!
//! The session manager never sleeps. Debounced flushes, watchdog sweeps,
//! throttled activity publishing and connect retries are entries in a
//! [`TimerQueue`]; whoever drives the manager asks for the next deadline and
//! calls back in once it has passed. Tests drive a [`ManualClock`] instead of
//! waiting on real time.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::types::identifiers::SessionId;

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync {
    /// Monotonic now, used for deadlines and activity recency
    fn now(&self) -> Instant;

    /// Wall-clock now, used for message and history timestamps
    fn wall(&self) -> DateTime<Utc>;
}

/// Real time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    base_wall: DateTime<Utc>,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Start a manual clock at the current instant
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            base_wall: Utc::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Time elapsed since the clock was created
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    fn wall(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock();
        self.base_wall + chrono::Duration::from_std(offset).unwrap_or_default()
    }
}

// ============================================================================
// TIMERS
// ============================================================================

/// Work the manager performs when a timer fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTask {
    /// Flush a session's coalesced deltas
    FlushDeltas(SessionId),
    /// Periodic stall sweep over all sessions
    WatchdogSweep,
    /// Publish throttled activity snapshots
    PublishActivity,
    /// Next attempt of a bounded connect retry
    RetryConnect(SessionId),
}

/// Handle used to cancel a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Deadline-ordered queue of pending timer tasks
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_seq: u64,
    by_deadline: BTreeMap<(Instant, u64), TimerTask>,
    deadlines: HashMap<u64, Instant>,
}

impl TimerQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to fire `delay` after `now`
    ///
    /// A deadline past the end of the clock's range never fires.
    pub fn schedule(&mut self, now: Instant, delay: Duration, task: TimerTask) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        let Some(deadline) = now.checked_add(delay) else {
            log::warn!("Timer {task:?} delay {delay:?} is out of range; it will never fire");
            return TimerHandle(seq);
        };
        self.by_deadline.insert((deadline, seq), task);
        self.deadlines.insert(seq, deadline);
        TimerHandle(seq)
    }

    /// Cancel a timer; returns false if it already fired or was cancelled
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.deadlines.remove(&handle.0) {
            Some(deadline) => self.by_deadline.remove(&(deadline, handle.0)).is_some(),
            None => false,
        }
    }

    /// Earliest pending deadline
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.by_deadline.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest task whose deadline is at or before `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerHandle, TimerTask)> {
        let key = *self.by_deadline.keys().next()?;
        if key.0 > now {
            return None;
        }
        let task = self.by_deadline.remove(&key)?;
        self.deadlines.remove(&key.1);
        Some((TimerHandle(key.1), task))
    }

    /// Number of pending timers
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_deadline.len()
    }

    /// Whether no timers are pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_deadline.is_empty()
    }
}
