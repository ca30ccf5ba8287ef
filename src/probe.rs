//! Provider and model health probing
//!
//! [`HealthProbe::probe_all`] pings a set of provider/model targets through a
//! fixed pool of workers that share one queue, so at most
//! `probe_concurrency` pings are in flight at any instant. Every target gets
//! its own outcome; a failing target never stops the rest of the queue.
//!
//! While a run is in progress, [`HealthProbe::pending`] lists the targets not
//! yet finished and [`HealthProbe::results`] holds the outcomes so far.

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::manager::PanelUpdate;
use crate::provider::AgentProvider;
use crate::types::identifiers::{ModelId, ProviderId};

/// A provider, optionally narrowed to one of its models
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProbeTarget {
    /// Provider to ping
    pub provider: ProviderId,
    /// Model to ping; `None` pings the provider itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelId>,
}

impl ProbeTarget {
    /// Target the provider as a whole
    pub fn provider(provider: impl Into<ProviderId>) -> Self {
        Self {
            provider: provider.into(),
            model: None,
        }
    }

    /// Target one model of a provider
    pub fn model(provider: impl Into<ProviderId>, model: impl Into<ModelId>) -> Self {
        Self {
            provider: provider.into(),
            model: Some(model.into()),
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{}/{}", self.provider, model),
            None => write!(f, "{}", self.provider),
        }
    }
}

/// Result of pinging one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// Target answered
    Ok {
        /// Round trip in milliseconds
        duration_ms: u64,
    },
    /// Target failed to answer
    Failed {
        /// Failure description
        error: String,
    },
}

impl ProbeOutcome {
    /// Whether the target answered
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

#[derive(Debug, Default)]
struct ProbeBoard {
    pending: HashSet<ProbeTarget>,
    results: HashMap<ProbeTarget, ProbeOutcome>,
}

/// Bounded-concurrency health prober
#[derive(Debug, Clone)]
pub struct HealthProbe {
    concurrency: usize,
    board: Arc<Mutex<ProbeBoard>>,
    updates: Option<broadcast::Sender<PanelUpdate>>,
}

impl HealthProbe {
    /// Prober running at most `concurrency` pings at once
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            board: Arc::new(Mutex::new(ProbeBoard::default())),
            updates: None,
        }
    }

    /// Publish each finished probe on an update channel
    #[must_use]
    pub fn with_updates(mut self, updates: broadcast::Sender<PanelUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Targets queued or in flight
    #[must_use]
    pub fn pending(&self) -> HashSet<ProbeTarget> {
        self.board.lock().pending.clone()
    }

    /// Latest outcome per target
    #[must_use]
    pub fn results(&self) -> HashMap<ProbeTarget, ProbeOutcome> {
        self.board.lock().results.clone()
    }

    /// Ping every distinct target and return their outcomes
    pub async fn probe_all(
        &self,
        provider: &dyn AgentProvider,
        targets: impl IntoIterator<Item = ProbeTarget>,
    ) -> HashMap<ProbeTarget, ProbeOutcome> {
        let mut seen = HashSet::new();
        let queue: VecDeque<ProbeTarget> = targets
            .into_iter()
            .filter(|target| seen.insert(target.clone()))
            .collect();
        if queue.is_empty() {
            return HashMap::new();
        }

        {
            let mut board = self.board.lock();
            for target in &queue {
                board.results.remove(target);
                board.pending.insert(target.clone());
            }
        }

        let workers = self.concurrency.min(queue.len());
        log::debug!("Probing {} targets with {workers} workers", queue.len());
        let queue = Mutex::new(queue);
        let outcomes = join_all((0..workers).map(|_| self.worker(provider, &queue))).await;

        let results: HashMap<_, _> = outcomes.into_iter().flatten().collect();
        let failed = results.values().filter(|o| !o.is_ok()).count();
        log::info!("Probed {} targets, {failed} failed", results.len());
        results
    }

    async fn worker(
        &self,
        provider: &dyn AgentProvider,
        queue: &Mutex<VecDeque<ProbeTarget>>,
    ) -> Vec<(ProbeTarget, ProbeOutcome)> {
        let mut done = Vec::new();
        loop {
            let next = queue.lock().pop_front();
            let Some(target) = next else {
                break;
            };

            let result = match &target.model {
                Some(model) => {
                    provider
                        .ping_model(target.provider.clone(), model.clone())
                        .await
                }
                None => provider.ping_provider(target.provider.clone()).await,
            };
            let outcome = match result {
                Ok(duration) => ProbeOutcome::Ok {
                    duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                },
                Err(e) => {
                    log::warn!("Probe of {target} failed: {e}");
                    ProbeOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            {
                let mut board = self.board.lock();
                board.pending.remove(&target);
                board.results.insert(target.clone(), outcome.clone());
            }
            if let Some(updates) = &self.updates {
                let _ = updates.send(PanelUpdate::Probe {
                    target: target.clone(),
                    outcome: outcome.clone(),
                });
            }
            done.push((target, outcome));
        }
        done
    }
}
