//! Deterministic scripted provider
//!
//! Plays back pre-recorded turns with optional delays. It carries no
//! transport logic and is meant for local development, demos and tests.

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use super::events::ProviderEvent;
use super::{AgentProvider, ConnectRequest, EventStream, SendRequest};
use crate::error::ProviderError;
use crate::types::identifiers::{ModelId, ProviderId, SessionId};

/// Stable provider identifier for the scripted provider
pub const SCRIPTED_PROVIDER_ID: &str = "scripted";

/// Reply used once the script runs out of turns
const DEFAULT_REPLY: &str = "Done.\n";

/// One scripted turn: events with the delay preceding each
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptedTurn {
    steps: Vec<(Duration, ProviderEvent)>,
}

impl ScriptedTurn {
    /// Empty turn; add steps with the builder methods
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-delta reply followed by `TurnComplete`
    pub fn reply(text: impl Into<String>) -> Self {
        Self::new().delta(text).complete()
    }

    /// Emit a delta
    #[must_use]
    pub fn delta(mut self, text: impl Into<String>) -> Self {
        self.steps.push((Duration::ZERO, ProviderEvent::Delta(text.into())));
        self
    }

    /// Emit an arbitrary event
    #[must_use]
    pub fn event(mut self, event: ProviderEvent) -> Self {
        self.steps.push((Duration::ZERO, event));
        self
    }

    /// Delay the next step
    #[must_use]
    pub fn pause(mut self, delay: Duration) -> Self {
        self.steps.push((delay, ProviderEvent::Delta(String::new())));
        self
    }

    /// End the turn normally
    #[must_use]
    pub fn complete(self) -> Self {
        self.event(ProviderEvent::TurnComplete)
    }

    /// End the turn with a transport error
    #[must_use]
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.event(ProviderEvent::Error(message.into()))
    }
}

/// A call the scripted provider received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    /// `connect`
    Connect(SessionId),
    /// `send` with the message text
    Send(SessionId, String),
    /// `interrupt`
    Interrupt(SessionId),
    /// `disconnect`
    Disconnect(SessionId),
    /// `ping_provider` / `ping_model`
    Ping(ProviderId, Option<ModelId>),
}

#[derive(Debug, Default)]
struct ScriptState {
    turns: VecDeque<ScriptedTurn>,
    unready: Option<String>,
    connect_failures: u32,
    failing_targets: HashSet<(ProviderId, Option<ModelId>)>,
    ping_delay: Duration,
    calls: Vec<ProviderCall>,
    pings_in_flight: usize,
    max_pings_in_flight: usize,
}

/// Provider that replays scripted turns
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedProvider {
    /// Provider with an empty script (every turn replies "Done.")
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a turn to play back on the next `send`
    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.state.lock().turns.push_back(turn);
    }

    /// Fail the readiness preflight with a remediation message
    pub fn set_unready(&self, remediation: impl Into<String>) {
        self.state.lock().unready = Some(remediation.into());
    }

    /// Fail the next `count` connect attempts
    pub fn fail_connects(&self, count: u32) {
        self.state.lock().connect_failures = count;
    }

    /// Make pings of this target fail
    pub fn fail_ping(&self, provider: impl Into<ProviderId>, model: Option<ModelId>) {
        self.state
            .lock()
            .failing_targets
            .insert((provider.into(), model));
    }

    /// Delay every ping by `delay`
    pub fn set_ping_delay(&self, delay: Duration) {
        self.state.lock().ping_delay = delay;
    }

    /// Calls received so far
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().calls.clone()
    }

    /// Highest number of pings that were in flight at once
    #[must_use]
    pub fn max_pings_in_flight(&self) -> usize {
        self.state.lock().max_pings_in_flight
    }

    fn record(&self, call: ProviderCall) {
        self.state.lock().calls.push(call);
    }

    async fn ping(&self, provider: ProviderId, model: Option<ModelId>) -> Result<Duration, ProviderError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(ProviderCall::Ping(provider.clone(), model.clone()));
            state.pings_in_flight += 1;
            state.max_pings_in_flight = state.max_pings_in_flight.max(state.pings_in_flight);
            state.ping_delay
        };
        let _guard = InFlightGuard(Arc::clone(&self.state));

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .state
            .lock()
            .failing_targets
            .contains(&(provider.clone(), model.clone()));
        if failing {
            let target = model.map_or_else(|| provider.to_string(), |m| format!("{provider}/{m}"));
            return Err(ProviderError::connection(format!("{target} did not answer")));
        }
        Ok(delay)
    }
}

struct InFlightGuard(Arc<Mutex<ScriptState>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.pings_in_flight = state.pings_in_flight.saturating_sub(1);
    }
}

impl AgentProvider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        ProviderId::from(SCRIPTED_PROVIDER_ID)
    }

    fn check_ready(&self) -> BoxFuture<'_, Result<(), ProviderError>> {
        let unready = self.state.lock().unready.clone();
        async move {
            match unready {
                Some(remediation) => Err(ProviderError::unready(SCRIPTED_PROVIDER_ID, remediation)),
                None => Ok(()),
            }
        }
        .boxed()
    }

    fn connect(&self, request: ConnectRequest) -> BoxFuture<'_, Result<(), ProviderError>> {
        let result = {
            let mut state = self.state.lock();
            state.calls.push(ProviderCall::Connect(request.session_id));
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                Err(ProviderError::connection("scripted connect failure"))
            } else {
                Ok(())
            }
        };
        async move { result }.boxed()
    }

    fn send(&self, request: SendRequest) -> BoxFuture<'_, Result<EventStream, ProviderError>> {
        async move {
            let turn = {
                let mut state = self.state.lock();
                state
                    .calls
                    .push(ProviderCall::Send(request.session_id, request.message));
                state
                    .turns
                    .pop_front()
                    .unwrap_or_else(|| ScriptedTurn::reply(DEFAULT_REPLY))
            };

            let stream = async_stream::stream! {
                for (delay, event) in turn.steps {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    yield event;
                }
            };
            Ok(Box::pin(stream) as EventStream)
        }
        .boxed()
    }

    fn interrupt(&self, session_id: SessionId) -> BoxFuture<'_, Result<(), ProviderError>> {
        self.record(ProviderCall::Interrupt(session_id));
        async { Ok(()) }.boxed()
    }

    fn disconnect(&self, session_id: SessionId) -> BoxFuture<'_, Result<(), ProviderError>> {
        self.record(ProviderCall::Disconnect(session_id));
        async { Ok(()) }.boxed()
    }

    fn ping_provider(&self, provider: ProviderId) -> BoxFuture<'_, Result<Duration, ProviderError>> {
        self.ping(provider, None).boxed()
    }

    fn ping_model(
        &self,
        provider: ProviderId,
        model: ModelId,
    ) -> BoxFuture<'_, Result<Duration, ProviderError>> {
        self.ping(provider, Some(model)).boxed()
    }
}
