//! Shared helpers for the integration tests
//!
//! Drives a `SessionManager` on a `ManualClock` and plays the runtime's part
//! by feeding provider results back by hand.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use kodegen_agent_panels::{
    Effect, ManagerConfig, ManualClock, MemoryStore, PanelUpdate, ProviderEvent, SessionId,
    SessionManager, SessionOptions, TurnId,
};
use tokio::sync::broadcast;

pub const WORKSPACE: &str = "/work/repo";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Harness {
    pub manager: SessionManager,
    pub clock: ManualClock,
    pub store: MemoryStore,
}

impl Harness {
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_store(config, MemoryStore::new())
    }

    pub fn with_store(config: ManagerConfig, store: MemoryStore) -> Self {
        init_logging();
        let clock = ManualClock::new();
        let manager = SessionManager::with_clock(
            config,
            Box::new(store.clone()),
            Arc::new(clock.clone()),
        )
        .expect("valid config");
        Self {
            manager,
            clock,
            store,
        }
    }

    pub fn standard() -> Self {
        Self::new(ManagerConfig::default())
    }

    /// Move time forward and run whatever timers came due
    pub fn advance(&mut self, by: Duration) -> Vec<Effect> {
        self.clock.advance(by);
        self.manager.run_due_timers()
    }

    pub fn create(&mut self) -> SessionId {
        self.manager
            .create_session(WORKSPACE, SessionOptions::default())
            .expect("create session")
    }

    /// Answer every connect effect with success, returning the follow-up effects
    pub fn accept_connects(&mut self, effects: Vec<Effect>) -> Vec<Effect> {
        let mut out = Vec::new();
        for effect in effects {
            match effect {
                Effect::Connect {
                    session_id,
                    generation,
                    ..
                } => out.extend(self.manager.on_connect_result(&session_id, generation, Ok(()))),
                other => out.push(other),
            }
        }
        out
    }

    /// Create a session and send its first message through a successful connect
    ///
    /// Returns the session and the turn the `Send` effect was issued for.
    pub fn streaming_session(&mut self, text: &str) -> (SessionId, TurnId) {
        let id = self.create();
        let effects = self.manager.enqueue(&id, text).expect("enqueue");
        let effects = self.accept_connects(effects);
        let turn = sent_turn(&effects).expect("turn sent after connect");
        (id, turn)
    }

    pub fn event(&mut self, id: &SessionId, turn: TurnId, event: ProviderEvent) -> Vec<Effect> {
        self.manager.on_provider_event(id, turn, event)
    }

    pub fn delta(&mut self, id: &SessionId, turn: TurnId, text: &str) -> Vec<Effect> {
        self.event(id, turn, ProviderEvent::Delta(text.to_string()))
    }

    pub fn complete(&mut self, id: &SessionId, turn: TurnId) -> Vec<Effect> {
        self.event(id, turn, ProviderEvent::TurnComplete)
    }
}

pub fn connect_generation(effects: &[Effect]) -> Option<u64> {
    effects.iter().find_map(|e| match e {
        Effect::Connect { generation, .. } => Some(*generation),
        _ => None,
    })
}

pub fn sent_turn(effects: &[Effect]) -> Option<TurnId> {
    effects.iter().find_map(|e| match e {
        Effect::Send { turn, .. } => Some(*turn),
        _ => None,
    })
}

pub fn sent_messages(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Send { request, .. } => Some(request.message.clone()),
            _ => None,
        })
        .collect()
}

pub fn drain(updates: &mut broadcast::Receiver<PanelUpdate>) -> Vec<PanelUpdate> {
    let mut out = Vec::new();
    while let Ok(update) = updates.try_recv() {
        out.push(update);
    }
    out
}
