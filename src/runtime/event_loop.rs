//! The runtime event loop
//!
//! One task owns the [`SessionManager`] and is the only place its state
//! changes. It waits on four things at once: commands from handles, results
//! from provider tasks, the manager's next timer deadline, and cancellation.
//! Every manager call returns effects. Each session's share of a batch runs
//! on its own task, in order, so a slow session never holds up another.

use futures::StreamExt;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::commands::{LoopEvent, RuntimeCommand};
use crate::manager::{Effect, SessionManager};
use crate::provider::AgentProvider;
use crate::types::identifiers::SessionId;

/// Upper bound on each best-effort disconnect during shutdown
const SHUTDOWN_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) struct EventLoop {
    pub(super) manager: SessionManager,
    pub(super) provider: Arc<dyn AgentProvider>,
    pub(super) command_rx: mpsc::UnboundedReceiver<RuntimeCommand>,
    pub(super) event_tx: mpsc::UnboundedSender<LoopEvent>,
    pub(super) event_rx: mpsc::UnboundedReceiver<LoopEvent>,
    pub(super) cancel: CancellationToken,
}

impl EventLoop {
    pub(super) async fn run(mut self) {
        log::debug!("Panel runtime started");
        loop {
            let deadline = self.manager.next_timer_deadline();
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = self.cancel.cancelled() => break,
                command = self.command_rx.recv() => match command {
                    Some(RuntimeCommand::Apply(job)) => {
                        let effects = job(&mut self.manager);
                        self.execute(effects);
                    }
                    Some(RuntimeCommand::Shutdown { response_tx }) => {
                        self.shutdown().await;
                        let _ = response_tx.send(());
                        return;
                    }
                    // Every handle is gone
                    None => break,
                },
                Some(event) = self.event_rx.recv() => {
                    let effects = self.apply(event);
                    self.execute(effects);
                }
                () = timer => {
                    let effects = self.manager.run_due_timers();
                    self.execute(effects);
                }
            }
        }
        self.shutdown().await;
    }

    fn apply(&mut self, event: LoopEvent) -> Vec<Effect> {
        match event {
            LoopEvent::Connected {
                session_id,
                generation,
                result,
            } => self.manager.on_connect_result(&session_id, generation, result),
            LoopEvent::Provider {
                session_id,
                turn,
                event,
            } => self.manager.on_provider_event(&session_id, turn, event),
            LoopEvent::StreamClosed { session_id, turn } => {
                self.manager.on_stream_closed(&session_id, turn)
            }
            LoopEvent::SendRejected {
                session_id,
                turn,
                error,
            } => self.manager.on_send_rejected(&session_id, turn, &error),
        }
    }

    /// Spawn one provider task per session in the batch
    ///
    /// A session's effects run in the order the manager issued them, so a
    /// `Disconnect` always lands before the `Connect` that follows it.
    fn execute(&self, effects: Vec<Effect>) {
        let mut chains: Vec<(SessionId, Vec<Effect>)> = Vec::new();
        for effect in effects {
            let session_id = effect.session_id().clone();
            match chains.iter_mut().find(|(id, _)| *id == session_id) {
                Some((_, chain)) => chain.push(effect),
                None => chains.push((session_id, vec![effect])),
            }
        }

        for (_, chain) in chains {
            let provider = Arc::clone(&self.provider);
            let events = self.event_tx.clone();
            tokio::spawn(async move {
                for effect in chain {
                    run_effect(&provider, &events, effect).await;
                }
            });
        }
    }

    /// Archive everything and wait (bounded) for the disconnects
    async fn shutdown(&mut self) {
        self.cancel.cancel();
        let effects = self.manager.shutdown();
        let provider = &self.provider;
        let disconnects = effects.into_iter().filter_map(|effect| match effect {
            Effect::Disconnect { session_id } => Some(async move {
                match tokio::time::timeout(
                    SHUTDOWN_DISCONNECT_TIMEOUT,
                    provider.disconnect(session_id.clone()),
                )
                .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log::debug!("[{session_id}] Disconnect failed (ignored): {e}"),
                    Err(_) => log::warn!("[{session_id}] Disconnect timed out"),
                }
            }),
            _ => None,
        });
        join_all(disconnects).await;
        log::debug!("Panel runtime stopped");
    }
}

/// Execute one effect, reporting its outcome back to the loop
///
/// A turn's stream is drained on its own task once the provider accepts it.
async fn run_effect(
    provider: &Arc<dyn AgentProvider>,
    events: &mpsc::UnboundedSender<LoopEvent>,
    effect: Effect,
) {
    match effect {
        Effect::Connect {
            session_id,
            generation,
            request,
        } => {
            let result = match provider.check_ready().await {
                Ok(()) => provider.connect(request).await,
                Err(e) => Err(e),
            };
            let _ = events.send(LoopEvent::Connected {
                session_id,
                generation,
                result,
            });
        }
        Effect::Send {
            session_id,
            turn,
            request,
        } => {
            let mut stream = match provider.send(request).await {
                Ok(stream) => stream,
                Err(error) => {
                    let _ = events.send(LoopEvent::SendRejected {
                        session_id,
                        turn,
                        error,
                    });
                    return;
                }
            };
            let events = events.clone();
            tokio::spawn(async move {
                while let Some(event) = stream.next().await {
                    let terminal = event.is_terminal();
                    let sent = events.send(LoopEvent::Provider {
                        session_id: session_id.clone(),
                        turn,
                        event,
                    });
                    if terminal || sent.is_err() {
                        return;
                    }
                }
                let _ = events.send(LoopEvent::StreamClosed { session_id, turn });
            });
        }
        Effect::Interrupt { session_id } => {
            if let Err(e) = provider.interrupt(session_id.clone()).await {
                log::debug!("[{session_id}] Interrupt failed (ignored): {e}");
            }
        }
        Effect::Disconnect { session_id } => {
            if let Err(e) = provider.disconnect(session_id.clone()).await {
                log::debug!("[{session_id}] Disconnect failed (ignored): {e}");
            }
        }
    }
}
