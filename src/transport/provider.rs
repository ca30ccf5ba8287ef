//! [`AgentProvider`] backed by a command-line agent

use futures::{FutureExt, StreamExt};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::command::CommandBuilder;
use super::config::CommandSpec;
use super::process::AgentProcess;
use crate::error::ProviderError;
use crate::provider::{AgentProvider, ConnectRequest, EventStream, SendRequest};
use crate::types::identifiers::{ModelId, ProviderId, SessionId};

type ProcessSlot = Arc<tokio::sync::Mutex<AgentProcess>>;

/// Runs one agent process per connected session
///
/// # Example
///
/// ```no_run
/// use kodegen_agent_panels::{CommandProvider, CommandSpec};
///
/// let provider = CommandProvider::new(
///     CommandSpec::new("claude", "claude")
///         .auth_check(["auth", "status"])
///         .install_hint("Install with `npm install -g @anthropic-ai/claude-code`")
///         .login_hint("Run `claude login`"),
/// );
/// ```
pub struct CommandProvider {
    spec: CommandSpec,
    processes: Mutex<HashMap<SessionId, ProcessSlot>>,
}

impl CommandProvider {
    /// Provider for the agent described by `spec`
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Launch description
    #[must_use]
    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Sessions with a live process
    #[must_use]
    pub fn connected_sessions(&self) -> Vec<SessionId> {
        self.processes.lock().keys().cloned().collect()
    }

    /// Locate the executable on PATH or at the given path
    ///
    /// # Errors
    /// Returns `ProviderError::Unready` with the install hint when missing
    pub fn find_program(&self) -> Result<PathBuf, ProviderError> {
        let candidate = Path::new(&self.spec.program);
        if candidate.components().count() > 1 {
            if candidate.is_file() {
                return Ok(candidate.to_path_buf());
            }
        } else if let Ok(path) = which::which(&self.spec.program) {
            return Ok(path);
        }

        let remediation = self.spec.install_hint.clone().unwrap_or_else(|| {
            format!("Install `{}` and make sure it is on PATH", self.spec.program)
        });
        Err(ProviderError::unready(self.spec.provider.clone(), remediation))
    }

    fn slot(&self, session_id: &SessionId) -> Option<ProcessSlot> {
        self.processes.lock().get(session_id).cloned()
    }

    /// Run a one-shot command and time it
    async fn run_timed(
        &self,
        args: &[String],
        model: Option<&ModelId>,
    ) -> Result<Duration, ProviderError> {
        let program = self.find_program()?;
        let mut cmd = CommandBuilder::new(&program, &self.spec).oneshot(args, model);

        let started = Instant::now();
        let timeout = self.spec.check_timeout();
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                ProviderError::timeout(format!(
                    "`{}` did not answer within {}s",
                    self.spec.program,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| ProviderError::connection(format!("Failed to run `{}`: {e}", self.spec.program)))?;
        let elapsed = started.elapsed();

        if output.status.success() {
            Ok(elapsed)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().next().unwrap_or("no output").trim().to_string();
            Err(ProviderError::connection(format!(
                "`{}` exited with {}: {detail}",
                self.spec.program, output.status
            )))
        }
    }

    fn check_provider(&self, provider: &ProviderId) -> Result<(), ProviderError> {
        if *provider == self.spec.provider {
            Ok(())
        } else {
            Err(ProviderError::connection(format!("Unknown provider: {provider}")))
        }
    }
}

impl std::fmt::Debug for CommandProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProvider")
            .field("spec", &self.spec)
            .field("sessions", &self.processes.lock().len())
            .finish()
    }
}

impl AgentProvider for CommandProvider {
    fn id(&self) -> ProviderId {
        self.spec.provider.clone()
    }

    fn check_ready(&self) -> BoxFuture<'_, Result<(), ProviderError>> {
        async move {
            self.find_program()?;
            let Some(args) = &self.spec.auth_check else {
                return Ok(());
            };
            match self.run_timed(args, None).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    log::debug!("Auth check for {} failed: {e}", self.spec.provider);
                    let remediation = self.spec.login_hint.clone().unwrap_or_else(|| {
                        format!("Sign in to `{}` and try again", self.spec.program)
                    });
                    Err(ProviderError::unready(self.spec.provider.clone(), remediation))
                }
            }
        }
        .boxed()
    }

    fn connect(&self, request: ConnectRequest) -> BoxFuture<'_, Result<(), ProviderError>> {
        async move {
            let program = self.find_program()?;

            // A reconnect replaces any process still registered
            let previous = self.processes.lock().remove(&request.session_id);
            if let Some(previous) = previous {
                let _ = previous.lock().await.close().await;
            }

            let mut cmd = CommandBuilder::new(&program, &self.spec).session(&request);
            let child = cmd.spawn().map_err(|e| {
                if !request.cwd.exists() {
                    return ProviderError::connection(format!(
                        "Working directory does not exist: {}",
                        request.cwd.display()
                    ));
                }
                ProviderError::connection(format!("Failed to start `{}`: {e}", self.spec.program))
            })?;
            let process =
                AgentProcess::attach(request.session_id.clone(), child, self.spec.max_buffer_size)?;

            log::info!(
                "[{}] Started {} ({})",
                request.session_id,
                self.spec.program,
                request.model
            );
            self.processes.lock().insert(
                request.session_id,
                Arc::new(tokio::sync::Mutex::new(process)),
            );
            Ok(())
        }
        .boxed()
    }

    fn send(&self, request: SendRequest) -> BoxFuture<'_, Result<EventStream, ProviderError>> {
        async move {
            let slot = self
                .slot(&request.session_id)
                .ok_or_else(|| ProviderError::send("Session is not connected"))?;
            let attachments: Vec<String> = request
                .attachments
                .iter()
                .map(|a| a.path.to_string_lossy().into_owned())
                .collect();
            let payload = json!({
                "type": "user",
                "message": request.message,
                "attachments": attachments,
                "mode": request.interaction_mode,
            });

            let mut process = slot.lock().await;
            let mut events = process.begin_turn();
            process.write_json(&payload).await?;
            drop(process);

            let stream = async_stream::stream! {
                while let Some(event) = events.recv().await {
                    let terminal = event.is_terminal();
                    yield event;
                    if terminal {
                        break;
                    }
                }
            };
            Ok(stream.boxed())
        }
        .boxed()
    }

    fn interrupt(&self, session_id: SessionId) -> BoxFuture<'_, Result<(), ProviderError>> {
        async move {
            let Some(slot) = self.slot(&session_id) else {
                return Ok(());
            };
            slot.lock()
                .await
                .write_json(&json!({ "type": "interrupt" }))
                .await
        }
        .boxed()
    }

    fn disconnect(&self, session_id: SessionId) -> BoxFuture<'_, Result<(), ProviderError>> {
        async move {
            let slot = self.processes.lock().remove(&session_id);
            match slot {
                Some(slot) => {
                    log::debug!("[{session_id}] Stopping agent process");
                    slot.lock().await.close().await
                }
                None => Ok(()),
            }
        }
        .boxed()
    }

    fn ping_provider(&self, provider: ProviderId) -> BoxFuture<'_, Result<Duration, ProviderError>> {
        async move {
            self.check_provider(&provider)?;
            self.run_timed(&self.spec.ping_args, None).await
        }
        .boxed()
    }

    fn ping_model(
        &self,
        provider: ProviderId,
        model: ModelId,
    ) -> BoxFuture<'_, Result<Duration, ProviderError>> {
        async move {
            self.check_provider(&provider)?;
            self.run_timed(&self.spec.ping_args, Some(&model)).await
        }
        .boxed()
    }
}
