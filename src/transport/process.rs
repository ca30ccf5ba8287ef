//! One spawned agent process per session
//!
//! The process reads JSON requests on stdin and writes JSON events on
//! stdout, one per line. A reader task parses stdout into
//! [`ProviderEvent`]s and routes them to the turn currently streaming; a
//! second task drains stderr into the log.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ProviderError;
use crate::provider::{ProviderEvent, parse_event};
use crate::types::identifiers::SessionId;

/// How long a closing process may take before it is killed
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sender of the turn currently streaming, if any
type TurnRoute = Arc<Mutex<Option<mpsc::UnboundedSender<ProviderEvent>>>>;

pub(super) struct AgentProcess {
    session_id: SessionId,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    route: TurnRoute,
    reader_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl AgentProcess {
    /// Take the stdio handles of a freshly spawned child and start its tasks
    pub(super) fn attach(
        session_id: SessionId,
        mut child: Child,
        max_buffer_size: usize,
    ) -> Result<Self, ProviderError> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProviderError::connection("Failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::connection("Failed to get stdout handle"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProviderError::connection("Failed to get stderr handle"))?;

        let stderr_id = session_id.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("[{stderr_id}] stderr: {line}");
            }
        });

        let route: TurnRoute = Arc::new(Mutex::new(None));
        let reader_task = tokio::spawn(read_events(
            session_id.clone(),
            stdout,
            Arc::clone(&route),
            max_buffer_size,
        ));

        Ok(Self {
            session_id,
            child: Some(child),
            stdin: Some(stdin),
            route,
            reader_task: Some(reader_task),
            stderr_task: Some(stderr_task),
        })
    }

    /// Route subsequent events to a new turn
    ///
    /// Replacing the route ends the previous turn's stream.
    pub(super) fn begin_turn(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.route.lock() = Some(tx);
        rx
    }

    /// Write one JSON request line
    pub(super) async fn write_json(
        &mut self,
        value: &serde_json::Value,
    ) -> Result<(), ProviderError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ProviderError::send("Process stdin is closed"))?;
        let mut line = serde_json::to_string(value)
            .map_err(|e| ProviderError::protocol(format!("Failed to encode request: {e}")))?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ProviderError::send(format!("Failed to write to stdin: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| ProviderError::send(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Close stdin, wait for exit, kill on timeout
    pub(super) async fn close(&mut self) -> Result<(), ProviderError> {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        let result = match self.child.take() {
            Some(mut child) => match tokio::time::timeout(CLOSE_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => {
                    log::debug!("[{}] Agent process exited: {status}", self.session_id);
                    Ok(())
                }
                Ok(Err(e)) => Err(ProviderError::from(e)),
                Err(_) => {
                    log::warn!(
                        "[{}] Agent process did not exit within {}s, killing",
                        self.session_id,
                        CLOSE_TIMEOUT.as_secs()
                    );
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    Ok(())
                }
            },
            None => Ok(()),
        };

        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.route.lock().take();
        result
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }
}

/// Parse stdout into events until EOF
///
/// Lines accumulate until they form a complete JSON value. Values that are
/// not valid events are logged and skipped, as are events arriving while no
/// turn is streaming. A terminal event closes the route. Read errors become a
/// final `Error` event; EOF drops the route so the open stream ends.
async fn read_events(
    session_id: SessionId,
    stdout: ChildStdout,
    route: TurnRoute,
    max_buffer_size: usize,
) {
    let mut stdout = BufReader::new(stdout);
    let mut json_buffer = String::new();

    loop {
        let mut line = String::new();
        match stdout.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                json_buffer.push_str(line);
                if json_buffer.len() > max_buffer_size {
                    log::warn!(
                        "[{session_id}] Event exceeded maximum buffer size of {max_buffer_size} bytes, dropped"
                    );
                    json_buffer.clear();
                    continue;
                }

                let Ok(data) = serde_json::from_str::<serde_json::Value>(&json_buffer) else {
                    // Incomplete, keep accumulating
                    continue;
                };
                json_buffer.clear();

                match parse_event(data) {
                    Ok(event) => deliver(&session_id, &route, event),
                    Err(e) => log::warn!("[{session_id}] Skipping invalid event: {e}"),
                }
            }
            Err(e) => {
                deliver(
                    &session_id,
                    &route,
                    ProviderEvent::Error(format!("Failed to read agent output: {e}")),
                );
                break;
            }
        }
    }
    route.lock().take();
    log::debug!("[{session_id}] Agent output closed");
}

fn deliver(session_id: &SessionId, route: &TurnRoute, event: ProviderEvent) {
    let mut route = route.lock();
    let terminal = event.is_terminal();
    match route.as_ref() {
        Some(tx) => {
            if tx.send(event).is_err() {
                route.take();
                return;
            }
        }
        None => {
            log::debug!("[{session_id}] Dropping event outside a turn: {event:?}");
            return;
        }
    }
    if terminal {
        route.take();
    }
}
