//! Command building for agent processes

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::config::CommandSpec;
use crate::provider::ConnectRequest;
use crate::types::identifiers::ModelId;
use crate::types::modes::{PermissionMode, SandboxMode};

/// Builds commands for one resolved executable
pub(super) struct CommandBuilder<'a> {
    program: &'a Path,
    spec: &'a CommandSpec,
}

impl<'a> CommandBuilder<'a> {
    pub(super) fn new(program: &'a Path, spec: &'a CommandSpec) -> Self {
        Self { program, spec }
    }

    /// Long-lived session process speaking JSON lines on stdio
    pub(super) fn session(&self, request: &ConnectRequest) -> Command {
        let mut cmd = self.base();
        cmd.args(session_args(request));

        cmd.current_dir(&request.cwd);
        cmd.env("PWD", request.cwd.to_string_lossy().as_ref());

        // Piped stderr keeps the child away from the parent terminal
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// One-shot command with extra arguments and no stdin
    pub(super) fn oneshot(&self, args: &[String], model: Option<&ModelId>) -> Command {
        let mut cmd = self.base();
        cmd.args(args);
        if let Some(model) = model {
            cmd.arg("--model").arg(model.as_str());
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    fn base(&self) -> Command {
        let mut cmd = Command::new(self.program);
        cmd.args(&self.spec.args);

        let mut process_env = env::vars().collect::<HashMap<_, _>>();
        for (key, value) in self.spec.filtered_env() {
            process_env.insert(key.clone(), value.clone());
        }
        cmd.envs(process_env);
        cmd
    }
}

fn session_args(request: &ConnectRequest) -> Vec<String> {
    let permission = match request.permission_mode {
        PermissionMode::VerifyFirst => "verify-first",
        PermissionMode::ProceedAlways => "proceed-always",
    };
    let sandbox = match request.sandbox {
        SandboxMode::ReadOnly => "read-only",
        SandboxMode::WorkspaceWrite => "workspace-write",
    };
    vec![
        "--input-format".to_string(),
        "stream-json".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--model".to_string(),
        request.model.to_string(),
        "--permission-mode".to_string(),
        permission.to_string(),
        "--sandbox".to_string(),
        sandbox.to_string(),
    ]
}
