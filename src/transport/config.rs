//! Configuration for command-line agent providers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::types::identifiers::ProviderId;

/// Default maximum buffer size for one JSON event line (1MB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Default timeout for auth checks and pings (20 seconds)
pub const DEFAULT_CHECK_TIMEOUT_MS: u64 = 20_000;

/// Dangerous environment variables that should not be passed to subprocess
///
/// These variables can affect how the subprocess loads and executes code.
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "PATH",
    "NODE_OPTIONS",
    "PYTHONPATH",
    "PERL5LIB",
    "RUBYLIB",
];

/// How to launch and check one agent CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Provider identity
    pub provider: ProviderId,
    /// Executable name (looked up on PATH) or path
    pub program: String,
    /// Arguments placed before the per-session flags
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment; dangerous variables are dropped
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Arguments of a command that succeeds only when authenticated
    #[serde(default)]
    pub auth_check: Option<Vec<String>>,
    /// Arguments of a cheap liveness command
    #[serde(default = "default_ping_args")]
    pub ping_args: Vec<String>,
    /// Shown when the executable is missing
    #[serde(default)]
    pub install_hint: Option<String>,
    /// Shown when the auth check fails
    #[serde(default)]
    pub login_hint: Option<String>,
    /// Largest accepted event line
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    /// Timeout for auth checks and pings, in milliseconds
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
}

fn default_ping_args() -> Vec<String> {
    vec![String::from("--version")]
}

fn default_max_buffer_size() -> usize {
    DEFAULT_MAX_BUFFER_SIZE
}

fn default_check_timeout_ms() -> u64 {
    DEFAULT_CHECK_TIMEOUT_MS
}

impl CommandSpec {
    /// Spec for `program`, identified as `provider`
    pub fn new(provider: impl Into<ProviderId>, program: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            auth_check: None,
            ping_args: default_ping_args(),
            install_hint: None,
            login_hint: None,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            check_timeout_ms: DEFAULT_CHECK_TIMEOUT_MS,
        }
    }

    /// Append a base argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable for the process
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Require `args` to exit successfully before connecting
    #[must_use]
    pub fn auth_check<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth_check = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the liveness command arguments
    #[must_use]
    pub fn ping_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ping_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Remediation shown when the executable is missing
    #[must_use]
    pub fn install_hint(mut self, hint: impl Into<String>) -> Self {
        self.install_hint = Some(hint.into());
        self
    }

    /// Remediation shown when the auth check fails
    #[must_use]
    pub fn login_hint(mut self, hint: impl Into<String>) -> Self {
        self.login_hint = Some(hint.into());
        self
    }

    /// Timeout for auth checks and pings
    #[must_use]
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    /// Environment passed to child processes
    #[must_use]
    pub fn filtered_env(&self) -> impl Iterator<Item = (&String, &String)> {
        self.env
            .iter()
            .filter(|(key, _)| !DANGEROUS_ENV_VARS.contains(&key.as_str()))
    }
}
