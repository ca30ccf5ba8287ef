//! Manager configuration
//!
//! Every limit and delay the core uses is product-tunable and lives here.
//! Configuration loads from JSON (durations in milliseconds) or is built in
//! code with [`ManagerConfig::builder`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PanelError, Result};
use crate::probe::ProbeTarget;
use crate::types::identifiers::ModelId;
use crate::types::modes::{PermissionMode, SandboxMode};

// ============================================================================
// DEFAULTS
// ============================================================================

/// Default live session cap
pub const DEFAULT_MAX_LIVE_SESSIONS: usize = 8;

/// Default history entries kept per workspace
pub const DEFAULT_MAX_HISTORY_ENTRIES: usize = 50;

/// Default idle time before a streaming turn counts as stalled (90 seconds)
pub const DEFAULT_STALL_TIMEOUT_MS: u64 = 90_000;

/// Default watchdog sweep period (5 seconds)
pub const DEFAULT_WATCHDOG_INTERVAL_MS: u64 = 5_000;

/// Default delta debounce (40 ms)
pub const DEFAULT_DELTA_FLUSH_DELAY_MS: u64 = 40;

/// Default duplicate-activity coalescing window (4 seconds)
pub const DEFAULT_ACTIVITY_COALESCE_WINDOW_MS: u64 = 4_000;

/// Default activity snapshot cadence (250 ms)
pub const DEFAULT_ACTIVITY_PUBLISH_INTERVAL_MS: u64 = 250;

/// Default automatic continuations per user turn
pub const DEFAULT_MAX_AUTO_CONTINUATIONS: u32 = 2;

/// Default connect attempts per `connect_with_retry`
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Default delay between connect attempts (750 ms)
pub const DEFAULT_CONNECT_RETRY_DELAY_MS: u64 = 750;

/// Default concurrent health probes
pub const DEFAULT_PROBE_CONCURRENCY: usize = 4;

/// Prompt sent when a finished turn looks truncated
pub const DEFAULT_CONTINUATION_PROMPT: &str = "Continue from where you left off.";

/// Model used when neither the request nor the workspace names one
pub const FALLBACK_MODEL: &str = "default";

// ============================================================================
// WORKSPACE SETTINGS
// ============================================================================

/// Per-workspace defaults and limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Model for sessions that do not name one
    pub default_model: ModelId,
    /// Most permissive sandbox a session may use
    pub max_sandbox: SandboxMode,
    /// Most permissive permission mode a session may use
    pub max_permission: PermissionMode,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            default_model: ModelId::from(FALLBACK_MODEL),
            max_sandbox: SandboxMode::WorkspaceWrite,
            max_permission: PermissionMode::ProceedAlways,
        }
    }
}

// ============================================================================
// MANAGER CONFIG
// ============================================================================

/// Configuration for [`SessionManager`](crate::SessionManager)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Live session cap
    pub max_live_sessions: usize,
    /// History entries kept per workspace
    pub max_history_entries: usize,
    /// Idle time before a streaming turn counts as stalled
    #[serde(with = "duration_ms")]
    pub stall_timeout: Duration,
    /// Watchdog sweep period
    #[serde(with = "duration_ms")]
    pub watchdog_interval: Duration,
    /// Delta debounce delay
    #[serde(with = "duration_ms")]
    pub delta_flush_delay: Duration,
    /// Window in which identical activity events fold together
    #[serde(with = "duration_ms")]
    pub activity_coalesce_window: Duration,
    /// Cadence of throttled activity snapshots
    #[serde(with = "duration_ms")]
    pub activity_publish_interval: Duration,
    /// Automatic continuations allowed per user turn
    pub max_auto_continuations: u32,
    /// Text of the automatic continuation prompt
    pub continuation_prompt: String,
    /// Attempts per `connect_with_retry`
    pub connect_attempts: u32,
    /// Delay between connect attempts
    #[serde(with = "duration_ms")]
    pub connect_retry_delay: Duration,
    /// Concurrent health probes
    pub probe_concurrency: usize,
    /// Run a health probe when the runtime starts
    pub probe_on_startup: bool,
    /// Targets probed at startup
    pub probe_targets: Vec<ProbeTarget>,
    /// Settings for workspaces without an explicit entry
    pub default_workspace: WorkspaceSettings,
    /// Per-workspace settings keyed by root
    pub workspaces: HashMap<PathBuf, WorkspaceSettings>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_live_sessions: DEFAULT_MAX_LIVE_SESSIONS,
            max_history_entries: DEFAULT_MAX_HISTORY_ENTRIES,
            stall_timeout: Duration::from_millis(DEFAULT_STALL_TIMEOUT_MS),
            watchdog_interval: Duration::from_millis(DEFAULT_WATCHDOG_INTERVAL_MS),
            delta_flush_delay: Duration::from_millis(DEFAULT_DELTA_FLUSH_DELAY_MS),
            activity_coalesce_window: Duration::from_millis(DEFAULT_ACTIVITY_COALESCE_WINDOW_MS),
            activity_publish_interval: Duration::from_millis(DEFAULT_ACTIVITY_PUBLISH_INTERVAL_MS),
            max_auto_continuations: DEFAULT_MAX_AUTO_CONTINUATIONS,
            continuation_prompt: DEFAULT_CONTINUATION_PROMPT.to_string(),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_retry_delay: Duration::from_millis(DEFAULT_CONNECT_RETRY_DELAY_MS),
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            probe_on_startup: true,
            probe_targets: Vec::new(),
            default_workspace: WorkspaceSettings::default(),
            workspaces: HashMap::new(),
        }
    }
}

impl ManagerConfig {
    /// Create a new builder starting from the defaults
    #[must_use]
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::default()
    }

    /// Parse configuration from JSON; missing fields take their defaults
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or the values are invalid
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject values the manager cannot operate with
    ///
    /// # Errors
    /// Returns `PanelError::InvalidConfig` naming the offending field
    pub fn validate(&self) -> Result<()> {
        if self.max_live_sessions == 0 {
            return Err(PanelError::invalid_config("max_live_sessions must be > 0"));
        }
        if self.max_history_entries == 0 {
            return Err(PanelError::invalid_config("max_history_entries must be > 0"));
        }
        if self.connect_attempts == 0 {
            return Err(PanelError::invalid_config("connect_attempts must be > 0"));
        }
        if self.probe_concurrency == 0 {
            return Err(PanelError::invalid_config("probe_concurrency must be > 0"));
        }
        if self.watchdog_interval.is_zero() {
            return Err(PanelError::invalid_config("watchdog_interval must be > 0"));
        }
        Ok(())
    }

    /// Settings for a workspace root, falling back to the default workspace
    #[must_use]
    pub fn workspace_settings(&self, root: &Path) -> &WorkspaceSettings {
        self.workspaces.get(root).unwrap_or(&self.default_workspace)
    }
}

// ============================================================================
// Builder for ManagerConfig
// ============================================================================

/// Builder for `ManagerConfig`
#[derive(Debug, Default)]
pub struct ManagerConfigBuilder {
    config: ManagerConfig,
}

impl ManagerConfigBuilder {
    /// Set the live session cap
    #[must_use]
    pub const fn max_live_sessions(mut self, max: usize) -> Self {
        self.config.max_live_sessions = max;
        self
    }

    /// Set the per-workspace history cap
    #[must_use]
    pub const fn max_history_entries(mut self, max: usize) -> Self {
        self.config.max_history_entries = max;
        self
    }

    /// Set the stall threshold
    #[must_use]
    pub const fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.config.stall_timeout = timeout;
        self
    }

    /// Set the watchdog sweep period
    #[must_use]
    pub const fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.config.watchdog_interval = interval;
        self
    }

    /// Set the delta debounce delay
    #[must_use]
    pub const fn delta_flush_delay(mut self, delay: Duration) -> Self {
        self.config.delta_flush_delay = delay;
        self
    }

    /// Set the activity coalescing window
    #[must_use]
    pub const fn activity_coalesce_window(mut self, window: Duration) -> Self {
        self.config.activity_coalesce_window = window;
        self
    }

    /// Set the activity snapshot cadence
    #[must_use]
    pub const fn activity_publish_interval(mut self, interval: Duration) -> Self {
        self.config.activity_publish_interval = interval;
        self
    }

    /// Set the automatic continuation bound
    #[must_use]
    pub const fn max_auto_continuations(mut self, max: u32) -> Self {
        self.config.max_auto_continuations = max;
        self
    }

    /// Set the continuation prompt text
    #[must_use]
    pub fn continuation_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.continuation_prompt = prompt.into();
        self
    }

    /// Set connect attempts and the delay between them
    #[must_use]
    pub const fn connect_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.config.connect_attempts = attempts;
        self.config.connect_retry_delay = delay;
        self
    }

    /// Set the probe pool size
    #[must_use]
    pub const fn probe_concurrency(mut self, workers: usize) -> Self {
        self.config.probe_concurrency = workers;
        self
    }

    /// Set startup probing and its targets
    #[must_use]
    pub fn startup_probe(mut self, enabled: bool, targets: Vec<ProbeTarget>) -> Self {
        self.config.probe_on_startup = enabled;
        self.config.probe_targets = targets;
        self
    }

    /// Set the settings used for unlisted workspaces
    #[must_use]
    pub fn default_workspace(mut self, settings: WorkspaceSettings) -> Self {
        self.config.default_workspace = settings;
        self
    }

    /// Add settings for one workspace root
    #[must_use]
    pub fn workspace(mut self, root: impl Into<PathBuf>, settings: WorkspaceSettings) -> Self {
        self.config.workspaces.insert(root.into(), settings);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ManagerConfig {
        self.config
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
