//! Persisted runtime state shared across CLI invocations.
//!
//! A single small TOML record tells every invocation whether a sandbox is
//! running and under which pid. There is no cross-process locking: the CLI is
//! driven by one operator issuing commands one after another, so the last
//! writer wins.

use crate::config::write_atomic;
use crate::error::{Result, SandctlError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Days after which the CLI reminds the user to look for a newer version
pub const VERSION_CHECK_MAX_AGE_DAYS: i64 = 30;

/// Mode the sandbox was started in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Dev,
    Default,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Dev => write!(f, "dev"),
            RunMode::Default => write!(f, "default"),
        }
    }
}

/// The on-disk record.
///
/// `running_name` is empty exactly when `running_pid` is 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub running_name: String,
    pub running_pid: u32,
    pub mode: RunMode,
    pub latest_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_check: Option<DateTime<Utc>>,
}

impl PersistedState {
    /// Whether a sandbox is recorded as running
    pub fn is_active(&self) -> bool {
        !self.running_name.is_empty() && self.running_pid != 0
    }

    /// Whether the name/pid pair satisfies the empty-iff-zero invariant
    pub fn is_consistent(&self) -> bool {
        self.running_name.is_empty() == (self.running_pid == 0)
    }

    fn set_running(&mut self, name: &str, pid: u32, mode: RunMode) {
        self.running_name = name.to_string();
        self.running_pid = pid;
        self.mode = mode;
    }

    fn clear_running(&mut self) {
        self.running_name.clear();
        self.running_pid = 0;
    }
}

/// Reason to nudge the user about CLI updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionNotice {
    /// The last remote version check is older than the allowed age
    StaleCheck { days: i64 },
    /// A newer CLI version was seen at the last check
    NewerAvailable { version: String },
}

impl std::fmt::Display for VersionNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionNotice::StaleCheck { days } => {
                write!(
                    f,
                    "Last version check was {} days ago, run 'sandctl latest' to check for updates",
                    days
                )
            }
            VersionNotice::NewerAvailable { version } => {
                write!(f, "Latest available version is {}, consider upgrading sandctl", version)
            }
        }
    }
}

/// Reads and writes the persisted state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current record. A missing file is the inactive zero value.
    pub fn read(&self) -> Result<PersistedState> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, treating as inactive", self.path.display());
                return Ok(PersistedState::default());
            }
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content).map_err(|e| {
            SandctlError::state(format!(
                "Failed to parse {} ({}); delete the file to reset",
                self.path.display(),
                e
            ))
        })
    }

    /// Overwrite the record atomically
    pub fn write(&self, state: &PersistedState) -> Result<()> {
        let content = toml::to_string_pretty(state)
            .map_err(|e| SandctlError::state(format!("Failed to serialize state: {}", e)))?;
        write_atomic(&self.path, &content)
    }

    /// Read, modify and write back the record
    pub fn update<F>(&self, f: F) -> Result<PersistedState>
    where
        F: FnOnce(&mut PersistedState),
    {
        let mut state = self.read()?;
        f(&mut state);
        self.write(&state)?;
        Ok(state)
    }

    /// Record `name`/`pid` as the running sandbox
    pub fn record_running(&self, name: &str, pid: u32, mode: RunMode) -> Result<PersistedState> {
        if name.is_empty() || pid == 0 {
            return Err(SandctlError::internal(format!(
                "Refusing to record running sandbox with name '{}' and pid {}",
                name, pid
            )));
        }

        info!("Recording sandbox '{}' as running with PID {}", name, pid);
        self.update(|state| state.set_running(name, pid, mode))
    }

    /// Mark the record inactive, keeping bookkeeping fields
    pub fn clear_running(&self) -> Result<PersistedState> {
        debug!("Clearing running sandbox record");
        self.update(PersistedState::clear_running)
    }

    /// Drop records that are inconsistent or point at a dead process
    pub fn reconcile<F>(&self, is_alive: F) -> Result<PersistedState>
    where
        F: Fn(u32) -> bool,
    {
        let state = self.read()?;

        let stale =
            !state.is_consistent() || (state.running_pid != 0 && !is_alive(state.running_pid));

        if !stale {
            return Ok(state);
        }

        warn!(
            "Sandbox '{}' (PID {}) is no longer running, clearing stale record",
            state.running_name, state.running_pid
        );
        self.clear_running()
    }

    /// Version reminder logic. The first call seeds the bookkeeping with the
    /// running CLI version.
    pub fn check_version(&self, app_version: &str, now: DateTime<Utc>) -> Result<Option<VersionNotice>> {
        let mut state = self.read()?;

        if state.latest_version.is_empty() || state.latest_check.is_none() {
            state = self.record_version_check(app_version, now)?;
        }

        let days = state
            .latest_check
            .map(|checked| (now - checked).num_days())
            .unwrap_or_default();

        if days > VERSION_CHECK_MAX_AGE_DAYS {
            return Ok(Some(VersionNotice::StaleCheck { days }));
        }

        if is_newer_version(&state.latest_version, app_version) {
            return Ok(Some(VersionNotice::NewerAvailable {
                version: state.latest_version,
            }));
        }

        Ok(None)
    }

    /// Remember the latest version seen remotely
    pub fn record_version_check(&self, version: &str, now: DateTime<Utc>) -> Result<PersistedState> {
        self.update(|state| {
            state.latest_version = version.to_string();
            state.latest_check = Some(now);
        })
    }
}

/// Compare dotted numeric versions, ignoring any pre-release suffix
pub fn is_newer_version(candidate: &str, current: &str) -> bool {
    match (parse_version(candidate), parse_version(current)) {
        (Some(candidate), Some(current)) => candidate > current,
        _ => false,
    }
}

fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let core = version.trim().trim_start_matches('v');
    let core = core.split(['-', '+']).next()?;
    let mut parts = core.split('.').map(|part| part.parse::<u64>());

    let major = parts.next()?.ok()?;
    let minor = parts.next().unwrap_or(Ok(0)).ok()?;
    let patch = parts.next().unwrap_or(Ok(0)).ok()?;
    Some((major, minor, patch))
}
