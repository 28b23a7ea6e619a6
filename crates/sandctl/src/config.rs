//! Configuration for sandctl
//!
//! Settings live in a single TOML file:
//!
//! ```text
//! ~/.sandctl/
//! ├── config.toml    # this file
//! └── runtime.toml   # persisted sandbox state (see `state`)
//! ```
//!
//! The base directory can be moved with `SANDCTL_HOME`. A handful of values
//! can also be overridden through environment variables, which win over the
//! file.

use crate::error::{Result, SandctlError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable that relocates the base directory
pub const ENV_HOME: &str = "SANDCTL_HOME";
/// Environment variable overriding `remote.url`
pub const ENV_REMOTE_URL: &str = "SANDCTL_REMOTE_URL";
/// Environment variable overriding `task.poll_interval_ms`
pub const ENV_POLL_INTERVAL_MS: &str = "SANDCTL_POLL_INTERVAL_MS";
/// Environment variable overriding `task.waiting_timeout_secs`
pub const ENV_WAITING_TIMEOUT_SECS: &str = "SANDCTL_WAITING_TIMEOUT_SECS";
/// Environment variable overriding `update.manifest_url`
pub const ENV_MANIFEST_URL: &str = "SANDCTL_MANIFEST_URL";

const CONFIG_FILE: &str = "config.toml";
const STATE_FILE: &str = "runtime.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandctlConfig {
    pub remote: RemoteConfig,
    pub sandbox: SandboxConfig,
    pub task: TaskConfig,
    pub update: UpdateConfig,
}

/// Remote management API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the management API
    pub url: String,

    /// Per-request timeout for the HTTP client
    pub request_timeout_secs: u64,

    /// Basic auth user, if the remote requires it
    pub user: Option<String>,

    /// Basic auth password
    pub password: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4848".to_string(),
            request_timeout_secs: 180,
            user: None,
            password: None,
        }
    }
}

/// Local sandbox settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// HTTP port the sandbox listens on
    pub http_port: u16,

    /// Management and info ports that must also be free before start
    pub reserved_ports: Vec<u16>,

    /// How long `stop` waits for the process to disappear
    pub stop_timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            reserved_ports: vec![4848, 2609],
            stop_timeout_secs: 30,
        }
    }
}

impl SandboxConfig {
    /// Every port that must be bindable before a sandbox starts
    pub fn required_ports(&self) -> Vec<u16> {
        let mut ports = vec![self.http_port];
        for port in &self.reserved_ports {
            if !ports.contains(port) {
                ports.push(*port);
            }
        }
        ports
    }
}

/// Remote task polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub poll_interval_ms: u64,
    pub waiting_timeout_secs: u64,
    pub show_progress: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            waiting_timeout_secs: 120,
            show_progress: true,
        }
    }
}

impl TaskConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn waiting_timeout(&self) -> Duration {
        Duration::from_secs(self.waiting_timeout_secs)
    }
}

/// Where `sandctl latest` looks up the newest release
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// JSON manifest with a top-level `version` field
    pub manifest_url: Option<String>,
}

impl SandctlConfig {
    /// Load configuration from the default location, falling back to defaults
    /// when no file exists yet. Environment overrides are applied either way.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_or_default(&path)
    }

    /// Load from `path` if it exists, otherwise start from defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load_from_path(path)?
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Self::default()
        };

        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Load a file the user named explicitly. Unlike `load_or_default`, a
    /// missing file is an error.
    pub fn load_explicit(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path without env overrides
    pub fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .map_err(|e| SandctlError::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| SandctlError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a specific path atomically
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = toml::to_string_pretty(self)
            .map_err(|e| SandctlError::config(format!("Failed to serialize config: {}", e)))?;

        write_atomic(path, &content)?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides using an arbitrary variable lookup
    pub fn merge_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_REMOTE_URL) {
            self.remote.url = url;
        }

        if let Some(url) = lookup(ENV_MANIFEST_URL) {
            self.update.manifest_url = Some(url);
        }

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            self.task.poll_interval_ms = raw.trim().parse().map_err(|_| {
                SandctlError::config(format!("{} must be a number, got '{}'", ENV_POLL_INTERVAL_MS, raw))
            })?;
        }

        if let Some(raw) = lookup(ENV_WAITING_TIMEOUT_SECS) {
            self.task.waiting_timeout_secs = raw.trim().parse().map_err(|_| {
                SandctlError::config(format!(
                    "{} must be a number, got '{}'",
                    ENV_WAITING_TIMEOUT_SECS, raw
                ))
            })?;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.remote.url) {
            return Err(SandctlError::config(format!(
                "remote.url must be an http(s) URL, got '{}'",
                self.remote.url
            )));
        }

        if let Some(url) = &self.update.manifest_url {
            if !is_http_url(url) {
                return Err(SandctlError::config(format!(
                    "update.manifest_url must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }

        if self.remote.request_timeout_secs == 0 {
            return Err(SandctlError::config("remote.request_timeout_secs must be greater than 0"));
        }

        if self.task.poll_interval_ms == 0 {
            return Err(SandctlError::config("task.poll_interval_ms must be greater than 0"));
        }

        if self.task.waiting_timeout_secs == 0 {
            return Err(SandctlError::config("task.waiting_timeout_secs must be greater than 0"));
        }

        if self.sandbox.http_port == 0 {
            return Err(SandctlError::config("sandbox.http_port must be greater than 0"));
        }

        Ok(())
    }

    /// Base directory (~/.sandctl), overridable with `SANDCTL_HOME`
    pub fn base_dir() -> Result<PathBuf> {
        if let Ok(home) = std::env::var(ENV_HOME) {
            return Ok(PathBuf::from(home));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| SandctlError::config("Could not determine home directory"))?;

        Ok(home.join(".sandctl"))
    }

    /// Configuration file path (~/.sandctl/config.toml)
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join(CONFIG_FILE))
    }

    /// Persisted runtime state path (~/.sandctl/runtime.toml)
    pub fn state_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join(STATE_FILE))
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Write `content` next to `path` and rename it into place, so readers see
/// either the old file or the new one.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| SandctlError::internal(format!("Not a file path: {}", path.display())))?;
    temp_name.push(format!(".{}.tmp", std::process::id()));
    let temp_path = path.with_file_name(temp_name);

    std::fs::write(&temp_path, content)?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(())
}
