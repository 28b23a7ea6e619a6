//! Command handlers for the sandctl CLI

use crate::config::SandctlConfig;
use crate::output;
use crate::process;
use crate::state::{RunMode, StateStore};
use crate::supervisor::{LaunchSpec, SandboxStatus, StartOutcome, StopOutcome, Supervisor};
use crate::task::{HttpTaskApi, MonitorConfig, TaskMonitor, TaskOutcome};
use crate::update;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use reqwest::Method;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Arguments of `sandbox start`
#[derive(Debug, Clone)]
pub struct StartArgs {
    pub name: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub detach: bool,
    pub prod: bool,
    pub http_port: Option<u16>,
}

/// Start a sandbox, attached unless `--detach` was given
pub async fn sandbox_start(config: &SandctlConfig, args: StartArgs) -> Result<()> {
    let supervisor = supervisor()?;
    remind_version(supervisor.store());

    // Drop a record left behind by a sandbox that died on its own.
    supervisor.status()?;

    let mut sandbox = config.sandbox.clone();
    if let Some(port) = args.http_port {
        sandbox.http_port = port;
    }

    let mode = if args.prod { RunMode::Default } else { RunMode::Dev };
    let spec = LaunchSpec::new(&args.executable, &args.name)
        .args(args.args)
        .mode(mode)
        .detach(args.detach)
        .ports(sandbox.required_ports());

    if !args.detach {
        output::info(format!("Starting sandbox '{}' in {} mode, press Ctrl+C to stop", args.name, mode));
    }

    match supervisor.start(spec).await? {
        StartOutcome::Detached(handle) => {
            output::success(format!(
                "Sandbox '{}' started in background with PID {}",
                args.name, handle.pid
            ));
            output::info("Use 'sandctl sandbox stop' to stop it");
        }
        StartOutcome::Exited {
            code, interrupted, ..
        } => {
            if interrupted {
                output::info(format!("Sandbox '{}' stopped", args.name));
            } else if code == Some(0) {
                output::info(format!("Sandbox '{}' exited", args.name));
            } else {
                output::warn(format!(
                    "Sandbox '{}' exited with {}",
                    args.name,
                    code.map(|c| format!("code {}", c))
                        .unwrap_or_else(|| "a signal".to_string())
                ));
            }
        }
    }

    Ok(())
}

/// Stop the running sandbox and wait for it to go away
pub async fn sandbox_stop(config: &SandctlConfig) -> Result<()> {
    let supervisor = supervisor()?;
    remind_version(supervisor.store());

    if supervisor.status()? == SandboxStatus::Stopped {
        output::info("No sandbox is currently running");
        return Ok(());
    }

    let (name, pid, report) = match supervisor.stop_current()? {
        StopOutcome::NothingRunning => {
            output::info("No sandbox is currently running");
            return Ok(());
        }
        StopOutcome::Stopped { name, pid, report } => (name, pid, report),
    };

    for (failed_pid, reason) in &report.failures {
        output::warn(format!("Could not terminate PID {}: {}", failed_pid, reason));
    }
    if let Some(reason) = &report.enumeration_error {
        output::warn(format!("Could not list child processes: {}", reason));
    }

    let timeout = Duration::from_secs(config.sandbox.stop_timeout_secs);
    let pb = output::spinner(format!("Stopping sandbox '{}'...", name));
    let waited = process::wait_until_stopped(pid, timeout).await;
    pb.finish_and_clear();

    match waited {
        Ok(()) => output::success(format!("Sandbox '{}' stopped", name)),
        Err(e) => {
            warn!("{}", e);
            output::warn(format!(
                "Sandbox '{}' (PID {}) is still shutting down after {}s",
                name,
                pid,
                timeout.as_secs()
            ));
        }
    }

    Ok(())
}

/// Show whether a sandbox is running
pub async fn sandbox_status() -> Result<()> {
    let supervisor = supervisor()?;

    match supervisor.status()? {
        SandboxStatus::Running { name, pid, mode } => {
            output::success(format!("Sandbox '{}' is running in {} mode (PID {})", name, mode, pid));
        }
        SandboxStatus::Stopped => output::info("No sandbox is currently running"),
    }

    Ok(())
}

/// Submit a task-scheduling request and follow the task it creates
pub async fn task_run(
    config: &SandctlConfig,
    path: String,
    method: String,
    data: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method '{}'", method))?;

    let body = data
        .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
        .transpose()
        .context("--data must be valid JSON")?;

    let api = task_api(config)?;
    let request = api.request(method, &path, body.as_ref())?;
    let description = description.unwrap_or_else(|| format!("Running {}", path));

    let monitor = TaskMonitor::new(api, MonitorConfig::from(&config.task));
    let outcome = monitor.run_to_completion(request, &description).await?;

    report_outcome(&description, outcome)
}

/// Follow a task that is already scheduled
pub async fn task_watch(config: &SandctlConfig, task_id: String, description: Option<String>) -> Result<()> {
    let description = description.unwrap_or_else(|| format!("Task {}", task_id));
    let monitor = TaskMonitor::new(task_api(config)?, MonitorConfig::from(&config.task));
    let outcome = monitor.watch(&task_id, &description).await?;

    report_outcome(&description, outcome)
}

/// Look up the newest release and remember it for the version reminder
pub async fn latest(config: &SandctlConfig) -> Result<()> {
    let store = StateStore::new(SandctlConfig::state_path()?);
    let current = env!("CARGO_PKG_VERSION");

    let newest = match &config.update.manifest_url {
        Some(url) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.remote.request_timeout_secs))
                .build()
                .context("Failed to build HTTP client")?;

            let pb = output::spinner("Loading");
            let fetched = update::fetch_latest_version(&client, url).await;
            pb.finish_and_clear();
            fetched.context("Failed to check for the latest version")?
        }
        None => {
            output::warn("No update.manifest_url configured, recording the running version as latest");
            current.to_string()
        }
    };

    let latest = update::record_latest(&store, current, &newest, Utc::now())?;
    if latest.is_upgrade_available() {
        output::info(format!("Local version: {}", latest.current));
        output::warn(format!("Latest available version is {}, consider upgrading sandctl", latest.latest));
    } else {
        output::success(format!("You are using the latest version of sandctl: {}", latest.current));
    }

    Ok(())
}

fn report_outcome(description: &str, outcome: TaskOutcome<serde_json::Value>) -> Result<()> {
    if !outcome.is_success() {
        let reason = outcome.failure_reason().unwrap_or_default();
        bail!("{} failed: {}", description, reason);
    }

    output::success(format!("{} finished", description));
    if let Some(result) = &outcome.result {
        println!("{}", output::json(result));
    }

    Ok(())
}

fn supervisor() -> Result<Supervisor> {
    let path = SandctlConfig::state_path()?;
    debug!("Using state file {}", path.display());
    Ok(Supervisor::native(StateStore::new(path)))
}

fn task_api(config: &SandctlConfig) -> Result<HttpTaskApi> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.remote.request_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let api = HttpTaskApi::new(client, &config.remote.url);
    Ok(match (&config.remote.user, &config.remote.password) {
        (Some(user), Some(password)) => api.with_basic_auth(user, password),
        _ => api,
    })
}

/// Nudge the user when the version bookkeeping says so. Never fails a command.
fn remind_version(store: &StateStore) {
    match store.check_version(env!("CARGO_PKG_VERSION"), Utc::now()) {
        Ok(Some(notice)) => output::warn(notice.to_string()),
        Ok(None) => {}
        Err(e) => debug!("Skipping version reminder: {}", e),
    }
}
