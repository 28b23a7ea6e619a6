//! Sandbox process supervisor.
//!
//! Keeps at most one sandbox running per machine. The running sandbox is
//! tracked in the persisted state so that a later, unrelated invocation of
//! the CLI can find and stop it.

use crate::error::{Result, SandctlError};
use crate::process::{self, NativeProcessTree, ProcessTree, TerminationReport};
use crate::state::{PersistedState, RunMode, StateStore};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Windows `CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW`
#[cfg(windows)]
const DETACHED_CREATION_FLAGS: u32 = 0x0000_0200 | 0x0800_0000;

/// Everything needed to launch a sandbox
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Resolved path of the sandbox executable
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Sandbox name recorded in the persisted state
    pub name: String,
    pub mode: RunMode,
    /// Run in the background and return immediately
    pub detach: bool,
    /// Ports that must be free before launching
    pub ports: Vec<u16>,
}

impl LaunchSpec {
    pub fn new(executable: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            name: name.into(),
            mode: RunMode::default(),
            detach: false,
            ports: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn detach(mut self, detach: bool) -> Self {
        self.detach = detach;
        self
    }

    pub fn ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }
}

/// A launched sandbox process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub detached: bool,
}

/// Result of `Supervisor::start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Running in the background
    Detached(ProcessHandle),
    /// Attached run ended. `interrupted` is set when the user interrupted the
    /// CLI before the process exited on its own.
    Exited {
        handle: ProcessHandle,
        code: Option<i32>,
        interrupted: bool,
    },
}

impl StartOutcome {
    pub fn handle(&self) -> &ProcessHandle {
        match self {
            StartOutcome::Detached(handle) => handle,
            StartOutcome::Exited { handle, .. } => handle,
        }
    }
}

/// Result of `Supervisor::stop`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    NothingRunning,
    Stopped {
        name: String,
        pid: u32,
        report: TerminationReport,
    },
}

/// What `Supervisor::status` found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxStatus {
    Stopped,
    Running { name: String, pid: u32, mode: RunMode },
}

/// Starts and stops the single sandbox process
pub struct Supervisor<T: ProcessTree = NativeProcessTree> {
    store: StateStore,
    tree: T,
}

impl Supervisor<NativeProcessTree> {
    /// Supervisor using the process tree of the current platform
    pub fn native(store: StateStore) -> Self {
        Self::new(store, NativeProcessTree::new())
    }
}

impl<T: ProcessTree> Supervisor<T> {
    pub fn new(store: StateStore, tree: T) -> Self {
        Self { store, tree }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Start a sandbox. An attached run ends when the process exits or when
    /// Ctrl+C is pressed.
    pub async fn start(&self, spec: LaunchSpec) -> Result<StartOutcome> {
        self.start_with_interrupt(spec, ctrl_c()).await
    }

    /// Start a sandbox, treating completion of `interrupt` as the user
    /// interrupting an attached run.
    ///
    /// On interrupt the record is cleared but the process is not killed; it
    /// receives the same interrupt and is waited for.
    pub async fn start_with_interrupt<F>(&self, spec: LaunchSpec, interrupt: F) -> Result<StartOutcome>
    where
        F: Future<Output = ()>,
    {
        if spec.name.is_empty() {
            return Err(SandctlError::config("Sandbox name must not be empty"));
        }

        let state = self.store.read()?;
        if !state.running_name.is_empty() {
            return Err(SandctlError::already_running(state.running_name));
        }

        let busy = busy_ports(&spec.ports);
        if !busy.is_empty() {
            return Err(SandctlError::PortInUse { ports: busy });
        }

        info!(
            "Starting sandbox '{}' ({} mode) from {}",
            spec.name,
            spec.mode,
            spec.executable.display()
        );

        let mut child = build_command(&spec)
            .spawn()
            .map_err(|e| SandctlError::launch(spec.executable.display().to_string(), e))?;

        let pid = child
            .id()
            .ok_or_else(|| SandctlError::internal("Sandbox exited before its PID could be read"))?;

        let handle = ProcessHandle {
            pid,
            started_at: Utc::now(),
            detached: spec.detach,
        };

        if let Err(e) = self.store.record_running(&spec.name, pid, spec.mode) {
            warn!("Could not record sandbox PID {}, terminating it: {}", pid, e);
            if let Err(kill_err) = self.tree.terminate(pid) {
                warn!("Failed to terminate PID {}: {}", pid, kill_err);
            }
            return Err(e);
        }

        if spec.detach {
            info!("Sandbox '{}' running in background with PID {}", spec.name, pid);
            return Ok(StartOutcome::Detached(handle));
        }

        tokio::pin!(interrupt);
        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = &mut interrupt => None,
        };

        let (status, interrupted) = match exited {
            Some(status) => (status?, false),
            None => {
                info!("Interrupted, waiting for sandbox '{}' to exit", spec.name);
                self.store.clear_running()?;
                (child.wait().await?, true)
            }
        };

        if !interrupted && self.store.read()?.running_pid == pid {
            self.store.clear_running()?;
        }

        info!("Sandbox '{}' exited with {}", spec.name, status);
        Ok(StartOutcome::Exited {
            handle,
            code: status.code(),
            interrupted,
        })
    }

    /// Terminate the sandbox recorded in `state` together with every process
    /// it spawned, then clear the record.
    ///
    /// The record is cleared even when some terminations fail.
    pub fn stop(&self, state: &PersistedState) -> Result<StopOutcome> {
        if state.running_name.is_empty() || state.running_pid == 0 {
            debug!("No sandbox recorded as running");
            return Ok(StopOutcome::NothingRunning);
        }

        info!("Stopping sandbox '{}' (PID {})", state.running_name, state.running_pid);
        let report = self.tree.terminate_tree(state.running_pid);
        self.store.clear_running()?;

        Ok(StopOutcome::Stopped {
            name: state.running_name.clone(),
            pid: state.running_pid,
            report,
        })
    }

    /// Stop whatever the persisted state currently records
    pub fn stop_current(&self) -> Result<StopOutcome> {
        let state = self.store.read()?;
        self.stop(&state)
    }

    /// Current sandbox status, clearing records of processes that died
    pub fn status(&self) -> Result<SandboxStatus> {
        let state = self.store.reconcile(process::is_alive)?;

        Ok(if state.is_active() {
            SandboxStatus::Running {
                name: state.running_name,
                pid: state.running_pid,
                mode: state.mode,
            }
        } else {
            SandboxStatus::Stopped
        })
    }
}

fn build_command(spec: &LaunchSpec) -> Command {
    let mut cmd = Command::new(&spec.executable);
    cmd.args(&spec.args);

    if spec.detach {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // New process group so the sandbox outlives the CLI.
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        cmd.creation_flags(DETACHED_CREATION_FLAGS);
    } else {
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
    }

    cmd
}

/// Ports from `ports` that cannot be bound right now
fn busy_ports(ports: &[u16]) -> Vec<u16> {
    ports
        .iter()
        .copied()
        .filter(|port| {
            let taken = TcpListener::bind(("0.0.0.0", *port)).is_err();
            if taken {
                debug!("Port {} is in use", port);
            }
            taken
        })
        .collect()
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
