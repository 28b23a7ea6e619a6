//! sandctl - local sandbox supervisor and remote task monitor.
//!
//! Two pieces make up the core of the CLI:
//!
//! - [`supervisor`] starts and stops a single long-running sandbox process
//!   and keeps track of it across CLI invocations through the persisted
//!   [`state`]. Stopping tears down the whole process tree, see [`process`].
//! - [`task`] submits requests that schedule work on the remote service and
//!   polls the resulting task to completion with live progress.
//!
//! # Example
//!
//! ```no_run
//! use sandctl::state::StateStore;
//! use sandctl::supervisor::{LaunchSpec, Supervisor};
//!
//! # async fn example() -> sandctl::Result<()> {
//! let supervisor = Supervisor::native(StateStore::new("/tmp/sandctl/runtime.toml"));
//! let spec = LaunchSpec::new("/opt/sandbox/bin/server", "box1")
//!     .detach(true)
//!     .ports(vec![8080, 4848, 2609]);
//!
//! let outcome = supervisor.start(spec).await?;
//! println!("started with PID {}", outcome.handle().pid);
//!
//! supervisor.stop_current()?;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod process;
pub mod state;
pub mod supervisor;
pub mod task;
pub mod update;

pub use config::SandctlConfig;
pub use error::{Result, SandctlError};
pub use process::{NativeProcessTree, ProcessTree, TerminationReport};
pub use state::{PersistedState, RunMode, StateStore};
pub use supervisor::{LaunchSpec, ProcessHandle, SandboxStatus, StartOutcome, StopOutcome, Supervisor};
pub use task::{HttpTaskApi, MonitorConfig, TaskApi, TaskMonitor, TaskOutcome, TaskState, TaskStatus};
