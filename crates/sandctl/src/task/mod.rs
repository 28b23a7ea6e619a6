//! Monitoring of asynchronous tasks executed by the remote service.
//!
//! A scheduling request answers with `{"taskId": ...}`. The task is then
//! polled at `GET /task/{id}` until it is FINISHED or FAILED, with a progress
//! bar kept up to date in between. A task that never leaves WAITING is given
//! up on by the client after a fixed time.

pub mod client;
pub mod monitor;
pub mod render;
pub mod tracker;
pub mod types;

pub use client::{HttpTaskApi, TaskApi};
pub use monitor::{MonitorConfig, TaskMonitor, TaskOutcome};
pub use render::{BarProgress, ProgressRender, SilentProgress};
pub use tracker::{PollStep, PollTracker};
pub use types::{TaskProgress, TaskResponse, TaskState, TaskStatus};
