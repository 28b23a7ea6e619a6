//! Submit-then-poll driver for remote tasks.

use super::client::TaskApi;
use super::render::{BarProgress, ProgressRender, SilentProgress};
use super::tracker::{PollStep, PollTracker};
use super::types::{TaskState, TaskStatus};
use crate::config::TaskConfig;
use crate::error::{Result, SandctlError};
use chrono::Utc;
use reqwest::Request;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Poll timing and display settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// How long a task may sit in WAITING before the client gives up
    pub waiting_timeout: Duration,
    pub show_progress: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            waiting_timeout: Duration::from_secs(120),
            show_progress: true,
        }
    }
}

impl From<&TaskConfig> for MonitorConfig {
    fn from(config: &TaskConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            waiting_timeout: config.waiting_timeout(),
            show_progress: config.show_progress,
        }
    }
}

/// Final state of a monitored task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome<T> {
    /// Last status seen. A client-side timeout is reported as FAILED.
    pub status: TaskStatus,
    /// Decoded result of a finished task
    pub result: Option<T>,
    pub timed_out: bool,
}

impl<T> TaskOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.status.state == TaskState::Finished
    }

    /// Failure detail sent by the server, or the timeout explanation
    pub fn failure_reason(&self) -> Option<&str> {
        (self.status.state == TaskState::Failed).then_some(self.status.progress.info.as_str())
    }
}

/// Runs remote tasks to completion
pub struct TaskMonitor<A: TaskApi + 'static> {
    api: Arc<A>,
    config: MonitorConfig,
}

impl<A: TaskApi + 'static> TaskMonitor<A> {
    pub fn new(api: A, config: MonitorConfig) -> Self {
        Self::with_shared(Arc::new(api), config)
    }

    pub fn with_shared(api: Arc<A>, config: MonitorConfig) -> Self {
        Self { api, config }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Submit `request`, follow the task it schedules until it ends and decode
    /// the result of a finished task into `T`.
    pub async fn run_to_completion<T>(&self, request: Request, description: &str) -> Result<TaskOutcome<T>>
    where
        T: DeserializeOwned,
    {
        self.run_with_renderer(request, self.renderer(description)).await
    }

    /// Same as `run_to_completion` with a caller supplied progress display
    pub async fn run_with_renderer<T>(
        &self,
        request: Request,
        renderer: Box<dyn ProgressRender>,
    ) -> Result<TaskOutcome<T>>
    where
        T: DeserializeOwned,
    {
        let task_id = self.api.submit(request).await?;
        info!("Task {} submitted", task_id);
        self.follow(task_id, renderer).await
    }

    /// Follow a task that was scheduled earlier
    pub async fn watch<T>(&self, task_id: &str, description: &str) -> Result<TaskOutcome<T>>
    where
        T: DeserializeOwned,
    {
        if task_id.is_empty() {
            return Err(SandctlError::parse("task id must not be empty"));
        }
        self.follow(task_id.to_string(), self.renderer(description)).await
    }

    fn renderer(&self, description: &str) -> Box<dyn ProgressRender> {
        if self.config.show_progress {
            Box::new(BarProgress::new(description))
        } else {
            Box::new(SilentProgress)
        }
    }

    async fn follow<T>(&self, task_id: String, renderer: Box<dyn ProgressRender>) -> Result<TaskOutcome<T>>
    where
        T: DeserializeOwned,
    {
        let (tx, rx) = oneshot::channel();
        let api = Arc::clone(&self.api);
        let config = self.config.clone();

        tokio::spawn(async move {
            let result = poll_until_terminal(api.as_ref(), &task_id, &config, renderer).await;
            let _ = tx.send(result);
        });

        let (status, timed_out) = rx
            .await
            .map_err(|_| SandctlError::internal("Task poll loop stopped without a result"))??;

        let result = if status.state == TaskState::Finished && !status.progress.info.is_empty() {
            Some(serde_json::from_str(&status.progress.info).map_err(SandctlError::ResultDecode)?)
        } else {
            None
        };

        info!("Task {} ended as {}", status.id, status.state);
        Ok(TaskOutcome {
            status,
            result,
            timed_out,
        })
    }
}

/// Poll once per interval until the task ends. Returns the last status and
/// whether the client gave up waiting.
async fn poll_until_terminal<A>(
    api: &A,
    task_id: &str,
    config: &MonitorConfig,
    mut renderer: Box<dyn ProgressRender>,
) -> Result<(TaskStatus, bool)>
where
    A: TaskApi + ?Sized,
{
    let mut tracker = PollTracker::new(config.waiting_timeout);

    loop {
        tokio::time::sleep(config.poll_interval).await;

        let status = match api.status(task_id).await {
            Ok(status) => status,
            Err(e) => {
                renderer.finish(PollStep::Failed);
                return Err(e);
            }
        };

        let step = tracker.observe(&status, Utc::now());
        debug!("Task {} is {} ({:?})", task_id, status.state, step);

        match step {
            PollStep::Continue => {}
            PollStep::Progress(percent) => renderer.set_percent(percent),
            PollStep::Finished | PollStep::Failed => {
                renderer.finish(step);
                return Ok((status, false));
            }
            PollStep::TimedOut { waited } => {
                renderer.finish(step);
                warn!(
                    "Task {} still waiting after {}s (limit {}s), giving up",
                    task_id,
                    waited.as_secs(),
                    config.waiting_timeout.as_secs()
                );
                return Ok((timed_out(status, waited), true));
            }
        }
    }
}

fn timed_out(mut status: TaskStatus, waited: Duration) -> TaskStatus {
    status.state = TaskState::Failed;
    status.progress.info = format!(
        "Timeout waiting for the task to start: still WAITING after {}s (client-side timeout)",
        waited.as_secs()
    );
    status
}
