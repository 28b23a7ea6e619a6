//! Wire types of the remote task API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state reported by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Waiting,
    Running,
    Finished,
    Failed,
}

impl TaskState {
    /// Finished and failed tasks are never polled again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Waiting => write!(f, "WAITING"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Finished => write!(f, "FINISHED"),
            TaskState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Progress counters. On a finished task `info` holds the JSON result, on a
/// failed one a human readable reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskProgress {
    pub current: u32,
    pub total: u32,
    pub info: String,
}

impl TaskProgress {
    /// Whole percent done, `None` while the total is unknown
    pub fn percent(&self) -> Option<u8> {
        if self.total == 0 {
            return None;
        }

        let percent = u64::from(self.current) * 100 / u64::from(self.total);
        Some(percent.min(100) as u8)
    }
}

/// Snapshot returned by `GET /task/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub name: String,
    pub state: TaskState,
    #[serde(default)]
    pub application: String,
    #[serde(default)]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: TaskProgress,
}

impl TaskStatus {
    /// Minimal status, mostly useful for tests and synthesized results
    pub fn new(id: impl Into<String>, state: TaskState) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            name: String::new(),
            state,
            application: String::new(),
            user: String::new(),
            start_time: None,
            progress: TaskProgress::default(),
        }
    }
}

/// Response to a request that schedules a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    #[serde(default)]
    pub task_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_server_status() {
        let json = r#"{
            "id": "t1",
            "description": "Export",
            "name": "com.example:export",
            "state": "RUNNING",
            "application": "com.example",
            "user": "user:system:su",
            "startTime": "2024-03-01T10:15:30.123Z",
            "progress": {"current": 5, "total": 20, "info": "exporting"}
        }"#;

        let status: TaskStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.state, TaskState::Running);
        assert_eq!(status.progress.percent(), Some(25));
        assert!(status.start_time.is_some());
        assert!(!status.state.is_terminal());
    }

    #[test]
    fn test_deserialize_sparse_status() {
        let status: TaskStatus = serde_json::from_str(r#"{"id":"t2","state":"FAILED"}"#).unwrap();
        assert_eq!(status.progress, TaskProgress::default());
        assert!(status.state.is_terminal());
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        assert!(serde_json::from_str::<TaskStatus>(r#"{"id":"t3","state":"PAUSED"}"#).is_err());
    }

    #[test]
    fn test_percent() {
        let progress = |current, total| TaskProgress {
            current,
            total,
            info: String::new(),
        };
        assert_eq!(progress(0, 0).percent(), None);
        assert_eq!(progress(1, 3).percent(), Some(33));
        assert_eq!(progress(100, 100).percent(), Some(100));
        assert_eq!(progress(7, 5).percent(), Some(100));
        assert_eq!(progress(u32::MAX, u32::MAX).percent(), Some(100));
    }

    #[test]
    fn test_task_response() {
        let response: TaskResponse = serde_json::from_str(r#"{"taskId":"abc"}"#).unwrap();
        assert_eq!(response.task_id.as_deref(), Some("abc"));

        let response: TaskResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.task_id, None);
    }
}
