use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key of a running transfer in the pending-request table
pub fn tracker_id(task_id: u64) -> String {
    format!("task-track-{}", task_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    UploadRecord,
}

/// A background job the application tracks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: u64,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub capsule_id: String,
    pub gos: usize,
    /// Set on completion to the uploaded record descriptor
    #[serde(default)]
    pub value: Option<Value>,
}

impl Task {
    pub fn upload_record(task_id: u64, capsule_id: impl Into<String>, gos: usize) -> Self {
        Self {
            task_id,
            kind: TaskKind::UploadRecord,
            capsule_id: capsule_id.into(),
            gos,
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub task: Task,
    /// Fraction done, 0 to 1
    pub progress: f64,
    pub finished: bool,
    #[serde(default)]
    pub aborted: bool,
}

impl TaskProgress {
    pub fn running(task: Task, progress: f64) -> Self {
        Self {
            task,
            progress: progress.clamp(0.0, 1.0),
            finished: false,
            aborted: false,
        }
    }

    pub fn finished(task: Task) -> Self {
        Self {
            task,
            progress: 1.0,
            finished: true,
            aborted: false,
        }
    }

    pub fn aborted(task: Task) -> Self {
        Self {
            task,
            progress: 1.0,
            finished: true,
            aborted: true,
        }
    }
}
