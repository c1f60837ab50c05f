//! Execution tasks and the derived queue status.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ids::TaskId;
use crate::kernel::KernelStatus;
use crate::origin::Origin;

/// Lifecycle of a task inside the execution queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Queued,
    Executing,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// One submitted code-execution request.
///
/// Owned by the queue for its lifetime and discarded once finalized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTask {
    pub id: TaskId,
    pub code: String,
    pub origin: Origin,
    pub status: TaskStatus,
}

impl ExecutionTask {
    /// New queued task with a fresh id.
    pub fn new(code: impl Into<String>, origin: Origin) -> Self {
        Self {
            id: TaskId::new(),
            code: code.into(),
            origin,
            status: TaskStatus::Queued,
        }
    }
}

/// Derived queue status, published after every structural change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatusSnapshot {
    pub is_executing: bool,
    /// Queued or executing tasks, excluding cancelled ones.
    pub active_task_count: usize,
    pub kernel_status: KernelStatus,
}

impl QueueStatusSnapshot {
    /// Nothing executing and nothing waiting.
    pub fn is_idle(&self) -> bool {
        !self.is_executing && self.active_task_count == 0
    }
}
