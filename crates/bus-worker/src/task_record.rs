//! Task record (spec §3 "Task record").
//!
//! A long-running ingestion-style action reports progress against a
//! `task_id` independent of the request/response round trip that queued it
//! (grounded in the original ingestion worker's separate `task_id` field).
//! The worker upserts one of these into Redis keyed by `task_id` (via
//! [`crate::task_store::TaskStore`]); `bus-core` only carries the
//! identifier, not the record itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Forward rank for the "status may only move forward" invariant (spec
    /// §3). `Failed`/`Cancelled` are terminal and reachable from any rank,
    /// not just by advancing it.
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Completed => 2,
            TaskStatus::Failed | TaskStatus::Cancelled => 3,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

/// Progress counters for a long-running task (spec §3 "counters (e.g.
/// processed/total)").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskCounters {
    pub processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub action_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub counters: TaskCounters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Rejects a transition that would move `status` backward once it has
/// already reached a later or terminal state.
#[derive(Debug, thiserror::Error)]
#[error("cannot move task {task_id} from {from:?} to {to:?}: status only moves forward")]
pub struct InvalidTransition {
    pub task_id: Uuid,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

impl TaskRecord {
    pub fn pending(task_id: Uuid, action_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            status: TaskStatus::Pending,
            action_type: action_type.into(),
            created_at: now,
            updated_at: now,
            counters: TaskCounters::default(),
            result: None,
            error_message: None,
        }
    }

    fn transition(&mut self, to: TaskStatus) -> Result<(), InvalidTransition> {
        if self.status.is_terminal() || to.rank() < self.status.rank() {
            return Err(InvalidTransition {
                task_id: self.task_id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_in_progress(&mut self) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::InProgress)
    }

    /// Updates `counters` without otherwise changing `status`, for a
    /// handler that reports incremental progress mid-flight.
    pub fn update_progress(&mut self, processed: u64, total: Option<u64>) {
        self.counters = TaskCounters { processed, total };
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, result: serde_json::Value) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Failed)?;
        self.error_message = Some(error_message.into());
        Ok(())
    }

    pub fn mark_cancelled(&mut self) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Cancelled)
    }

    /// The Redis key this record is upserted under: `{prefix}:tasks:{task_id}`.
    pub fn redis_key(prefix: &str, task_id: Uuid) -> String {
        format!("{prefix}:tasks:{task_id}")
    }
}
