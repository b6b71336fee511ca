//! Persists [`TaskRecord`]s to Redis, keyed by `task_id` (spec §3 "Task
//! record ... Stored in Redis keyed by `task_id`, created by the worker
//! before the first callback, updated monotonically").

use crate::error::WorkerError;
use crate::task_record::TaskRecord;
use bus_client::ListBackend;
use uuid::Uuid;

/// Upserts and loads [`TaskRecord`]s under `{prefix}:tasks:{task_id}`.
#[derive(Clone)]
pub struct TaskStore {
    backend: ListBackend,
    prefix: String,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore").field("prefix", &self.prefix).finish()
    }
}

impl TaskStore {
    pub fn new(backend: ListBackend, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    /// Writes `record`, applying a TTL of `retention_days` (0 = no expiry,
    /// appropriate for tiers whose artifacts are kept indefinitely).
    pub async fn upsert(&self, record: &TaskRecord, retention_days: u32) -> Result<(), WorkerError> {
        let key = TaskRecord::redis_key(&self.prefix, record.task_id);
        let raw = serde_json::to_string(record)?;
        let ttl_secs = i64::from(retention_days) * 86_400;
        self.backend.set(&key, &raw, ttl_secs).await?;
        Ok(())
    }

    pub async fn load(&self, task_id: Uuid) -> Result<Option<TaskRecord>, WorkerError> {
        let key = TaskRecord::redis_key(&self.prefix, task_id);
        match self.backend.get(&key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus_client::InMemoryBackend;

    #[tokio::test]
    async fn upsert_then_load_round_trips() {
        let store = TaskStore::new(ListBackend::InMemory(InMemoryBackend::new()), "nooble4:dev");
        let record = TaskRecord::pending(Uuid::new_v4(), "ingestion.document.process");
        store.upsert(&record, 7).await.unwrap();

        let loaded = store.load(record.task_id).await.unwrap().unwrap();
        assert_eq!(loaded.task_id, record.task_id);
        assert_eq!(loaded.action_type, record.action_type);
    }

    #[tokio::test]
    async fn load_returns_none_for_unknown_task() {
        let store = TaskStore::new(ListBackend::InMemory(InMemoryBackend::new()), "nooble4:dev");
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_overwrites_the_previous_record() {
        let store = TaskStore::new(ListBackend::InMemory(InMemoryBackend::new()), "nooble4:dev");
        let mut record = TaskRecord::pending(Uuid::new_v4(), "ingestion.document.process");
        store.upsert(&record, 7).await.unwrap();

        record.mark_in_progress().unwrap();
        store.upsert(&record, 7).await.unwrap();

        let loaded = store.load(record.task_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, crate::task_record::TaskStatus::InProgress);
    }
}
