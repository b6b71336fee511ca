//! `busctl task` — look up a task record by `task_id` (spec §3).

use crate::output;
use anyhow::Result;
use bus_core::QueueNameResolver;
use bus_worker::TaskRecord;
use clap::Subcommand;
use redis::AsyncCommands;
use uuid::Uuid;

#[derive(Debug, Subcommand)]
pub enum TaskCommands {
    /// Print the task record stored under `task_id`, if any.
    Show { task_id: Uuid },
}

pub async fn run(command: TaskCommands, redis_url: &str) -> Result<()> {
    let resolver = QueueNameResolver::default();
    match command {
        TaskCommands::Show { task_id } => show(&resolver, redis_url, task_id).await,
    }
}

async fn show(resolver: &QueueNameResolver, redis_url: &str, task_id: Uuid) -> Result<()> {
    let key = TaskRecord::redis_key(&resolver.key_prefix(), task_id);
    let client = redis::Client::open(redis_url)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let raw: Option<String> = conn.get(&key).await?;

    match raw {
        None => output::empty(&format!("no task record at {key}")),
        Some(raw) => {
            let record: TaskRecord = serde_json::from_str(&raw)?;
            output::heading(&format!("task {}", record.task_id));
            output::row("action_type", &record.action_type);
            output::row("status", format!("{:?}", record.status));
            output::row("processed", record.counters.processed);
            if let Some(total) = record.counters.total {
                output::row("total", total);
            }
            output::row("created_at", record.created_at);
            output::row("updated_at", record.updated_at);
            if let Some(error_message) = &record.error_message {
                output::row("error_message", error_message);
            }
        }
    }
    Ok(())
}
