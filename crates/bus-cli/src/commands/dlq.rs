//! `busctl dlq` — inspect and requeue dead-lettered actions.

use crate::output;
use anyhow::Result;
use bus_client::BusClient;
use bus_core::{Action, QueueNameResolver};
use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum DlqCommands {
    /// List actions currently sitting on a queue's dead-letter list.
    List {
        /// Action queue whose `:dead_letter` sibling should be listed.
        queue: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Pop one dead-lettered action and requeue it onto its original queue,
    /// clearing its retry count.
    Requeue {
        queue: String,
    },
}

pub async fn run(command: DlqCommands, redis_url: &str) -> Result<()> {
    let resolver = QueueNameResolver::default();
    let client = BusClient::connect(redis_url, resolver, "busctl").await?;

    match command {
        DlqCommands::List { queue, limit } => list(&client, &queue, limit).await,
        DlqCommands::Requeue { queue } => requeue(&client, &queue).await,
    }
}

async fn list(client: &BusClient, queue: &str, limit: usize) -> Result<()> {
    let dlq = QueueNameResolver::dead_letter_queue(queue);
    output::heading(&format!("dead letters on {dlq}"));

    let mut popped = Vec::new();
    for _ in 0..limit {
        match client.peek_raw(&dlq).await? {
            Some(raw) => popped.push(raw),
            None => break,
        }
    }

    if popped.is_empty() {
        output::empty("no dead-lettered actions");
    }

    for raw in &popped {
        match Action::from_json(raw) {
            Ok(action) => {
                output::row("action_id", action.action_id);
                output::row("action_type", &action.action_type);
                output::row("correlation_id", action.correlation_id);
                let retries = action
                    .queue_metadata
                    .get("retry_count")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                output::row("retry_count", retries);
                println!();
            }
            Err(err) => {
                output::row("unparseable", err);
                println!();
            }
        }
    }

    // put everything back so `list` is read-only from the operator's view
    for raw in popped.into_iter().rev() {
        client.push_raw(&dlq, &raw).await?;
    }

    Ok(())
}

async fn requeue(client: &BusClient, queue: &str) -> Result<()> {
    let dlq = QueueNameResolver::dead_letter_queue(queue);
    match client.peek_raw(&dlq).await? {
        Some(raw) => {
            let mut action = Action::from_json(&raw)?;
            action.queue_metadata.remove("retry_count");
            client.push_raw(queue, &action.to_json()?).await?;
            output::row("requeued", action.action_id);
        }
        None => output::empty("dead-letter queue is empty"),
    }
    Ok(())
}
