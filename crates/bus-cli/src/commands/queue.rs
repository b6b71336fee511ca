//! `busctl queue` — basic queue depth inspection.

use crate::output;
use anyhow::Result;
use bus_core::QueueNameResolver;
use clap::Subcommand;
use redis::AsyncCommands;

#[derive(Debug, Subcommand)]
pub enum QueueCommands {
    /// Print the current length of a service's action queue.
    Length {
        service: String,
        #[arg(long)]
        tenant_id: Option<String>,
        #[arg(long)]
        context: Option<String>,
    },
}

pub async fn run(command: QueueCommands, redis_url: &str) -> Result<()> {
    let resolver = QueueNameResolver::default();
    match command {
        QueueCommands::Length {
            service,
            tenant_id,
            context,
        } => {
            let queue = resolver.action_queue(
                &service,
                tenant_id.as_deref(),
                context.as_deref(),
                None,
            )?;
            let client = redis::Client::open(redis_url)?;
            let mut conn = client.get_multiplexed_async_connection().await?;
            let len: i64 = conn.llen(&queue).await?;
            output::heading(&format!("queue {queue}"));
            output::row("length", len);
        }
    }
    Ok(())
}
