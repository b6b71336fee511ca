//! Worker-side errors (spec §7).

use bus_core::{EnvelopeError, QueueNameError};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("action_type '{0}' is already registered")]
    DuplicateHandler(String),

    #[error("invalid action: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("invalid queue name: {0}")]
    QueueName(#[from] QueueNameError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("failed to (de)serialize task record: {0}")]
    TaskRecordCodec(#[from] serde_json::Error),
}
