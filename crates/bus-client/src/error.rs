//! Client-facing errors (spec §7).

use bus_core::{EnvelopeError, QueueNameError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid action: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("invalid queue name: {0}")]
    QueueName(#[from] QueueNameError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("timed out waiting {waited_ms}ms for a reply on {queue}")]
    Timeout { queue: String, waited_ms: u64 },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Maps this error onto the wire taxonomy's synthetic client-side
    /// responses (spec §7 "the client synthesizes an `ActionResponse` for
    /// transport-layer failures it detects before a reply ever arrives").
    pub fn to_error_detail(&self) -> bus_core::ErrorDetail {
        use bus_core::ErrorDetail;
        match self {
            ClientError::Envelope(e) => ErrorDetail::invalid_payload(e.to_string()),
            ClientError::QueueName(e) => ErrorDetail::invalid_payload(e.to_string()),
            ClientError::Redis(e) => ErrorDetail::redis_client_error(e.to_string()),
            ClientError::Timeout { queue, waited_ms } => ErrorDetail::client_timeout(format!(
                "no reply on {queue} after {waited_ms}ms"
            )),
            ClientError::Decode(e) => ErrorDetail::response_decode_error(e.to_string()),
        }
    }
}
