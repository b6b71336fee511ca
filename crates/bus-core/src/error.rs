//! Stable error taxonomy shared by every layer of the bus (spec §7).
//!
//! `ErrorCode` enumerates the machine-readable codes callers branch on;
//! `ErrorDetail` is the wire type carried inside a failed [`crate::envelope::ActionResponse`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable, machine-readable error codes (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Schema validation failed; not retryable.
    InvalidPayload,
    /// Unknown `action_type` at target; not retryable.
    NoHandler,
    /// Handler deadline exceeded; retryable.
    HandlerTimeout,
    /// Handler raised; retryable flag set by the handler.
    HandlerError,
    /// Pseudo-sync wait elapsed; not retryable from the client's view.
    ClientTimeout,
    /// Transport failure talking to Redis; retryable by the caller.
    RedisClientError,
    /// Response bytes could not be parsed; retryable by the caller.
    ResponseDecodeError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::NoHandler => "NO_HANDLER",
            Self::HandlerTimeout => "HANDLER_TIMEOUT",
            Self::HandlerError => "HANDLER_ERROR",
            Self::ClientTimeout => "CLIENT_TIMEOUT",
            Self::RedisClientError => "REDIS_CLIENT_ERROR",
            Self::ResponseDecodeError => "RESPONSE_DECODE_ERROR",
        };
        f.write_str(s)
    }
}

/// Error detail carried inside a failed [`crate::envelope::ActionResponse`] (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub error_code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorDetail {
    pub fn new(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn with_details(mut self, details: HashMap<String, serde_json::Value>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPayload, message)
    }

    pub fn no_handler(action_type: &str) -> Self {
        Self::new(
            ErrorCode::NoHandler,
            format!("no handler registered for action_type '{action_type}'"),
        )
    }

    pub fn handler_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::HandlerTimeout, message).retryable()
    }

    pub fn handler_error(message: impl Into<String>, retryable: bool) -> Self {
        let detail = Self::new(ErrorCode::HandlerError, message);
        if retryable {
            detail.retryable()
        } else {
            detail
        }
    }

    pub fn client_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ClientTimeout, message)
    }

    pub fn redis_client_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RedisClientError, message).retryable()
    }

    pub fn response_decode_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResponseDecodeError, message).retryable()
    }
}

/// Errors raised while constructing or parsing an [`crate::envelope::Action`] /
/// [`crate::envelope::ActionResponse`].
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("action_type '{0}' must be 2-5 dot-separated lowercase segments")]
    InvalidActionType(String),

    #[error("unknown tier '{0}'")]
    InvalidTier(String),

    #[error("ActionResponse with success=true must not carry an error")]
    SuccessWithError,

    #[error("ActionResponse with success=false must carry an error")]
    FailureWithoutError,

    #[error("ActionResponse with success=false must not carry data")]
    FailureWithData,

    #[error("callback_queue_name and callback_action_type must both be present or both absent")]
    IncompleteCallbackSpec,

    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised while constructing a queue name (spec §4.2).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueNameError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
}
