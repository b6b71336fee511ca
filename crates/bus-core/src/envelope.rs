//! Action envelope model (spec §3, §4.1).
//!
//! Grounded on the original `DomainAction`/`DomainActionResponse` pair: an
//! action carries its own routing metadata (origin/target service, tenant,
//! tier, correlation/trace ids, optional callback target) alongside an
//! opaque JSON payload. A response is mutually exclusive between `data` and
//! `error` on the `success` flag.

use crate::error::{EnvelopeError, ErrorDetail};
use crate::tier::Tier;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// `{service}.{entity}[.{sub}].{verb}`, 2-5 dot-separated segments (spec §3,
/// §4.1).
static ACTION_TYPE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+(\.[a-z0-9_]+){1,4}$").expect("static pattern is valid"));

fn is_valid_action_type(action_type: &str) -> bool {
    ACTION_TYPE_PATTERN.is_match(action_type)
}

/// A message traveling through the bus (spec §3 "Action").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: Uuid,
    pub action_type: String,
    pub timestamp: DateTime<Utc>,

    pub origin_service: String,
    pub target_service: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    pub correlation_id: Uuid,
    pub trace_id: Uuid,

    /// Task identifier distinct from `correlation_id`, carried by long-running
    /// ingestion-style actions so a caller can poll the worker-owned task
    /// record independently of any single request/response round trip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_queue_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_action_type: Option<String>,

    /// Private reply queue for a pseudo-synchronous request (spec §4.3
    /// `send_pseudo_sync`). Distinct from the callback pair above: a reply
    /// landing here is the raw [`ActionResponse`] JSON, never a new
    /// wrapped `Action`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_queue: Option<String>,

    pub data: serde_json::Value,

    #[serde(default)]
    pub queue_metadata: HashMap<String, serde_json::Value>,

    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Action {
    /// Builds a new action, validating `action_type`, the callback pairing,
    /// and `tier` (spec §4.1).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        action_type: impl Into<String>,
        origin_service: impl Into<String>,
        target_service: impl Into<String>,
        data: serde_json::Value,
        correlation_id: Uuid,
        trace_id: Uuid,
    ) -> Result<Self, EnvelopeError> {
        let action_type = action_type.into();
        if !is_valid_action_type(&action_type) {
            return Err(EnvelopeError::InvalidActionType(action_type));
        }

        Ok(Self {
            action_id: Uuid::new_v4(),
            action_type,
            timestamp: Utc::now(),
            origin_service: origin_service.into(),
            target_service: target_service.into(),
            tenant_id: None,
            user_id: None,
            session_id: None,
            tier: None,
            correlation_id,
            trace_id,
            task_id: None,
            callback_queue_name: None,
            callback_action_type: None,
            reply_queue: None,
            data,
            queue_metadata: HashMap::new(),
            version: default_version(),
        })
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_task_id(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Attaches a callback target. Both fields travel together; there is no
    /// way to set only one through this builder.
    pub fn with_callback(
        mut self,
        callback_queue_name: impl Into<String>,
        callback_action_type: impl Into<String>,
    ) -> Self {
        self.callback_queue_name = Some(callback_queue_name.into());
        self.callback_action_type = Some(callback_action_type.into());
        self
    }

    /// Marks this action as a pseudo-synchronous request awaiting a raw
    /// [`ActionResponse`] on `reply_queue` (spec §4.3 `send_pseudo_sync`).
    pub fn with_reply_queue(mut self, reply_queue: impl Into<String>) -> Self {
        self.reply_queue = Some(reply_queue.into());
        self
    }

    /// Validates the callback-pairing invariant. Construction through
    /// [`Action::with_callback`] can't violate it, but a deserialized action
    /// (arriving from a different, possibly non-Rust, producer) can.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if !is_valid_action_type(&self.action_type) {
            return Err(EnvelopeError::InvalidActionType(self.action_type.clone()));
        }
        if self.callback_queue_name.is_some() != self.callback_action_type.is_some() {
            return Err(EnvelopeError::IncompleteCallbackSpec);
        }
        Ok(())
    }

    /// The leading dot-separated segment, e.g. `"embedding"` for
    /// `"embedding.document.ingest"` (spec GLOSSARY "domain").
    pub fn domain(&self) -> &str {
        self.action_type.split('.').next().unwrap_or(&self.action_type)
    }

    /// The trailing dot-separated segment, e.g. `"ingest"` for
    /// `"embedding.document.ingest"` (spec GLOSSARY "verb").
    pub fn verb(&self) -> &str {
        self.action_type.rsplit('.').next().unwrap_or(&self.action_type)
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, EnvelopeError> {
        let action: Self = serde_json::from_str(raw)?;
        action.validate()?;
        Ok(action)
    }
}

/// Reply to an [`Action`] (spec §3 "ActionResponse").
///
/// `success` gates `data`/`error` exclusivity: exactly one of the two is
/// present, never both, never neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub correlation_id: Uuid,
    pub trace_id: Uuid,
    pub action_type_response_to: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,

    #[serde(default = "default_version")]
    pub version: String,
}

impl ActionResponse {
    pub fn success(
        action_type_response_to: impl Into<String>,
        correlation_id: Uuid,
        trace_id: Uuid,
        data: serde_json::Value,
    ) -> Self {
        Self {
            success: true,
            correlation_id,
            trace_id,
            action_type_response_to: action_type_response_to.into(),
            timestamp: Utc::now(),
            data: Some(data),
            error: None,
            version: default_version(),
        }
    }

    pub fn failure(
        action_type_response_to: impl Into<String>,
        correlation_id: Uuid,
        trace_id: Uuid,
        error: ErrorDetail,
    ) -> Self {
        Self {
            success: false,
            correlation_id,
            trace_id,
            action_type_response_to: action_type_response_to.into(),
            timestamp: Utc::now(),
            data: None,
            error: Some(error),
            version: default_version(),
        }
    }

    /// Builds a response for an [`Action`], copying its `correlation_id`/
    /// `trace_id` and `action_type` (spec §4.1 "a response always echoes the
    /// request's correlation_id and trace_id").
    pub fn success_for(action: &Action, data: serde_json::Value) -> Self {
        Self::success(
            action.action_type.clone(),
            action.correlation_id,
            action.trace_id,
            data,
        )
    }

    pub fn failure_for(action: &Action, error: ErrorDetail) -> Self {
        Self::failure(
            action.action_type.clone(),
            action.correlation_id,
            action.trace_id,
            error,
        )
    }

    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.success {
            if self.error.is_some() {
                return Err(EnvelopeError::SuccessWithError);
            }
        } else {
            if self.error.is_none() {
                return Err(EnvelopeError::FailureWithoutError);
            }
            if self.data.is_some() {
                return Err(EnvelopeError::FailureWithData);
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, EnvelopeError> {
        let response: Self = serde_json::from_str(raw)?;
        response.validate()?;
        Ok(response)
    }
}
