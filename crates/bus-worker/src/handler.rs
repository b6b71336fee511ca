//! Handler contract (spec §4.5).
//!
//! The original expressed a handler as an abstract base class
//! (`BaseActionHandler`) that subclasses overrode per `action_type`. The
//! teacher's codebase consistently prefers a registry of trait objects keyed
//! by name over one-class-per-variant (see `MessageRouterKind`), so here a
//! handler is anything implementing [`ActionHandler`], registered into a
//! [`crate::registry::HandlerRegistry`] under its `action_type`.

use async_trait::async_trait;
use bus_core::{Action, ErrorDetail};
use serde::de::DeserializeOwned;

/// Implemented by anything that can process one `action_type`.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Runs the handler against `action`, returning the JSON payload of a
    /// successful [`bus_core::ActionResponse`] or a structured error.
    async fn handle(&self, action: &Action) -> Result<serde_json::Value, ErrorDetail>;
}

/// Parses `action.data` into `T`, producing an `INVALID_PAYLOAD` error on
/// mismatch (spec §4.5 `parse_action_data`).
pub fn parse_action_data<T: DeserializeOwned>(action: &Action) -> Result<T, ErrorDetail> {
    serde_json::from_value(action.data.clone())
        .map_err(|e| ErrorDetail::invalid_payload(format!("could not parse action data: {e}")))
}

/// Blanket wrapper so a plain async closure can be registered without
/// implementing [`ActionHandler`] by hand. Mirrors how the original allowed
/// handlers to be registered as simple callables in the lighter-weight
/// paths of the dispatch table.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(Action) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, ErrorDetail>> + Send,
{
    async fn handle(&self, action: &Action) -> Result<serde_json::Value, ErrorDetail> {
        (self.f)(action.clone()).await
    }
}
