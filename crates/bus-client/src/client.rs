//! Bus client: the three send modes described in spec §4.3.
//!
//! Grounded on the original `BaseRedisClient` (`send_action_async`,
//! `send_action_async_with_callback`, `send_action_pseudo_sync`) and shaped
//! after the teacher's `MessageClient`, which wraps a single provider handle
//! and exposes domain-specific send/receive methods over it rather than a
//! generic "execute command" surface.

use crate::backend::{InMemoryBackend, ListBackend};
use crate::error::ClientError;
use bus_core::{Action, ActionResponse, QueueNameResolver, Tier};
use std::time::Duration;
use tracing::{instrument, warn};
use uuid::Uuid;

const DEFAULT_PSEUDO_SYNC_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REPLY_QUEUE_TTL_SECS: i64 = 60;

/// Routing and payload for a single send (common to all three modes).
#[derive(Debug, Clone, Default)]
pub struct SendOptions<'a> {
    pub tenant_id: Option<&'a str>,
    pub context: Option<&'a str>,
    pub tier: Option<Tier>,
    pub session_id: Option<&'a str>,
    pub task_id: Option<Uuid>,
    /// Carries an existing `trace_id` across a hop, e.g. when a handler
    /// forwards work to another service (spec §8 "trace_id propagates
    /// across a chain of actions"). Each send still mints its own
    /// `correlation_id`; only `trace_id` is inherited.
    pub trace_id: Option<Uuid>,
}

/// Client-side handle for originating actions on the bus.
#[derive(Clone)]
pub struct BusClient {
    backend: ListBackend,
    resolver: QueueNameResolver,
    origin_service: String,
}

impl std::fmt::Debug for BusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusClient")
            .field("origin_service", &self.origin_service)
            .finish_non_exhaustive()
    }
}

impl BusClient {
    pub fn new(
        backend: ListBackend,
        resolver: QueueNameResolver,
        origin_service: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            resolver,
            origin_service: origin_service.into(),
        }
    }

    /// Connects to a real Redis server and builds a client around it.
    pub async fn connect(
        redis_url: &str,
        resolver: QueueNameResolver,
        origin_service: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(ListBackend::Redis(conn), resolver, origin_service))
    }

    /// Builds a client over the in-process fake backend, for tests.
    pub fn new_in_memory(resolver: QueueNameResolver, origin_service: impl Into<String>) -> Self {
        Self::new(
            ListBackend::InMemory(InMemoryBackend::new()),
            resolver,
            origin_service,
        )
    }

    fn build_action(
        &self,
        target_service: &str,
        action_type: &str,
        data: serde_json::Value,
        opts: &SendOptions<'_>,
    ) -> Result<Action, ClientError> {
        let correlation_id = Uuid::new_v4();
        let trace_id = opts.trace_id.unwrap_or_else(Uuid::new_v4);
        let mut action = Action::new(
            action_type,
            self.origin_service.clone(),
            target_service,
            data,
            correlation_id,
            trace_id,
        )?;
        if let Some(tenant_id) = opts.tenant_id {
            action = action.with_tenant(tenant_id);
        }
        if let Some(tier) = opts.tier {
            action = action.with_tier(tier);
        }
        if let Some(session_id) = opts.session_id {
            action = action.with_session(session_id);
        }
        if let Some(task_id) = opts.task_id {
            action = action.with_task_id(task_id);
        }
        Ok(action)
    }

    /// Fire-and-forget: pushes the action and returns immediately (spec
    /// §4.3 "send_async").
    #[instrument(skip(self, data), fields(target_service, action_type))]
    pub async fn send_async(
        &self,
        target_service: &str,
        action_type: &str,
        data: serde_json::Value,
        opts: SendOptions<'_>,
    ) -> Result<Uuid, ClientError> {
        let action = self.build_action(target_service, action_type, data, &opts)?;
        let queue = self
            .resolver
            .action_queue(target_service, opts.tenant_id, opts.context, opts.tier)?;
        self.backend.rpush(&queue, &action.to_json()?).await?;
        Ok(action.action_id)
    }

    /// Fire-and-callback: like `send_async`, but asks the target to wrap its
    /// response as a new action delivered to `callback_queue_name` (spec
    /// §4.3 "send_async_with_callback").
    #[instrument(skip(self, data), fields(target_service, action_type, callback_queue_name, callback_action_type))]
    #[allow(clippy::too_many_arguments)]
    pub async fn send_async_with_callback(
        &self,
        target_service: &str,
        action_type: &str,
        data: serde_json::Value,
        callback_queue_name: &str,
        callback_action_type: &str,
        opts: SendOptions<'_>,
    ) -> Result<Uuid, ClientError> {
        let action = self
            .build_action(target_service, action_type, data, &opts)?
            .with_callback(callback_queue_name, callback_action_type);
        let queue = self
            .resolver
            .action_queue(target_service, opts.tenant_id, opts.context, opts.tier)?;
        self.backend.rpush(&queue, &action.to_json()?).await?;
        Ok(action.action_id)
    }

    /// Pseudo-synchronous request/reply: pushes the action onto a private
    /// reply queue's worth of metadata, then blocks on that queue until a
    /// reply arrives or `timeout` elapses (spec §4.3 "send_pseudo_sync").
    ///
    /// Transport-layer failures are not propagated as `Err` — they're
    /// synthesized into a failed [`ActionResponse`], matching the original's
    /// behavior of always handing the caller a response object.
    #[instrument(skip(self, data), fields(target_service, action_type))]
    pub async fn send_pseudo_sync(
        &self,
        target_service: &str,
        action_type: &str,
        data: serde_json::Value,
        opts: SendOptions<'_>,
        timeout: Option<Duration>,
    ) -> ActionResponse {
        let timeout = timeout.unwrap_or(DEFAULT_PSEUDO_SYNC_TIMEOUT);
        match self
            .try_send_pseudo_sync(target_service, action_type, data, opts, timeout)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "send_pseudo_sync failed before a reply arrived");
                let correlation_id = Uuid::new_v4();
                let trace_id = Uuid::new_v4();
                ActionResponse::failure(action_type, correlation_id, trace_id, err.to_error_detail())
            }
        }
    }

    async fn try_send_pseudo_sync(
        &self,
        target_service: &str,
        action_type: &str,
        data: serde_json::Value,
        opts: SendOptions<'_>,
        timeout: Duration,
    ) -> Result<ActionResponse, ClientError> {
        let action = self.build_action(target_service, action_type, data, &opts)?;
        let short_action = QueueNameResolver::short_action_type(action_type);
        let reply_queue = self.resolver.reply_queue(
            &self.origin_service,
            &short_action,
            action.correlation_id,
        )?;
        let action = action.with_reply_queue(reply_queue.clone());

        let queue = self
            .resolver
            .action_queue(target_service, opts.tenant_id, opts.context, opts.tier)?;
        self.backend.rpush(&queue, &action.to_json()?).await?;

        let raw = self.backend.blpop(&reply_queue, timeout).await?;
        let _ = self
            .backend
            .expire(&reply_queue, DEFAULT_REPLY_QUEUE_TTL_SECS)
            .await;

        match raw {
            Some(raw) => Ok(ActionResponse::from_json(&raw)?),
            None => Err(ClientError::Timeout {
                queue: reply_queue,
                waited_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Builds and enqueues a callback action from `source`'s
    /// `callback_queue_name`/`callback_action_type`, preserving its
    /// `correlation_id`, `trace_id`, `tenant_id`, `user_id`, and
    /// `session_id` (spec §4.5 `send_callback`). Returns
    /// [`ClientError::Envelope`] if `source` has no callback target set.
    #[instrument(skip(self, source, callback_data), fields(action_type = %source.action_type))]
    pub async fn send_callback(
        &self,
        source: &Action,
        callback_data: serde_json::Value,
    ) -> Result<Uuid, ClientError> {
        let (callback_queue, callback_action_type) = match (
            &source.callback_queue_name,
            &source.callback_action_type,
        ) {
            (Some(queue), Some(action_type)) => (queue.clone(), action_type.clone()),
            _ => {
                return Err(ClientError::Envelope(bus_core::EnvelopeError::IncompleteCallbackSpec));
            }
        };

        let mut callback_action = Action::new(
            callback_action_type,
            self.origin_service.clone(),
            source.origin_service.clone(),
            callback_data,
            source.correlation_id,
            source.trace_id,
        )?;
        callback_action.tenant_id = source.tenant_id.clone();
        callback_action.user_id = source.user_id.clone();
        callback_action.session_id = source.session_id.clone();

        self.backend
            .rpush(&callback_queue, &callback_action.to_json()?)
            .await?;
        Ok(callback_action.action_id)
    }

    /// Escape hatch for pushing a pre-built action directly onto an
    /// arbitrary queue, bypassing name resolution. Grounded in the
    /// original handler's callback path, which falls back to a raw queue
    /// push because the client has no dedicated "send to this exact queue"
    /// method of its own (spec §4.3 supplement).
    pub async fn send_to_queue(&self, queue_name: &str, action: &Action) -> Result<(), ClientError> {
        self.backend.rpush(queue_name, &action.to_json()?).await?;
        Ok(())
    }

    /// Pops one raw message off `queue_name` without attempting to parse it.
    /// Used by operator tooling that needs to inspect or relocate messages
    /// it doesn't otherwise have a typed reason to decode.
    pub async fn peek_raw(&self, queue_name: &str) -> Result<Option<String>, ClientError> {
        Ok(self.backend.lpop(queue_name).await?)
    }

    /// Pushes a raw, already-serialized message onto `queue_name`.
    pub async fn push_raw(&self, queue_name: &str, raw: &str) -> Result<(), ClientError> {
        self.backend.rpush(queue_name, raw).await?;
        Ok(())
    }
}
