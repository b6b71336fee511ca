//! Worker runtime: tier-ordered polling, reliable delivery, dispatch,
//! retry/backoff, and dead-lettering (spec §4.4, §5).
//!
//! The original worker base class drove a single `BLPOP`/process loop with
//! at-most-once delivery across a crash. Spec §8 property 6 requires
//! survival of a crash between pop and handler completion, which plain
//! `BLPOP` cannot give; this implementation instead moves messages with
//! `LMOVE`/`BLMOVE LEFT RIGHT` into a private per-worker processing list and
//! only removes the entry once the handler has produced a terminal outcome
//! (spec §9, the recommended reliable-delivery upgrade). Producers `RPUSH`
//! onto the tail, so the consumer must take the *head* (`LEFT`) to preserve
//! spec §5's strict FIFO ordering — `RPOPLPUSH`/`BRPOPLPUSH` take the tail
//! and would deliver newest-first.

use crate::error::WorkerError;
use crate::handler::ActionHandler;
use crate::registry::HandlerRegistry;
use crate::task_store::TaskStore;
use bus_client::ListBackend;
use bus_core::{Action, ActionResponse, ErrorDetail, QueueNameResolver, Tier, TierPolicy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{error, instrument, warn};
use uuid::Uuid;

const RETRY_COUNT_KEY: &str = "retry_count";

/// Static configuration for one [`Worker`] instance (spec §4.4, §4.6).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub service_name: String,
    pub tenant_id: Option<String>,
    pub context: Option<String>,
    /// Tiers this worker polls, highest priority first. `None` polls a
    /// single, tier-less queue.
    pub tiers: Option<Vec<Tier>>,
    pub max_retries: u32,
    pub dlq_enabled: bool,
    pub max_inflight: usize,
    pub handler_timeout: Duration,
    /// How long an idle worker blocks on its lowest-priority queue before
    /// re-scanning from the top, instead of busy-spinning.
    pub idle_poll_timeout: Duration,
    pub processing_list_ttl_secs: i64,
    pub backoff_base: Duration,
    /// Per-tier quotas and retention consulted for per-tenant fairness and
    /// for task-record TTLs (spec §4.6). Injected explicitly, never read
    /// from a global table.
    pub policy: TierPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            tenant_id: None,
            context: None,
            tiers: None,
            max_retries: 3,
            dlq_enabled: true,
            max_inflight: 16,
            handler_timeout: Duration::from_secs(30),
            idle_poll_timeout: Duration::from_secs(1),
            processing_list_ttl_secs: 300,
            backoff_base: Duration::from_millis(100),
            policy: TierPolicy::default(),
        }
    }
}

/// Polls this worker's queues, dispatches to registered handlers, and
/// delivers responses/callbacks.
pub struct Worker {
    backend: ListBackend,
    resolver: QueueNameResolver,
    registry: HandlerRegistry,
    config: WorkerConfig,
    worker_id: Uuid,
    queues: Vec<String>,
    task_store: TaskStore,
    /// Current in-flight count per tenant, bounding concurrency per
    /// [`TierPolicy::max_inflight_per_tenant`] (spec §5 "bounded per-tenant
    /// in-flight provides fairness").
    tenant_inflight: Mutex<HashMap<String, u32>>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("service_name", &self.config.service_name)
            .field("worker_id", &self.worker_id)
            .field("queues", &self.queues)
            .finish()
    }
}

impl Worker {
    pub fn new(
        backend: ListBackend,
        resolver: QueueNameResolver,
        registry: HandlerRegistry,
        config: WorkerConfig,
    ) -> Result<Self, WorkerError> {
        let worker_id = Uuid::new_v4();
        let queues = match &config.tiers {
            Some(tiers) => tiers
                .iter()
                .map(|tier| {
                    resolver.action_queue(
                        &config.service_name,
                        config.tenant_id.as_deref(),
                        config.context.as_deref(),
                        Some(*tier),
                    )
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![resolver.action_queue(
                &config.service_name,
                config.tenant_id.as_deref(),
                config.context.as_deref(),
                None,
            )?],
        };

        let task_store = TaskStore::new(backend.clone(), resolver.key_prefix());

        Ok(Self {
            backend,
            resolver,
            registry,
            config,
            worker_id,
            queues,
            task_store,
            tenant_inflight: Mutex::new(HashMap::new()),
        })
    }

    fn processing_list(&self) -> String {
        format!("{}:processing:{}", self.config.service_name, self.worker_id)
    }

    /// Reserves one in-flight slot for `tenant_id` at `tier`, returning
    /// `false` if that tenant is already at its §4.6 quota. A missing
    /// `tenant_id` is never throttled — tenant fairness only applies once a
    /// tenant is known.
    async fn admit_tenant(&self, tenant_id: Option<&str>, tier: Tier) -> bool {
        let Some(tenant_id) = tenant_id else {
            return true;
        };
        let limit = self.config.policy.max_inflight_per_tenant(tier);
        let mut guard = self.tenant_inflight.lock().await;
        let count = guard.entry(tenant_id.to_string()).or_insert(0);
        if *count >= limit {
            false
        } else {
            *count += 1;
            true
        }
    }

    async fn release_tenant(&self, tenant_id: Option<&str>) {
        let Some(tenant_id) = tenant_id else {
            return;
        };
        let mut guard = self.tenant_inflight.lock().await;
        if let Some(count) = guard.get_mut(tenant_id) {
            *count = count.saturating_sub(1);
        }
    }

    /// Runs until `shutdown` reports `true`. Intended to be awaited inside a
    /// dedicated Tokio task; bounds concurrent handler dispatch to
    /// `config.max_inflight` in-flight actions.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_inflight));
        let processing_list = self.processing_list();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let popped = self.poll_once(&processing_list).await;
            let (queue, raw) = match popped {
                Ok(Some(popped)) => popped,
                Ok(None) => continue,
                Err(err) => {
                    error!(error = %err, "poll failed, backing off");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }
            };

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let worker = Arc::clone(&self);
            let processing_list = processing_list.clone();
            tokio::spawn(async move {
                worker.process_one(queue, raw, processing_list).await;
                drop(permit);
            });
        }
    }

    /// Non-blocking scan across tier-ordered queues; if all are empty,
    /// blocks briefly on the lowest-priority one rather than spinning.
    async fn poll_once(
        &self,
        processing_list: &str,
    ) -> Result<Option<(String, String)>, WorkerError> {
        for queue in &self.queues {
            if let Some(raw) = self.backend.lmove(queue, processing_list).await? {
                return Ok(Some((queue.clone(), raw)));
            }
        }

        let Some(lowest) = self.queues.last() else {
            return Ok(None);
        };
        let raw = self
            .backend
            .blmove(lowest, processing_list, self.config.idle_poll_timeout)
            .await?;
        Ok(raw.map(|raw| (lowest.clone(), raw)))
    }

    #[instrument(skip(self, raw, processing_list), fields(queue = %queue))]
    async fn process_one(&self, queue: String, raw: String, processing_list: String) {
        let action = match Action::from_json(&raw) {
            Ok(action) => action,
            Err(err) => {
                warn!(error = %err, "dropping unparseable message");
                if self.config.dlq_enabled {
                    let dlq = QueueNameResolver::dead_letter_queue(&queue);
                    if let Err(err) = self.backend.rpush(&dlq, &raw).await {
                        error!(error = %err, "failed to dead-letter unparseable message");
                    }
                }
                self.ack(&processing_list, &raw).await;
                return;
            }
        };

        let tier = action.tier.unwrap_or(Tier::Free);
        if !self.admit_tenant(action.tenant_id.as_deref(), tier).await {
            // Tenant is already at its §4.6 in-flight quota: return the
            // action to the tail of its source queue and let a later poll
            // pick it up once capacity frees up, instead of starving other
            // tenants behind it.
            if let Ok(requeued) = action.to_json() {
                if let Err(err) = self.backend.rpush(&queue, &requeued).await {
                    error!(error = %err, "failed to defer action for tenant fairness");
                }
            }
            self.ack(&processing_list, &raw).await;
            return;
        }

        if let Some(task_id) = action.task_id {
            self.create_task_record_if_absent(task_id, &action.action_type, tier).await;
        }

        let outcome = self.dispatch(&action).await;
        self.release_tenant(action.tenant_id.as_deref()).await;

        match outcome {
            Outcome::Terminal(response) => {
                if let Some(task_id) = action.task_id {
                    if response.success {
                        let data = response.data.clone().unwrap_or(serde_json::Value::Null);
                        self.update_task_record(task_id, &action.action_type, tier, |record| {
                            record.mark_completed(data)
                        })
                        .await;
                    } else {
                        let message = response
                            .error
                            .as_ref()
                            .map(|e| e.message.clone())
                            .unwrap_or_default();
                        self.update_task_record(task_id, &action.action_type, tier, |record| {
                            record.mark_failed(message)
                        })
                        .await;
                    }
                }
                self.deliver(&action, response).await;
                self.ack(&processing_list, &raw).await;
            }
            Outcome::Retry(error) => {
                self.ack(&processing_list, &raw).await;
                let task_id = action.task_id;
                let action_type = action.action_type.clone();
                let error_message = error.message.clone();
                let dead_lettered = self.retry_or_dead_letter(&queue, action, error).await;
                if let Some(task_id) = task_id {
                    if dead_lettered {
                        // §7 "task-based flows observe errors through the task
                        // record's status=failed and error_message": a task
                        // whose action exhausted its retries must not be left
                        // `in_progress` forever just because its last dispatch
                        // attempt alone would have been retryable.
                        self.update_task_record(task_id, &action_type, tier, |record| {
                            record.mark_failed(format!("retries exhausted: {error_message}"))
                        })
                        .await;
                    } else {
                        self.update_task_record(task_id, &action_type, tier, |record| {
                            record.mark_in_progress()
                        })
                        .await;
                    }
                }
            }
        }
    }

    /// Creates a `pending` task record only if none exists yet. Never
    /// overwrites an existing record — a retried dispatch must not clobber a
    /// record that has already advanced past `pending` (spec §3 "status only
    /// moves forward").
    async fn create_task_record_if_absent(&self, task_id: Uuid, action_type: &str, tier: Tier) {
        if matches!(self.task_store.load(task_id).await, Ok(None)) {
            let record = crate::task_record::TaskRecord::pending(task_id, action_type);
            let _ = self
                .task_store
                .upsert(&record, self.config.policy.retention_days(tier))
                .await;
        }
    }

    /// Loads the task record for `task_id` (falling back to a fresh `pending`
    /// one if it's somehow missing), applies `mutate`, and persists the
    /// result only if `mutate` produced a valid forward transition.
    async fn update_task_record(
        &self,
        task_id: Uuid,
        action_type: &str,
        tier: Tier,
        mutate: impl FnOnce(&mut crate::task_record::TaskRecord) -> Result<(), crate::task_record::InvalidTransition>,
    ) {
        let mut record = match self.task_store.load(task_id).await {
            Ok(Some(record)) => record,
            _ => crate::task_record::TaskRecord::pending(task_id, action_type),
        };
        if mutate(&mut record).is_ok() {
            let retention = self.config.policy.retention_days(tier);
            let _ = self.task_store.upsert(&record, retention).await;
        }
    }

    async fn dispatch(&self, action: &Action) -> Outcome {
        let Some(handler) = self.registry.get(&action.action_type).cloned() else {
            return Outcome::Terminal(ActionResponse::failure_for(
                action,
                ErrorDetail::no_handler(&action.action_type),
            ));
        };

        let action_for_task = action.clone();
        let join = tokio::spawn(async move { run_handler(handler, action_for_task).await });

        match tokio::time::timeout(self.config.handler_timeout, join).await {
            Err(_elapsed) => Outcome::Retry(ErrorDetail::handler_timeout(format!(
                "handler exceeded {:?}",
                self.config.handler_timeout
            ))),
            Ok(Err(join_error)) => Outcome::Retry(ErrorDetail::handler_error(
                format!("handler panicked: {join_error}"),
                true,
            )),
            Ok(Ok(Ok(data))) => Outcome::Terminal(ActionResponse::success_for(action, data)),
            Ok(Ok(Err(error))) => {
                if error.retryable {
                    Outcome::Retry(error)
                } else {
                    Outcome::Terminal(ActionResponse::failure_for(action, error))
                }
            }
        }
    }

    /// Requeues `action` for another attempt, or gives up on it once
    /// `max_retries` is exhausted. Returns `true` if the action was given up
    /// on (whether or not it actually landed on a dead-letter queue — with
    /// `dlq_enabled: false` it is simply dropped), `false` if it was
    /// requeued for another attempt.
    async fn retry_or_dead_letter(&self, queue: &str, mut action: Action, error: ErrorDetail) -> bool {
        let attempt = action
            .queue_metadata
            .get(RETRY_COUNT_KEY)
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        if attempt >= self.config.max_retries as u64 {
            warn!(
                action_type = %action.action_type,
                attempt,
                "retries exhausted"
            );
            if self.config.dlq_enabled {
                let dlq = QueueNameResolver::dead_letter_queue(queue);
                action
                    .queue_metadata
                    .insert("last_error".to_string(), serde_json::json!(error.message));
                if let Ok(raw) = action.to_json() {
                    if let Err(err) = self.backend.rpush(&dlq, &raw).await {
                        error!(error = %err, "failed to push to dead-letter queue");
                    }
                }
            }
            return true;
        }

        action
            .queue_metadata
            .insert(RETRY_COUNT_KEY.to_string(), serde_json::json!(attempt + 1));

        let backoff = self.config.backoff_base * 2u32.pow(attempt.min(10) as u32);
        tokio::time::sleep(backoff).await;

        match action.to_json() {
            Ok(raw) => {
                if let Err(err) = self.backend.rpush(queue, &raw).await {
                    error!(error = %err, "failed to requeue action for retry");
                }
            }
            Err(err) => error!(error = %err, "failed to serialize action for retry"),
        }
        false
    }

    async fn deliver(&self, action: &Action, response: ActionResponse) {
        if let Some(reply_queue) = &action.reply_queue {
            match response.to_json() {
                Ok(raw) => {
                    if let Err(err) = self.backend.rpush(reply_queue, &raw).await {
                        error!(error = %err, "failed to deliver pseudo-sync reply");
                    } else {
                        let _ = self
                            .backend
                            .expire(reply_queue, self.config.processing_list_ttl_secs)
                            .await;
                    }
                }
                Err(err) => error!(error = %err, "failed to serialize pseudo-sync reply"),
            }
            return;
        }

        if let (Some(callback_queue), Some(callback_action_type)) =
            (&action.callback_queue_name, &action.callback_action_type)
        {
            // Preserve tenant/user/session alongside correlation_id/trace_id
            // (spec §4.5 `send_callback`, §8 property 3).
            let mut callback_action = match Action::new(
                callback_action_type.clone(),
                action.target_service.clone(),
                action.origin_service.clone(),
                serde_json::to_value(&response).unwrap_or(serde_json::Value::Null),
                action.correlation_id,
                action.trace_id,
            ) {
                Ok(a) => a,
                Err(err) => {
                    error!(error = %err, "failed to build callback action");
                    return;
                }
            };
            callback_action.tenant_id = action.tenant_id.clone();
            callback_action.user_id = action.user_id.clone();
            callback_action.session_id = action.session_id.clone();
            match callback_action.to_json() {
                Ok(raw) => {
                    if let Err(err) = self.backend.rpush(callback_queue, &raw).await {
                        error!(error = %err, "failed to deliver callback");
                    }
                }
                Err(err) => error!(error = %err, "failed to serialize callback action"),
            }
        }
    }

    async fn ack(&self, processing_list: &str, raw: &str) {
        if let Err(err) = self.backend.lrem(processing_list, 1, raw).await {
            error!(error = %err, "failed to acknowledge processed message");
        }
    }
}

async fn run_handler(
    handler: Arc<dyn ActionHandler>,
    action: Action,
) -> Result<serde_json::Value, ErrorDetail> {
    handler.handle(&action).await
}

enum Outcome {
    Terminal(ActionResponse),
    Retry(ErrorDetail),
}
