//! End-to-end scenarios exercising `bus-client` and `bus-worker` together
//! against the in-memory backend, one worker per scenario.

use bus_client::{BusClient, InMemoryBackend, ListBackend, SendOptions};
use bus_core::{Action, ActionResponse, ErrorDetail, QueueNameResolver, Tier};
use bus_worker::{FnHandler, HandlerRegistry, Worker, WorkerConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

async fn poll_for<T>(mut f: impl FnMut() -> Option<T>) -> T {
    for _ in 0..300 {
        if let Some(v) = f() {
            return v;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never satisfied within the test budget");
}

fn spawn_worker(worker: Arc<Worker>) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(rx).await });
    (tx, handle)
}

async fn shutdown(tx: watch::Sender<bool>, handle: tokio::task::JoinHandle<()>) {
    let _ = tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
}

/// S1: pseudo-sync echo. A client blocks on `send_pseudo_sync`; the target
/// worker's handler echoes the payload back.
#[tokio::test]
async fn s1_pseudo_sync_echo() {
    let backend = ListBackend::InMemory(InMemoryBackend::new());
    let resolver = QueueNameResolver::default();

    let registry = HandlerRegistry::builder()
        .register(
            "echo.message.send",
            FnHandler::new(|action: Action| async move { Ok(action.data.clone()) }),
        )
        .unwrap()
        .build();
    let worker = Arc::new(
        Worker::new(
            backend.clone(),
            resolver.clone(),
            registry,
            WorkerConfig {
                service_name: "echo".to_string(),
                ..Default::default()
            },
        )
        .unwrap(),
    );
    let (tx, handle) = spawn_worker(worker);

    let client = BusClient::new(backend, resolver, "caller-svc");
    let response = client
        .send_pseudo_sync(
            "echo",
            "echo.message.send",
            serde_json::json!({"text": "hello"}),
            SendOptions::default(),
            Some(Duration::from_secs(2)),
        )
        .await;

    shutdown(tx, handle).await;

    assert!(response.success);
    assert_eq!(response.data.unwrap()["text"], serde_json::json!("hello"));
}

/// S2: fire-and-callback ingestion. The worker's handler succeeds and the
/// response is wrapped into a new action delivered to the caller's callback
/// queue.
#[tokio::test]
async fn s2_ingestion_with_callback() {
    let backend = ListBackend::InMemory(InMemoryBackend::new());
    let resolver = QueueNameResolver::default();

    let registry = HandlerRegistry::builder()
        .register(
            "embedding.document.ingest",
            FnHandler::new(|_action: Action| async {
                Ok(serde_json::json!({"chunks": 4}))
            }),
        )
        .unwrap()
        .build();
    let worker = Arc::new(
        Worker::new(
            backend.clone(),
            resolver.clone(),
            registry,
            WorkerConfig {
                service_name: "embedding".to_string(),
                ..Default::default()
            },
        )
        .unwrap(),
    );
    let (tx, handle) = spawn_worker(worker);

    let client = BusClient::new(backend.clone(), resolver.clone(), "ingestion-svc");
    let callback_queue = resolver
        .callback_queue("ingestion-svc", "ingested", Some("doc-1"))
        .unwrap();
    let action_id = client
        .send_async_with_callback(
            "embedding",
            "embedding.document.ingest",
            serde_json::json!({"document_id": "doc-1"}),
            &callback_queue,
            "embedding.document.ingested",
            SendOptions::default(),
        )
        .await
        .unwrap();
    assert_ne!(action_id, Uuid::nil());

    let raw = poll_for(|| futures::executor::block_on(backend.lpop(&callback_queue))).await;
    shutdown(tx, handle).await;

    let callback_action = Action::from_json(&raw).unwrap();
    assert_eq!(callback_action.action_type, "embedding.document.ingested");
    assert_eq!(callback_action.origin_service, "embedding");
    assert_eq!(callback_action.target_service, "ingestion-svc");

    let wrapped_response: ActionResponse = serde_json::from_value(callback_action.data).unwrap();
    assert!(wrapped_response.success);
    assert_eq!(wrapped_response.data.unwrap()["chunks"], serde_json::json!(4));
}

/// S3: a single worker configured to poll all four tiers processes
/// enterprise before professional before advance before free, regardless of
/// the order actions were pushed in.
#[tokio::test]
async fn s3_tier_fan_out_ordering() {
    let backend = ListBackend::InMemory(InMemoryBackend::new());
    let resolver = QueueNameResolver::default();

    let order: Arc<Mutex<Vec<Tier>>> = Arc::new(Mutex::new(Vec::new()));
    let order_for_handler = Arc::clone(&order);
    let registry = HandlerRegistry::builder()
        .register(
            "billing.invoice.generate",
            FnHandler::new(move |action: Action| {
                let order = Arc::clone(&order_for_handler);
                async move {
                    order.lock().unwrap().push(action.tier.unwrap());
                    Ok(serde_json::json!({}))
                }
            }),
        )
        .unwrap()
        .build();

    let worker = Arc::new(
        Worker::new(
            backend.clone(),
            resolver.clone(),
            registry,
            WorkerConfig {
                service_name: "billing".to_string(),
                tiers: Some(Tier::ALL_BY_PRIORITY.to_vec()),
                max_inflight: 1,
                ..Default::default()
            },
        )
        .unwrap(),
    );

    for tier in [Tier::Free, Tier::Advance, Tier::Enterprise, Tier::Professional] {
        let action = Action::new(
            "billing.invoice.generate",
            "caller",
            "billing",
            serde_json::json!({}),
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .unwrap()
        .with_tier(tier);
        let queue = resolver
            .action_queue("billing", None, None, Some(tier))
            .unwrap();
        backend.rpush(&queue, &action.to_json().unwrap()).await.unwrap();
    }

    let (tx, handle) = spawn_worker(worker);
    poll_for(|| {
        let guard = order.lock().unwrap();
        (guard.len() == 4).then_some(())
    })
    .await;
    shutdown(tx, handle).await;

    let observed = order.lock().unwrap().clone();
    assert_eq!(
        observed,
        vec![Tier::Enterprise, Tier::Professional, Tier::Advance, Tier::Free]
    );
}

/// S4: a handler that always fails retryably exhausts retries and the
/// action lands on the dead-letter queue with a retry count attached.
#[tokio::test]
async fn s4_retry_then_dead_letter() {
    let backend = ListBackend::InMemory(InMemoryBackend::new());
    let resolver = QueueNameResolver::default();

    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_for_handler = Arc::clone(&attempts);
    let registry = HandlerRegistry::builder()
        .register(
            "payment.charge.process",
            FnHandler::new(move |_action: Action| {
                let attempts = Arc::clone(&attempts_for_handler);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(ErrorDetail::handler_error("upstream unavailable", true))
                }
            }),
        )
        .unwrap()
        .build();

    let worker = Arc::new(
        Worker::new(
            backend.clone(),
            resolver.clone(),
            registry,
            WorkerConfig {
                service_name: "payment".to_string(),
                max_retries: 2,
                backoff_base: Duration::from_millis(1),
                ..Default::default()
            },
        )
        .unwrap(),
    );

    let client = BusClient::new(backend.clone(), resolver.clone(), "caller-svc");
    client
        .send_async(
            "payment",
            "payment.charge.process",
            serde_json::json!({"amount_cents": 500}),
            SendOptions::default(),
        )
        .await
        .unwrap();

    let (tx, handle) = spawn_worker(worker);

    let queue = resolver.action_queue("payment", None, None, None).unwrap();
    let dlq = QueueNameResolver::dead_letter_queue(&queue);
    let raw = poll_for(|| futures::executor::block_on(backend.lpop(&dlq))).await;
    shutdown(tx, handle).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let dead_action = Action::from_json(&raw).unwrap();
    assert_eq!(
        dead_action
            .queue_metadata
            .get("retry_count")
            .and_then(|v| v.as_u64()),
        Some(2)
    );
}

/// S5: a malformed message on the action queue is dead-lettered verbatim
/// instead of crashing the worker or being silently dropped.
#[tokio::test]
async fn s5_parse_failure_to_dead_letter() {
    let backend = ListBackend::InMemory(InMemoryBackend::new());
    let resolver = QueueNameResolver::default();
    let registry = HandlerRegistry::builder().build();

    let worker = Arc::new(
        Worker::new(
            backend.clone(),
            resolver.clone(),
            registry,
            WorkerConfig {
                service_name: "search".to_string(),
                ..Default::default()
            },
        )
        .unwrap(),
    );

    let queue = resolver.action_queue("search", None, None, None).unwrap();
    backend.rpush(&queue, "not valid json").await.unwrap();

    let (tx, handle) = spawn_worker(worker);
    let dlq = QueueNameResolver::dead_letter_queue(&queue);
    let raw = poll_for(|| futures::executor::block_on(backend.lpop(&dlq))).await;
    shutdown(tx, handle).await;

    assert_eq!(raw, "not valid json");
}

/// S6: `trace_id` propagates unchanged when a handler forwards work to a
/// second service via its own `send_async` call.
#[tokio::test]
async fn s6_trace_propagates_through_secondary_send() {
    let backend = ListBackend::InMemory(InMemoryBackend::new());
    let resolver = QueueNameResolver::default();

    let forwarding_client = BusClient::new(backend.clone(), resolver.clone(), "orchestrator");
    let registry = HandlerRegistry::builder()
        .register(
            "orchestrator.job.start",
            FnHandler::new(move |action: Action| {
                let client = forwarding_client.clone();
                async move {
                    client
                        .send_async(
                            "worker-pool",
                            "worker_pool.job.execute",
                            serde_json::json!({"job_id": "j1"}),
                            SendOptions {
                                task_id: action.task_id,
                                trace_id: Some(action.trace_id),
                                ..Default::default()
                            },
                        )
                        .await
                        .unwrap();
                    Ok(serde_json::json!({"accepted": true}))
                }
            }),
        )
        .unwrap()
        .build();

    let worker = Arc::new(
        Worker::new(
            backend.clone(),
            resolver.clone(),
            registry,
            WorkerConfig {
                service_name: "orchestrator".to_string(),
                ..Default::default()
            },
        )
        .unwrap(),
    );
    let (tx, handle) = spawn_worker(worker);

    let caller = BusClient::new(backend.clone(), resolver.clone(), "caller-svc");
    let original_correlation = Uuid::new_v4();
    let original_action = Action::new(
        "orchestrator.job.start",
        "caller-svc",
        "orchestrator",
        serde_json::json!({}),
        original_correlation,
        Uuid::new_v4(),
    )
    .unwrap();
    let original_trace_id = original_action.trace_id;

    let queue = resolver
        .action_queue("orchestrator", None, None, None)
        .unwrap();
    caller
        .send_to_queue(&queue, &original_action)
        .await
        .unwrap();

    let forwarded_queue = resolver
        .action_queue("worker-pool", None, None, None)
        .unwrap();
    let raw = poll_for(|| futures::executor::block_on(backend.lpop(&forwarded_queue))).await;
    shutdown(tx, handle).await;

    let forwarded = Action::from_json(&raw).unwrap();
    // `send_async` mints a fresh correlation_id per hop; trace_id is
    // explicitly threaded through by the forwarding handler.
    assert_ne!(forwarded.correlation_id, original_correlation);
    assert_eq!(forwarded.trace_id, original_trace_id);
}
