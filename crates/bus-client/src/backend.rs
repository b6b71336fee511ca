//! List-backend abstraction behind [`crate::client::BusClient`].
//!
//! Mirrors the teacher's `MessagingProvider` enum-dispatch: a fixed, closed
//! set of backends dispatched through a `match` rather than `Arc<dyn Trait>`,
//! so there's no vtable indirection on the hot send/receive path and a fake
//! backend is available for tests without a live Redis server
//! (`MessagingProvider::new_in_memory()` in the teacher's code).

use redis::aio::ConnectionManager;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// Dispatches list operations to a real Redis connection or an in-process
/// fake, depending on how the client was constructed.
#[derive(Clone)]
pub enum ListBackend {
    Redis(ConnectionManager),
    InMemory(InMemoryBackend),
}

impl std::fmt::Debug for ListBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListBackend::Redis(_) => f.write_str("ListBackend::Redis"),
            ListBackend::InMemory(_) => f.write_str("ListBackend::InMemory"),
        }
    }
}

impl ListBackend {
    pub async fn rpush(&self, queue: &str, payload: &str) -> redis::RedisResult<()> {
        match self {
            ListBackend::Redis(conn) => {
                let mut conn = conn.clone();
                redis::cmd("RPUSH")
                    .arg(queue)
                    .arg(payload)
                    .query_async::<()>(&mut conn)
                    .await
            }
            ListBackend::InMemory(fake) => {
                fake.rpush(queue, payload).await;
                Ok(())
            }
        }
    }

    pub async fn lpop(&self, queue: &str) -> redis::RedisResult<Option<String>> {
        match self {
            ListBackend::Redis(conn) => {
                let mut conn = conn.clone();
                redis::cmd("LPOP").arg(queue).query_async(&mut conn).await
            }
            ListBackend::InMemory(fake) => Ok(fake.lpop(queue).await),
        }
    }

    /// Blocking pop with a timeout; `timeout == Duration::ZERO` blocks
    /// indefinitely, matching Redis `BLPOP` semantics.
    pub async fn blpop(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> redis::RedisResult<Option<String>> {
        match self {
            ListBackend::Redis(conn) => {
                let mut conn = conn.clone();
                let secs = timeout.as_secs_f64().max(0.0);
                let result: Option<(String, String)> = redis::cmd("BLPOP")
                    .arg(queue)
                    .arg(secs)
                    .query_async(&mut conn)
                    .await?;
                Ok(result.map(|(_, value)| value))
            }
            ListBackend::InMemory(fake) => Ok(fake.blpop(queue, timeout).await),
        }
    }

    /// Atomically moves the head (oldest element) of `source` onto the tail
    /// of `dest`, blocking up to `timeout` if `source` is empty, and
    /// returning the moved value (spec §9 reliable-delivery upgrade).
    ///
    /// Producers `RPUSH` onto the tail (spec §5 "strict FIFO per Redis
    /// list"), so the consumer must take from the *head* to preserve FIFO —
    /// `RPOPLPUSH`/`BRPOPLPUSH` take from the tail and would deliver
    /// newest-first. `BLMOVE source dest LEFT RIGHT` is the command that
    /// actually does head-in, tail-out.
    pub async fn blmove(
        &self,
        source: &str,
        dest: &str,
        timeout: Duration,
    ) -> redis::RedisResult<Option<String>> {
        match self {
            ListBackend::Redis(conn) => {
                let mut conn = conn.clone();
                let secs = timeout.as_secs_f64().max(0.0);
                redis::cmd("BLMOVE")
                    .arg(source)
                    .arg(dest)
                    .arg("LEFT")
                    .arg("RIGHT")
                    .arg(secs)
                    .query_async(&mut conn)
                    .await
            }
            ListBackend::InMemory(fake) => Ok(fake.blmove(source, dest, timeout).await),
        }
    }

    /// Non-blocking head-to-tail move: returns `None` immediately if
    /// `source` is empty, rather than waiting. Used for the tier-priority
    /// scan across several queues, where blocking on each in turn would
    /// starve lower tiers behind a slow higher one. See [`Self::blmove`] for
    /// why this must be `LMOVE ... LEFT RIGHT`, not `RPOPLPUSH`.
    pub async fn lmove(&self, source: &str, dest: &str) -> redis::RedisResult<Option<String>> {
        match self {
            ListBackend::Redis(conn) => {
                let mut conn = conn.clone();
                redis::cmd("LMOVE")
                    .arg(source)
                    .arg(dest)
                    .arg("LEFT")
                    .arg("RIGHT")
                    .query_async(&mut conn)
                    .await
            }
            ListBackend::InMemory(fake) => Ok(fake.lmove_immediate(source, dest).await),
        }
    }

    /// Removes up to `count` occurrences of `value` from `queue` (worker ack).
    pub async fn lrem(&self, queue: &str, count: i64, value: &str) -> redis::RedisResult<()> {
        match self {
            ListBackend::Redis(conn) => {
                let mut conn = conn.clone();
                redis::cmd("LREM")
                    .arg(queue)
                    .arg(count)
                    .arg(value)
                    .query_async::<()>(&mut conn)
                    .await
            }
            ListBackend::InMemory(fake) => {
                fake.lrem(queue, count, value).await;
                Ok(())
            }
        }
    }

    pub async fn expire(&self, queue: &str, seconds: i64) -> redis::RedisResult<()> {
        match self {
            ListBackend::Redis(conn) => {
                let mut conn = conn.clone();
                redis::cmd("EXPIRE")
                    .arg(queue)
                    .arg(seconds)
                    .query_async::<()>(&mut conn)
                    .await
            }
            ListBackend::InMemory(_) => Ok(()),
        }
    }

    /// Stores `value` under `key`, applying a TTL in seconds (0 = no
    /// expiry). Used by [`crate::client`]'s callers and by `bus-worker`'s
    /// task-record upserts (spec §3 "Stored in Redis keyed by `task_id`").
    /// Beyond spec §6's literal list-command surface, on the same footing
    /// as the other reliable-delivery primitives this client already adds.
    pub async fn set(&self, key: &str, value: &str, ttl_secs: i64) -> redis::RedisResult<()> {
        match self {
            ListBackend::Redis(conn) => {
                let mut conn = conn.clone();
                if ttl_secs > 0 {
                    redis::cmd("SET")
                        .arg(key)
                        .arg(value)
                        .arg("EX")
                        .arg(ttl_secs)
                        .query_async::<()>(&mut conn)
                        .await
                } else {
                    redis::cmd("SET").arg(key).arg(value).query_async::<()>(&mut conn).await
                }
            }
            ListBackend::InMemory(fake) => {
                fake.set(key, value).await;
                Ok(())
            }
        }
    }

    pub async fn get(&self, key: &str) -> redis::RedisResult<Option<String>> {
        match self {
            ListBackend::Redis(conn) => {
                let mut conn = conn.clone();
                redis::cmd("GET").arg(key).query_async(&mut conn).await
            }
            ListBackend::InMemory(fake) => Ok(fake.get(key).await),
        }
    }
}

/// In-process stand-in for Redis lists, used by tests and by `bus-worker`'s
/// own test suite. Not a general Redis emulator: only the handful of
/// commands the bus actually issues are implemented.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    kv: Arc<Mutex<HashMap<String, String>>>,
    notify: Arc<Notify>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    async fn rpush(&self, queue: &str, payload: &str) {
        let mut guard = self.inner.lock().await;
        guard
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_string());
        drop(guard);
        self.notify.notify_waiters();
    }

    async fn lpop(&self, queue: &str) -> Option<String> {
        let mut guard = self.inner.lock().await;
        guard.get_mut(queue).and_then(VecDeque::pop_front)
    }

    async fn blpop(&self, queue: &str, timeout: Duration) -> Option<String> {
        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(tokio::time::Instant::now() + timeout)
        };
        loop {
            if let Some(value) = self.lpop(queue).await {
                return Some(value);
            }
            let wait = self.notify.notified();
            match deadline {
                None => wait.await,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    if tokio::time::timeout(remaining, wait).await.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Emulates `LMOVE source dest LEFT RIGHT`: pop the head of `source`,
    /// push it onto the tail of `dest`.
    async fn lmove_immediate(&self, source: &str, dest: &str) -> Option<String> {
        let value = self.lpop(source).await?;
        let mut guard = self.inner.lock().await;
        guard
            .entry(dest.to_string())
            .or_default()
            .push_back(value.clone());
        Some(value)
    }

    /// Emulates `BLMOVE source dest LEFT RIGHT timeout`.
    async fn blmove(&self, source: &str, dest: &str, timeout: Duration) -> Option<String> {
        let value = self.blpop(source, timeout).await?;
        let mut guard = self.inner.lock().await;
        guard
            .entry(dest.to_string())
            .or_default()
            .push_back(value.clone());
        Some(value)
    }

    async fn lrem(&self, queue: &str, count: i64, value: &str) {
        let mut guard = self.inner.lock().await;
        let Some(list) = guard.get_mut(queue) else {
            return;
        };
        let mut removed = 0i64;
        let limit = if count == 0 { i64::MAX } else { count.abs() };
        list.retain(|item| {
            if removed < limit && item == value {
                removed += 1;
                false
            } else {
                true
            }
        });
    }

    async fn set(&self, key: &str, value: &str) {
        self.kv.lock().await.insert(key.to_string(), value.to_string());
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.kv.lock().await.get(key).cloned()
    }

    /// Test helper: current length of `queue`.
    pub async fn len(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .await
            .get(queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Producers `RPUSH` onto a queue's tail (spec §5 "strict FIFO per
    /// Redis list"). The consumer must come back out in the same order it
    /// went in — `lmove`/`blmove` must take the *head*, not the tail.
    #[tokio::test]
    async fn lmove_preserves_fifo_order_across_multiple_pushes() {
        let backend = ListBackend::InMemory(InMemoryBackend::new());
        backend.rpush("q", "first").await.unwrap();
        backend.rpush("q", "second").await.unwrap();
        backend.rpush("q", "third").await.unwrap();

        assert_eq!(backend.lmove("q", "processing").await.unwrap().as_deref(), Some("first"));
        assert_eq!(backend.lmove("q", "processing").await.unwrap().as_deref(), Some("second"));
        assert_eq!(backend.lmove("q", "processing").await.unwrap().as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn blmove_preserves_fifo_order() {
        let backend = ListBackend::InMemory(InMemoryBackend::new());
        backend.rpush("q", "first").await.unwrap();
        backend.rpush("q", "second").await.unwrap();

        let first = backend
            .blmove("q", "processing", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("first"));
        let second = backend
            .blmove("q", "processing", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(second.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn lmove_moves_onto_the_tail_of_dest_not_the_head() {
        let backend = ListBackend::InMemory(InMemoryBackend::new());
        backend.rpush("dest", "already-there").await.unwrap();
        backend.rpush("q", "incoming").await.unwrap();

        backend.lmove("q", "dest").await.unwrap();

        let in_memory = match &backend {
            ListBackend::InMemory(fake) => fake,
            _ => unreachable!(),
        };
        assert_eq!(in_memory.lpop("dest").await.as_deref(), Some("already-there"));
        assert_eq!(in_memory.lpop("dest").await.as_deref(), Some("incoming"));
    }
}
