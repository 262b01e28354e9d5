//! Session Store: durable, per-session last-writer-wins persistence of the
//! whole session document.
//!
//! Backends are interchangeable behind `SessionStore`. `ResilientStore` wraps
//! any backend with per-attempt timeouts and bounded exponential backoff so a
//! slow or unreachable backend never blocks a caller indefinitely.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::session::{Session, SessionRow};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: Uuid) -> Result<Option<Session>>;
    async fn save(&self, session: &Session) -> Result<()>;
}

/// PostgreSQL backend. One row per session, the session itself kept as JSONB.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, session_id: Uuid) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT session_id, phase, status, document, updated_at FROM coaching_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        debug!(
            "Loaded session {} ({} / {}, updated {})",
            row.session_id, row.phase, row.status, row.updated_at
        );
        let session = serde_json::from_value(row.document)
            .with_context(|| format!("Corrupt session document for {session_id}"))?;
        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let document = serde_json::to_value(session)?;
        sqlx::query(
            r#"
            INSERT INTO coaching_sessions (session_id, phase, status, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_id) DO UPDATE
            SET phase = EXCLUDED.phase,
                status = EXCLUDED.status,
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(session.session_id)
        .bind(session.phase.as_str())
        .bind(session.status.as_str())
        .bind(document)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Redis backend. Each session is a JSON string under `coach:session:<id>`.
/// One multiplexed connection is opened up front and cloned per call.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
}

impl RedisSessionStore {
    pub async fn connect(client: &redis::Client) -> Result<Self> {
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { conn })
    }

    fn key(session_id: Uuid) -> String {
        format!("coach:session:{session_id}")
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, session_id: Uuid) -> Result<Option<Session>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(session_id)).await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .with_context(|| format!("Corrupt session document for {session_id}"))
        })
        .transpose()
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(Self::key(session.session_id), json).await?;
        Ok(())
    }
}

/// Process-local backend for tests and `SESSION_STORE=memory`.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_id, session.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistencePolicy {
    /// Upper bound on a single load or save attempt.
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later one.
    pub base_backoff: Duration,
}

impl Default for PersistencePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
        }
    }
}

impl PersistencePolicy {
    /// Runs `op` until it succeeds or `max_attempts` are spent, returning the
    /// last failure.
    pub async fn run<T, F, Fut>(&self, what: &str, session_id: Uuid, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.base_backoff * (1u32 << (attempt - 1).min(16));
                warn!(
                    "Session {what} for {session_id} failed (attempt {attempt}/{attempts}), retrying after {}ms...",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => last_error = Some(e),
                Err(_) => {
                    last_error = Some(anyhow!(
                        "session {what} timed out after {}ms",
                        self.timeout.as_millis()
                    ))
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("session {what} failed"))
            .context(format!("Session {what} for {session_id} gave up after {attempts} attempts")))
    }
}

/// A backend plus the policy applied to every call.
#[derive(Clone)]
pub struct ResilientStore {
    inner: Arc<dyn SessionStore>,
    policy: PersistencePolicy,
}

impl ResilientStore {
    pub fn new(inner: Arc<dyn SessionStore>, policy: PersistencePolicy) -> Self {
        Self { inner, policy }
    }

    pub async fn load(&self, session_id: Uuid) -> Result<Option<Session>> {
        self.policy
            .run("load", session_id, || self.inner.load(session_id))
            .await
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        self.policy
            .run("save", session.session_id, || self.inner.save(session))
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::coaching::roles::JobRole;

    /// Fails the first `failures` calls, then delegates to memory.
    pub(crate) struct FlakyStore {
        pub failures: u32,
        pub calls: AtomicU32,
        pub inner: InMemorySessionStore,
    }

    impl FlakyStore {
        pub fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                inner: InMemorySessionStore::new(),
            }
        }

        fn trip(&self) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(anyhow!("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn load(&self, session_id: Uuid) -> Result<Option<Session>> {
            self.trip()?;
            self.inner.load(session_id).await
        }

        async fn save(&self, session: &Session) -> Result<()> {
            self.trip()?;
            self.inner.save(session).await
        }
    }

    struct HangingStore;

    #[async_trait]
    impl SessionStore for HangingStore {
        async fn load(&self, _session_id: Uuid) -> Result<Option<Session>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }

        async fn save(&self, _session: &Session) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_in_memory_round_trip_is_last_writer_wins() {
        let store = InMemorySessionStore::new();
        let mut session = Session::new(JobRole::Designer);
        assert!(store.load(session.session_id).await.unwrap().is_none());

        store.save(&session).await.unwrap();
        session.elaborations_asked = 4;
        store.save(&session).await.unwrap();

        let loaded = store.load(session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.elaborations_asked, 4);
        assert_eq!(loaded.role, JobRole::Designer);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let flaky = Arc::new(FlakyStore::new(2));
        let store = ResilientStore::new(flaky.clone(), PersistencePolicy::default());
        let session = Session::new(JobRole::Generic);

        store.save(&session).await.unwrap();
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let flaky = Arc::new(FlakyStore::new(u32::MAX));
        let store = ResilientStore::new(flaky.clone(), PersistencePolicy::default());

        let err = store.load(Uuid::new_v4()).await.unwrap_err();
        assert!(format!("{err:#}").contains("connection refused"));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_is_bounded_by_timeout() {
        let policy = PersistencePolicy {
            timeout: Duration::from_millis(50),
            max_attempts: 2,
            base_backoff: Duration::from_millis(10),
        };
        let store = ResilientStore::new(Arc::new(HangingStore), policy);
        let started = tokio::time::Instant::now();

        let err = store.save(&Session::new(JobRole::Generic)).await.unwrap_err();
        assert!(format!("{err:#}").contains("timed out"));
        // two 50ms attempts plus one 10ms backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(110));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_redis_store_connects_up_front() {
        // Nothing listens on port 1, so the connection attempt fails at construction.
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let err = RedisSessionStore::connect(&client).await.err().unwrap();
        assert!(format!("{err:#}").contains("Failed to connect to Redis"));
    }
}
