use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Every successful run replaces the whole metrics table and the one serving file, so all runs
// share a single key regardless of reference date.
const GOLD_PUBLISH_LOCK_KEY: i64 = 0x5345_4352_414E; // "SECRAN"

/// Session-level advisory lock held on its own pooled connection, so unlock runs on the session
/// that took it. Hold it from load through artifact publish.
#[derive(Debug)]
pub struct GoldPublishLock {
    conn: PoolConnection<Postgres>,
}

impl GoldPublishLock {
    /// `None` when another run holds the lock.
    pub async fn try_acquire(pool: &sqlx::PgPool) -> anyhow::Result<Option<Self>> {
        let mut conn = pool
            .acquire()
            .await
            .context("failed to acquire connection for gold publish lock")?;

        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(GOLD_PUBLISH_LOCK_KEY)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| {
                format!("failed to acquire advisory lock (key={GOLD_PUBLISH_LOCK_KEY})")
            })?;

        Ok(acquired.then_some(Self { conn }))
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let (released,): (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(GOLD_PUBLISH_LOCK_KEY)
            .fetch_one(&mut *self.conn)
            .await
            .with_context(|| {
                format!("failed to release advisory lock (key={GOLD_PUBLISH_LOCK_KEY})")
            })?;
        anyhow::ensure!(
            released,
            "advisory lock (key={GOLD_PUBLISH_LOCK_KEY}) was not held by this session"
        );
        Ok(())
    }
}
