//! Postgres-backed durable queue
//!
//! Messages live in a table until acknowledged. A consumer claims the oldest
//! visible row with `FOR UPDATE SKIP LOCKED` and stamps `claimed_at`; a claim
//! older than the visibility timeout is considered abandoned and the row
//! becomes deliverable again.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{encode, Delivery, EventQueue};
use crate::common::errors::{DetectorError, Result};
use crate::common::types::QueuedEvent;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(300);

pub struct PgEventQueue {
    pool: PgPool,
    name: String,
    poll_interval: Duration,
    visibility_timeout: Duration,
    closed: AtomicBool,
}

impl PgEventQueue {
    /// Wrap a pool and make sure the queue table exists
    pub async fn new(pool: PgPool, name: impl Into<String>) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queued_events (
                id BIGSERIAL PRIMARY KEY,
                queue TEXT NOT NULL,
                payload BYTEA NOT NULL,
                published_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                claimed_at TIMESTAMPTZ,
                deliveries INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(unavailable)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS queued_events_queue_id ON queued_events (queue, id)",
        )
        .execute(&pool)
        .await
        .map_err(unavailable)?;

        let name = name.into();
        info!(queue = %name, "durable queue ready");

        Ok(Self {
            pool,
            name,
            poll_interval: DEFAULT_POLL_INTERVAL,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            closed: AtomicBool::new(false),
        })
    }

    /// How long to wait before polling an empty queue again
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Claims older than this are redelivered
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DetectorError::QueueUnavailable(format!(
                "queue '{}' is closed",
                self.name
            )));
        }
        Ok(())
    }

    /// Claim one row if any is visible
    async fn try_claim(&self) -> Result<Option<Delivery>> {
        let row = sqlx::query(
            r#"
            UPDATE queued_events
               SET claimed_at = now(), deliveries = deliveries + 1
             WHERE id = (
                   SELECT id FROM queued_events
                    WHERE queue = $1
                      AND (claimed_at IS NULL
                           OR claimed_at < now() - make_interval(secs => $2))
                    ORDER BY id
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED)
            RETURNING id, payload, deliveries
            "#,
        )
        .bind(&self.name)
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(row.map(|row| {
            let id: i64 = row.get("id");
            let deliveries: i32 = row.get("deliveries");
            Delivery {
                tag: id as u64,
                payload: row.get("payload"),
                redelivered: deliveries > 1,
            }
        }))
    }
}

#[async_trait]
impl EventQueue for PgEventQueue {
    #[instrument(skip(self, event), fields(queue = %self.name, pair = %event.symbol))]
    async fn publish(&self, event: &QueuedEvent) -> Result<()> {
        self.ensure_open()?;
        let payload = encode(event)?;
        sqlx::query("INSERT INTO queued_events (queue, payload) VALUES ($1, $2)")
            .bind(&self.name)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        debug!("published event");
        Ok(())
    }

    async fn next_delivery(&self) -> Result<Delivery> {
        loop {
            self.ensure_open()?;
            if let Some(delivery) = self.try_claim().await? {
                return Ok(delivery);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn ack(&self, tag: u64) -> Result<()> {
        self.ensure_open()?;
        let result = sqlx::query("DELETE FROM queued_events WHERE id = $1")
            .bind(tag as i64)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        if result.rows_affected() == 0 {
            warn!(queue = %self.name, tag, "ack for unknown delivery tag");
        }
        Ok(())
    }

    async fn nack(&self, tag: u64) -> Result<()> {
        self.ensure_open()?;
        sqlx::query("UPDATE queued_events SET claimed_at = NULL WHERE id = $1")
            .bind(tag as i64)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.pool.close().await;
            warn!(queue = %self.name, "queue connection closed");
        }
        Ok(())
    }
}

/// Any database failure on the queue path is a queue-unavailable condition
fn unavailable(err: sqlx::Error) -> DetectorError {
    DetectorError::QueueUnavailable(err.to_string())
}
