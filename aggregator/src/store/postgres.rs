use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::event::{Stats, StoredEvent, ValidatedEvent};
use crate::store::{EventFilter, EventStore, InsertOutcome, StatsDelta, StoreError};

const ACQUIRE_TIMEOUT_SECONDS: u64 = 30;

/// Event store backed by a PostgreSQL table with a uniqueness constraint on
/// `(topic, event_id)`. The constraint plus `ON CONFLICT DO NOTHING` make
/// the insert the serialization point for duplicate detection; no
/// application-level locking is involved.
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECONDS))
            .connect(url)
            .await
            .map_err(|error| StoreError::PoolCreationError { error })?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|error| StoreError::MigrationError { error })
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error.as_database_error().map(|db| db.kind()),
        Some(sqlx::error::ErrorKind::UniqueViolation)
    )
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn insert_if_absent(&self, event: &ValidatedEvent) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
INSERT INTO processed_events
    (topic, event_id, timestamp, source, payload, processed_at)
VALUES
    ($1, $2, $3, $4, $5, NOW())
ON CONFLICT ON CONSTRAINT uq_topic_event_id DO NOTHING
            "#,
        )
        .bind(&event.topic)
        .bind(&event.event_id)
        .bind(event.timestamp)
        .bind(&event.source)
        .bind(&event.payload)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Ok(InsertOutcome::AlreadyExists),
            Ok(_) => Ok(InsertOutcome::Inserted),
            // The conflict clause swallows duplicates, so a uniqueness error
            // should not reach us. If one does anyway it still means the row
            // exists; reporting it as a fault would break the dedup contract.
            Err(error) if is_unique_violation(&error) => Ok(InsertOutcome::AlreadyExists),
            Err(error) => Err(StoreError::QueryError {
                command: "INSERT".to_owned(),
                error,
            }),
        }
    }

    async fn increment_stats(&self, delta: StatsDelta) -> Result<(), StoreError> {
        sqlx::query(
            r#"
UPDATE stats
SET
    received = received + $1,
    unique_processed = unique_processed + $2,
    duplicate_dropped = duplicate_dropped + $3,
    updated_at = NOW()
WHERE id = 1
            "#,
        )
        .bind(delta.received)
        .bind(delta.unique)
        .bind(delta.duplicate)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "UPDATE".to_owned(),
            error,
        })?;

        Ok(())
    }

    async fn stats(&self) -> Result<Stats, StoreError> {
        sqlx::query_as::<_, Stats>(
            r#"
SELECT received, unique_processed, duplicate_dropped, updated_at
FROM stats
WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "SELECT".to_owned(),
            error,
        })
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, StoreError> {
        sqlx::query_as::<_, StoredEvent>(
            r#"
SELECT id, topic, event_id, timestamp, source, payload, processed_at
FROM processed_events
WHERE $1::text IS NULL OR topic = $1
ORDER BY processed_at DESC, id DESC
LIMIT $2 OFFSET $3
            "#,
        )
        .bind(filter.topic.as_deref())
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "SELECT".to_owned(),
            error,
        })
    }

    async fn topic_count(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT topic) FROM processed_events")
            .fetch_one(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "SELECT".to_owned(),
                error,
            })
    }

    async fn healthcheck(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "SELECT".to_owned(),
                error,
            })?;

        Ok(())
    }
}
