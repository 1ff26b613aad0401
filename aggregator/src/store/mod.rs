use async_trait::async_trait;
use thiserror::Error;

use crate::event::{Stats, StoredEvent, ValidatedEvent};

mod memory;
mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PostgresEventStore;

/// Enumeration of errors for operations against the event store.
/// Errors originate from sqlx and are wrapped to provide context; every
/// variant is a transient infrastructure fault, retryable by the caller.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("pool creation failed with: {error}")]
    PoolCreationError { error: sqlx::Error },
    #[error("migrations failed with: {error}")]
    MigrationError { error: sqlx::migrate::MigrateError },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
}

/// Outcome of a conditional insert. At most one concurrent caller observes
/// `Inserted` for a given `(topic, event_id)` pair; all others observe
/// `AlreadyExists`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Relative increments applied to the stats singleton in one statement.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsDelta {
    pub received: i64,
    pub unique: i64,
    pub duplicate: i64,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub topic: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert the event unless a row with the same `(topic, event_id)`
    /// already exists. The uniqueness check and the write are a single
    /// atomic operation inside the store; callers never check first.
    async fn insert_if_absent(&self, event: &ValidatedEvent) -> Result<InsertOutcome, StoreError>;

    /// Add the deltas to the singleton counters row. Must be a single
    /// relative-update statement, never read-modify-write, so concurrent
    /// batches cannot lose increments.
    async fn increment_stats(&self, delta: StatsDelta) -> Result<(), StoreError>;

    async fn stats(&self) -> Result<Stats, StoreError>;

    /// Read-only listing, newest first.
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, StoreError>;

    async fn topic_count(&self) -> Result<i64, StoreError>;

    async fn healthcheck(&self) -> Result<(), StoreError>;
}
