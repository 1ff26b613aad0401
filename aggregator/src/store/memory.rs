use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::event::{Stats, StoredEvent, ValidatedEvent};
use crate::store::{EventFilter, EventStore, InsertOutcome, StatsDelta, StoreError};

struct Inner {
    events: Vec<StoredEvent>,
    seen: HashSet<(String, String)>,
    stats: Stats,
    next_id: i64,
}

/// In-process event store for local runs and tests. The mutex plays the role
/// of the database's conflict detection: membership check and insert happen
/// under one lock, so the same race guarantees hold.
pub struct MemoryEventStore {
    inner: Mutex<Inner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: Vec::new(),
                seen: HashSet::new(),
                stats: Stats {
                    received: 0,
                    unique_processed: 0,
                    duplicate_dropped: 0,
                    updated_at: Utc::now(),
                },
                next_id: 1,
            }),
        }
    }

    /// Number of stored rows, used by tests to assert dedup took effect.
    pub async fn stored_count(&self) -> usize {
        self.inner.lock().await.events.len()
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_if_absent(&self, event: &ValidatedEvent) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.inner.lock().await;

        let key = (event.topic.clone(), event.event_id.clone());
        if !inner.seen.insert(key) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.events.push(StoredEvent {
            id,
            topic: event.topic.clone(),
            event_id: event.event_id.clone(),
            timestamp: event.timestamp,
            source: event.source.clone(),
            payload: event.payload.clone(),
            processed_at: Utc::now(),
        });

        Ok(InsertOutcome::Inserted)
    }

    async fn increment_stats(&self, delta: StatsDelta) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        inner.stats.received += delta.received;
        inner.stats.unique_processed += delta.unique;
        inner.stats.duplicate_dropped += delta.duplicate;
        inner.stats.updated_at = Utc::now();

        Ok(())
    }

    async fn stats(&self) -> Result<Stats, StoreError> {
        Ok(self.inner.lock().await.stats.clone())
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, StoreError> {
        let inner = self.inner.lock().await;

        let mut events: Vec<StoredEvent> = inner
            .events
            .iter()
            .filter(|event| {
                filter
                    .topic
                    .as_ref()
                    .map_or(true, |topic| &event.topic == topic)
            })
            .cloned()
            .collect();

        events.sort_by(|a, b| (b.processed_at, b.id).cmp(&(a.processed_at, a.id)));

        Ok(events
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn topic_count(&self) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;

        let topics: HashSet<&str> = inner
            .events
            .iter()
            .map(|event| event.topic.as_str())
            .collect();

        Ok(topics.len() as i64)
    }

    async fn healthcheck(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
