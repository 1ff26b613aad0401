use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::instrument;

use crate::event::{RawEvent, ValidatedEvent};
use crate::store::{EventStore, InsertOutcome, StatsDelta, StoreError};

/// Terminal classification of a single event. Every event maps to exactly
/// one variant; a redelivered event classifying as `Duplicate` is a correct
/// business outcome, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Accepted,
    Duplicate,
    Rejected(String),
}

/// Summary of one `process_batch` call, returned to the caller.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub received: u64,
    pub processed: u64,
    pub duplicates: u64,
    pub errors: Vec<String>,
}

/// Ensures each event `(topic, event_id)` is durably recorded exactly once,
/// despite arbitrary redelivery. Holds no state across calls; all mutual
/// exclusion is delegated to the store's conflict detection.
pub struct IdempotentConsumer {
    store: Arc<dyn EventStore>,
}

impl IdempotentConsumer {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Classify a single event. Only store connectivity faults surface as
    /// errors; a malformed timestamp becomes `Rejected` so the batch fold
    /// stays total.
    pub async fn process_event(&self, event: &RawEvent) -> Result<EventOutcome, StoreError> {
        let timestamp = match event.parse_timestamp() {
            Ok(timestamp) => timestamp,
            Err(err) => {
                return Ok(EventOutcome::Rejected(format!(
                    "event {}: {}",
                    event.event_id, err
                )))
            }
        };

        let validated = ValidatedEvent {
            topic: event.topic.clone(),
            event_id: event.event_id.clone(),
            timestamp,
            source: event.source.clone(),
            payload: event.payload.clone(),
        };

        match self.store.insert_if_absent(&validated).await? {
            InsertOutcome::Inserted => {
                tracing::debug!(
                    topic = event.topic,
                    event_id = event.event_id,
                    source = event.source,
                    "processed event"
                );
                Ok(EventOutcome::Accepted)
            }
            InsertOutcome::AlreadyExists => {
                tracing::debug!(
                    topic = event.topic,
                    event_id = event.event_id,
                    "duplicate detected, skipped"
                );
                Ok(EventOutcome::Duplicate)
            }
        }
    }

    /// Process a batch, one conditional insert per event, then fold the
    /// aggregate deltas into the stats counters with a single increment.
    ///
    /// Each insert commits independently; a store fault aborts the whole
    /// call with no partial report, and the caller retries the entire
    /// batch. The retry is safe because already-committed rows classify as
    /// duplicates on the second pass, which also settles the counters.
    #[instrument(skip_all, fields(batch_size = events.len()))]
    pub async fn process_batch(&self, events: &[RawEvent]) -> Result<BatchReport, StoreError> {
        let mut processed: u64 = 0;
        let mut duplicates: u64 = 0;
        let mut errors = Vec::new();

        for event in events {
            match self.process_event(event).await? {
                EventOutcome::Accepted => processed += 1,
                EventOutcome::Duplicate => duplicates += 1,
                EventOutcome::Rejected(reason) => {
                    tracing::warn!(reason, "rejected event");
                    errors.push(reason);
                }
            }
        }

        self.store
            .increment_stats(StatsDelta {
                received: events.len() as i64,
                unique: processed as i64,
                duplicate: duplicates as i64,
            })
            .await?;

        counter!("aggregator_events_received_total").increment(events.len() as u64);
        counter!("aggregator_events_unique_total").increment(processed);
        counter!("aggregator_events_duplicate_total").increment(duplicates);

        tracing::info!(
            received = events.len(),
            processed,
            duplicates,
            errors = errors.len(),
            "batch processing complete"
        );

        Ok(BatchReport {
            received: events.len() as u64,
            processed,
            duplicates,
            errors,
        })
    }
}
