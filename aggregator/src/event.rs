use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::IngestError;

/// Producers may resend the same logical event any number of times, so fields
/// longer than this are rejected before they ever reach the store.
pub const MAX_FIELD_LENGTH: usize = 255;

/// An event as submitted by a producer. The timestamp stays a string until
/// the consumer parses it; a malformed timestamp is reported per event
/// instead of failing the whole request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawEvent {
    pub topic: String,
    pub event_id: String,
    pub timestamp: String,
    pub source: String,
    pub payload: Value,
}

impl RawEvent {
    /// Schema checks performed at the request boundary.
    pub fn validate(&self) -> Result<(), IngestError> {
        for (field, value) in [
            ("topic", &self.topic),
            ("event_id", &self.event_id),
            ("source", &self.source),
        ] {
            if value.is_empty() || value.len() > MAX_FIELD_LENGTH {
                return Err(IngestError::InvalidField(field));
            }
        }

        if !self.payload.is_object() {
            return Err(IngestError::InvalidPayload);
        }

        Ok(())
    }

    /// Parse the producer-supplied timestamp into the instant we persist.
    pub fn parse_timestamp(&self) -> Result<DateTime<Utc>, IngestError> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| IngestError::MalformedTimestamp(self.timestamp.clone()))
    }
}

/// An event that passed validation and timestamp parsing, ready for the
/// conditional insert.
#[derive(Debug, Clone)]
pub struct ValidatedEvent {
    pub topic: String,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub payload: Value,
}

/// A durably recorded event. `(topic, event_id)` is unique across all rows,
/// enforced by the store itself.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredEvent {
    pub id: i64,
    pub topic: String,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub payload: Value,
    pub processed_at: DateTime<Utc>,
}

/// The singleton counters row. `received == unique_processed +
/// duplicate_dropped` holds whenever no batch is in flight.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Stats {
    pub received: i64,
    pub unique_processed: i64,
    pub duplicate_dropped: i64,
    pub updated_at: DateTime<Utc>,
}
