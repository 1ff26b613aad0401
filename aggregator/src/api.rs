use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::consumer::BatchReport;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("request holds no event")]
    EmptyBatch,
    #[error("event {0} must be a non-empty string of at most 255 characters")]
    InvalidField(&'static str),
    #[error("event payload must be a JSON object")]
    InvalidPayload,
    #[error("timestamp is not a valid RFC 3339 instant: {0}")]
    MalformedTimestamp(String),
    #[error("event store is unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match self {
            IngestError::EmptyBatch | IngestError::MalformedTimestamp(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            IngestError::InvalidField(_) | IngestError::InvalidPayload => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }

            // The true outcome of a timed-out write is unknown, but a retry
            // is always safe because ingestion is idempotent.
            IngestError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
        }
        .into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub status: String,
    pub message: String,
    pub details: BatchReport,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub received: i64,
    pub unique_processed: i64,
    pub duplicate_dropped: i64,
    pub topics: i64,
    pub uptime: f64,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub service: &'static str,
    pub status: &'static str,
    pub uptime: f64,
}
