use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use metrics::histogram;
use serde::Deserialize;
use tracing::instrument;

use crate::api::{IngestError, PublishResponse};
use crate::event::RawEvent;
use crate::router::AppState;

/// The body of a publish request: a non-empty ordered sequence of events.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub events: Vec<RawEvent>,
}

#[instrument(skip_all, fields(batch_size))]
pub async fn publish(
    State(state): State<AppState>,
    Json(batch): Json<BatchRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), IngestError> {
    if batch.events.is_empty() {
        return Err(IngestError::EmptyBatch);
    }

    tracing::Span::current().record("batch_size", batch.events.len());

    // Schema checks reject the whole request; timestamp parsing is the
    // consumer's job and is reported per event instead.
    for event in &batch.events {
        event.validate()?;
    }

    let start = Instant::now();
    let report = state.consumer.process_batch(&batch.events).await?;
    histogram!("aggregator_batch_ingest_duration_seconds").record(start.elapsed().as_secs_f64());

    Ok((
        StatusCode::CREATED,
        Json(PublishResponse {
            status: "success".to_owned(),
            message: format!(
                "Processed {} events, skipped {} duplicates",
                report.processed, report.duplicates
            ),
            details: report,
        }),
    ))
}
