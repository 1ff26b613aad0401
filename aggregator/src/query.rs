use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::api::{IngestError, ServiceStatus, StatsResponse};
use crate::event::StoredEvent;
use crate::router::AppState;
use crate::store::EventFilter;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub topic: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn index(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        service: "pub-sub log aggregator",
        status: "running",
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<StoredEvent>>, IngestError> {
    let filter = EventFilter {
        topic: query.topic,
        limit: query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        offset: query.offset.unwrap_or(0).max(0),
    };

    let events = state.store.list_events(&filter).await?;

    tracing::debug!(
        returned = events.len(),
        topic = filter.topic,
        limit = filter.limit,
        offset = filter.offset,
        "events listed"
    );

    Ok(Json(events))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, IngestError> {
    let stats = state.store.stats().await?;
    let topics = state.store.topic_count().await?;

    Ok(Json(StatsResponse {
        received: stats.received,
        unique_processed: stats.unique_processed,
        duplicate_dropped: stats.duplicate_dropped,
        topics,
        uptime: state.started_at.elapsed().as_secs_f64(),
    }))
}

pub async fn health(State(state): State<AppState>) -> Response {
    let uptime = state.started_at.elapsed().as_secs_f64();

    match state.store.healthcheck().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"status": "healthy", "database": "healthy", "uptime": uptime})),
        )
            .into_response(),
        Err(err) => {
            tracing::error!("database health check failed: {}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unhealthy", "database": "unhealthy", "uptime": uptime})),
            )
                .into_response()
        }
    }
}
