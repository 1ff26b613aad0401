use std::future::ready;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::consumer::IdempotentConsumer;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::store::EventStore;
use crate::{ingest, query};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub consumer: Arc<IdempotentConsumer>,
    pub started_at: Instant,
}

async fn liveness() -> &'static str {
    "aggregator"
}

pub fn router<S: EventStore + 'static>(store: S, metrics: bool) -> Router {
    let store: Arc<dyn EventStore> = Arc::new(store);
    let state = AppState {
        consumer: Arc::new(IdempotentConsumer::new(store.clone())),
        store,
        started_at: Instant::now(),
    };

    let router = Router::new()
        .route("/", get(query::index))
        .route("/publish", post(ingest::publish))
        .route("/events", get(query::list_events))
        .route("/stats", get(query::stats))
        .route("/health", get(query::health))
        .route("/_readiness", get(liveness))
        .route("/_liveness", get(liveness))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when the aggregator is used as a library
    // (during tests etc) does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
