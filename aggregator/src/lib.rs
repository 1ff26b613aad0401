pub mod api;
pub mod config;
pub mod consumer;
pub mod event;
pub mod ingest;
pub mod prometheus;
pub mod query;
pub mod router;
pub mod server;
pub mod store;
