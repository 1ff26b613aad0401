use std::future::Future;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::router;
use crate::store::{MemoryEventStore, PostgresEventStore};

pub async fn serve<F>(config: Config, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = if config.in_memory_store {
        tracing::warn!("using in-memory event store, events will not survive a restart");
        router::router(MemoryEventStore::new(), config.export_prometheus)
    } else {
        let store = PostgresEventStore::new(&config.database_url, config.max_pg_connections).await?;
        store.run_migrations().await?;
        router::router(store, config.export_prometheus)
    };

    let listener = TcpListener::bind(config.address).await?;
    tracing::info!("listening on {}", config.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
