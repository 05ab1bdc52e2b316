use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::{Config, StoreBackend};
use crate::definitions::DefinitionCatalog;
use crate::flags::resolver::FlagResolver;
use crate::persistence::{FlagPersistence, MemoryPersistence, PostgresPersistence};
use crate::router;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let persistence: Arc<dyn FlagPersistence + Send + Sync> = match config.flag_store_backend {
        StoreBackend::Postgres => match PostgresPersistence::new(
            &config.database_url,
            config.max_pg_connections,
            config.acquire_timeout(),
        )
        .await
        {
            Ok(persistence) => Arc::new(persistence),
            Err(e) => {
                tracing::error!("Failed to create database pool: {}", e);
                return;
            }
        },
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory flag store, changes will not survive a restart");
            Arc::new(MemoryPersistence::new())
        }
    };

    let resolver = Arc::new(
        FlagResolver::new(Arc::new(DefinitionCatalog::builtin()), persistence)
            .with_settings_key(config.settings_key.clone()),
    );
    // Resolve before accepting traffic; failures fall back to catalog defaults.
    resolver.load_feature_flags().await;

    let metrics = if config.enable_metrics {
        router::setup_metrics_recorder()
    } else {
        None
    };
    let app = router::router(resolver, metrics);

    tracing::info!("listening on {:?}", listener.local_addr());
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!("Server exited with error: {}", e);
    }
}
