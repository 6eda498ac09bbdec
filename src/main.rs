// Initialize configuration
// Set up logging
// Open the persistent cache store
// Build the source chain and history service
// Start the cache sweep task
// Start HTTP server

use safe_history_service::{
    api,
    blockchain::{
        EventScanSource, ExplorerSource, RpcClient, SafeServiceSource, SourceChain,
        TransactionSource,
    },
    cache::PageCache,
    config::Config,
    db::{self, SqliteStore},
    service::{CalldataTokenEnhancer, HistoryService},
    state::AppState,
};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn build_sources(config: &Config, http: &reqwest::Client) -> Vec<Arc<dyn TransactionSource>> {
    let mut sources: Vec<Arc<dyn TransactionSource>> = Vec::new();

    if let Some(url) = &config.tx_service_url {
        sources.push(Arc::new(SafeServiceSource::new(
            http.clone(),
            url,
            config.tx_service_timeout,
        )));
    }
    if let Some(url) = &config.rpc_url {
        let client = Arc::new(RpcClient::new(http.clone(), url));
        sources.push(Arc::new(EventScanSource::new(client, config.rpc_timeout)));
    }
    if let Some(url) = &config.explorer_url {
        sources.push(Arc::new(ExplorerSource::new(
            http.clone(),
            url,
            config.explorer_api_key.clone(),
            config.explorer_settings(),
        )));
    }

    sources
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting safe-history-service");

    // Load configuration
    let config = Config::from_env();
    tracing::info!("Configuration loaded: {:?}", config);

    // Setup persistent cache store
    let db_pool = db::connection::establish_connection(&config.database_url).await?;
    sqlx::query("SELECT 1").execute(&db_pool).await?;
    tracing::info!("Cache database connection verified");

    let cache = PageCache::new(Arc::new(SqliteStore::new(db_pool)), config.tier_settings());
    tracing::info!(
        "Cache initialized with ephemeral TTL: {:?}, persistent TTL: {:?}, capacity: {}",
        config.ephemeral_ttl,
        config.persistent_ttl,
        config.ephemeral_capacity
    );

    let http = reqwest::Client::new();
    let chain = SourceChain::new(build_sources(&config, &http));
    if chain.source_names().is_empty() {
        warn!("No transaction sources configured; every page will be empty");
    } else {
        info!("Source chain: {}", chain.source_names().join(" -> "));
    }

    let service = HistoryService::new(cache.clone(), Arc::new(chain), config.history_settings())
        .with_enhancer(Arc::new(CalldataTokenEnhancer));

    let shutdown = CancellationToken::new();
    let sweeper = cache.spawn_cleanup(config.cleanup_interval, shutdown.clone());

    let app_state = Arc::new(AppState {
        config: config.clone(),
        service: service.clone(),
    });

    // Start HTTP server
    let app = api::create_router(app_state).layer(CorsLayer::permissive());
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Starting server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await?;

    service.shutdown();
    shutdown.cancel();
    sweeper.await?;

    Ok(())
}
