use safe_history_service::{
    blockchain::{EventScanSource, ExplorerSource, RpcClient, SafeServiceSource, TransactionSource},
    cache::PageCache,
    config::Config,
    db::MemoryStore,
    service::{HistoryService, NoopEnhancer},
    validation::validate_safe_address,
    SourceChain,
};
use std::{sync::Arc, time::Instant};
use tracing::{info, error, warn, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting source chain smoke test...");

    // 1. Setup
    let config = Config::from_env();
    let address = match std::env::args().nth(1) {
        Some(arg) => validate_safe_address(&arg)?,
        None => {
            error!("❌ Usage: test_sources <safe address>");
            return Ok(());
        }
    };
    let http = reqwest::Client::new();

    // 2. Query each configured source on its own
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
    if sources.is_empty() {
        warn!("No sources configured, set TX_SERVICE_URL, RPC_URL or EXPLORER_URL");
        return Ok(());
    }

    for source in &sources {
        let started = Instant::now();
        match tokio::time::timeout(source.timeout(), source.fetch(&address, 0, 5)).await {
            Ok(Ok(batch)) => {
                info!(
                    "✅ {} returned {} records in {:?}",
                    source.name(),
                    batch.records.len(),
                    started.elapsed()
                );
                for record in &batch.records {
                    info!(
                        "   {} {:?} {} -> {} value {}",
                        record.id, record.status, record.from, record.to, record.value
                    );
                }
            }
            Ok(Err(e)) => error!("❌ {} failed: {}", source.name(), e),
            Err(_) => warn!("⚠️ {} timed out after {:?}", source.name(), source.timeout()),
        }
    }

    // 3. Run the full service twice; the second read should come from cache
    let cache = PageCache::new(Arc::new(MemoryStore::new()), config.tier_settings());
    let chain = Arc::new(SourceChain::new(sources));
    let service = HistoryService::new(cache, chain, config.history_settings())
        .with_enhancer(Arc::new(NoopEnhancer));

    let started = Instant::now();
    let page = service.get_transaction_history(&address, 0, None).await?;
    info!(
        "✅ Page 0: {} records, has_more={}, total={} in {:?}",
        page.transactions.len(),
        page.has_more,
        page.total_count,
        started.elapsed()
    );

    let started = Instant::now();
    let again = service.get_transaction_history(&address, 0, None).await?;
    if again == page {
        info!("✅ Cached read returned the same page in {:?}", started.elapsed());
    } else {
        error!("❌ Cached read returned a different page");
    }

    let stats = service.get_cache_stats().await;
    info!("Cache stats: {:?}", stats);

    service.shutdown();
    info!("Source chain smoke test complete");
    Ok(())
}
