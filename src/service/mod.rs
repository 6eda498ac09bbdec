//! Pagination, preloading and search over the tiered page cache.
//!
//! `HistoryService` is built once at startup and cloned into every consumer.
//! Foreground reads are cache-first, collapse onto a single in-flight fetch
//! per cache key, and kick off background preloads of the following pages.

pub mod enhance;
pub mod filter;

use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blockchain::fetcher::{FetchError, SourceChain};
use crate::cache::{CacheKey, InflightRequests, PageCache};
use crate::models::{CacheStats, Filters, TransactionPage, TransactionRecord};
use crate::validation::validate_safe_address;

pub use enhance::{CalldataTokenEnhancer, NoopEnhancer, TransactionEnhancer};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("All transaction sources failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),
}

impl HistoryError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HistoryError::Cancelled)
    }
}

impl From<FetchError> for HistoryError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Exhausted(failures) => HistoryError::Exhausted(failures),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HistorySettings {
    pub page_size: u64,
    /// Pages fetched ahead of the one requested
    pub preload_pages: u32,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            page_size: 20,
            preload_pages: 2,
        }
    }
}

#[derive(Clone)]
pub struct HistoryService {
    cache: PageCache,
    inflight: InflightRequests<TransactionPage, HistoryError>,
    chain: Arc<SourceChain>,
    enhancer: Arc<dyn TransactionEnhancer>,
    settings: HistorySettings,
    preload_scope: CancellationToken,
}

impl HistoryService {
    pub fn new(cache: PageCache, chain: Arc<SourceChain>, settings: HistorySettings) -> Self {
        Self {
            cache,
            inflight: InflightRequests::new(),
            chain,
            enhancer: Arc::new(NoopEnhancer),
            settings,
            preload_scope: CancellationToken::new(),
        }
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn TransactionEnhancer>) -> Self {
        self.enhancer = enhancer;
        self
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn settings(&self) -> HistorySettings {
        self.settings
    }

    /// Cache-first page read. A cancelled `cancel` token abandons the wait and
    /// returns `HistoryError::Cancelled`; the page is then only cached if some
    /// other caller is still waiting on the same fetch.
    pub async fn get_page(
        &self,
        address: &str,
        page: u32,
        filters: &Filters,
        cancel: &CancellationToken,
    ) -> Result<TransactionPage, HistoryError> {
        let address = normalize_address(address)?;
        if cancel.is_cancelled() {
            return Err(HistoryError::Cancelled);
        }

        let key = CacheKey::transaction_page(&address, page, filters).to_string();
        if let Some(entry) = self.cache.get(&key).await {
            self.schedule_preload(&address, page, filters);
            return Ok(entry.data);
        }

        let load = self.load_page(&address, page, filters, &key);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Request for {} cancelled by caller", key);
                return Err(HistoryError::Cancelled);
            }
            result = load => result,
        };

        let fetched = result?;
        self.schedule_preload(&address, page, filters);
        Ok(fetched)
    }

    /// Drop every cached page of `address`, across all filter sets
    pub async fn invalidate(&self, address: &str) -> Result<usize, HistoryError> {
        let address = normalize_address(address)?;
        let removed = self.cache.invalidate_prefix(&CacheKey::address_prefix(&address)).await;
        info!("Invalidated {} cached pages for {}", removed, address);
        Ok(removed)
    }

    /// Substring search over already-cached unfiltered pages, starting at page 0.
    /// Never touches the network.
    pub async fn search(
        &self,
        address: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<TransactionRecord>, HistoryError> {
        let address = normalize_address(address)?;
        let mut results = Vec::new();
        if query.trim().is_empty() || max_results == 0 {
            return Ok(results);
        }

        let unfiltered = Filters::default();
        let mut page = 0u32;
        loop {
            let key = CacheKey::transaction_page(&address, page, &unfiltered).to_string();
            let Some(entry) = self.cache.get(&key).await else {
                debug!("Search for {} stopped at uncached page {}", address, page);
                break;
            };

            results.extend(filter::search(&entry.data.transactions, query));
            if results.len() >= max_results || !entry.data.has_more {
                break;
            }
            match page.checked_add(1) {
                Some(next) => page = next,
                None => break,
            }
        }

        results.truncate(max_results);
        Ok(results)
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            ephemeral_count: self.cache.ephemeral_count().await,
            persistent_count: self.cache.persistent_count().await,
            in_flight_count: self.inflight.in_flight_count() as u64,
            approx_memory_size: self.cache.approx_memory_size(),
        }
    }

    /// Stop every outstanding preload
    pub fn shutdown(&self) {
        self.preload_scope.cancel();
    }

    pub async fn get_transaction_history(
        &self,
        address: &str,
        page: u32,
        filters: Option<Filters>,
    ) -> Result<TransactionPage, HistoryError> {
        let filters = filters.unwrap_or_default();
        self.get_page(address, page, &filters, &CancellationToken::new()).await
    }

    pub async fn invalidate_cache(&self, address: &str) -> Result<usize, HistoryError> {
        self.invalidate(address).await
    }

    pub async fn search_transactions(
        &self,
        address: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<TransactionRecord>, HistoryError> {
        self.search(address, query, max_results).await
    }

    pub async fn get_cache_stats(&self) -> CacheStats {
        self.stats().await
    }

    fn load_page(
        &self,
        address: &str,
        page: u32,
        filters: &Filters,
        key: &str,
    ) -> impl std::future::Future<Output = Result<TransactionPage, HistoryError>> + Send + 'static {
        let job = PageJob {
            cache: self.cache.clone(),
            chain: self.chain.clone(),
            enhancer: self.enhancer.clone(),
            address: address.to_string(),
            page,
            filters: filters.clone(),
            key: key.to_string(),
            page_size: self.settings.page_size,
        };
        self.inflight.dedupe(key, move || job.run())
    }

    fn schedule_preload(&self, address: &str, page: u32, filters: &Filters) {
        if self.settings.preload_pages == 0 || self.preload_scope.is_cancelled() {
            return;
        }

        let service = self.clone();
        let address = address.to_string();
        let filters = filters.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = service.preload_scope.cancelled() => {
                    debug!("Preload for {} cancelled", address);
                }
                _ = service.preload(&address, page, &filters) => {}
            }
        });
    }

    async fn preload(&self, address: &str, page: u32, filters: &Filters) {
        let mut loads = Vec::new();
        for next in (1..=self.settings.preload_pages).filter_map(|i| page.checked_add(i)) {
            let key = CacheKey::transaction_page(address, next, filters).to_string();
            if self.cache.contains(&key).await {
                continue;
            }
            debug!("Preloading page {} for {}", next, address);
            loads.push(self.load_page(address, next, filters, &key).map(move |r| (next, r)));
        }

        for (next, result) in join_all(loads).await {
            if let Err(e) = result {
                warn!("Preload of page {} for {} failed: {}", next, address, e);
            }
        }
    }
}

/// Everything one page fetch needs, owned so the fetch can outlive its caller
struct PageJob {
    cache: PageCache,
    chain: Arc<SourceChain>,
    enhancer: Arc<dyn TransactionEnhancer>,
    address: String,
    page: u32,
    filters: Filters,
    key: String,
    page_size: u64,
}

impl PageJob {
    async fn run(self) -> Result<TransactionPage, HistoryError> {
        // Another fetch may have filled the key after the caller missed the cache
        if let Some(entry) = self.cache.get(&self.key).await {
            debug!("Page {} for {} cached while queued", self.page, self.address);
            return Ok(entry.data);
        }

        let offset = u64::from(self.page) * self.page_size;
        let mut fetched = self.chain.fetch_page(&self.address, offset, self.page_size).await?;

        let records = std::mem::take(&mut fetched.transactions);
        let records = self.enhancer.enhance(records, &self.address).await;
        fetched.transactions = filter::apply_filters(records, &self.filters);
        fetched.cache_key = self.key.clone();

        self.cache.set(&self.key, fetched.clone(), None).await;
        debug!(
            "Cached page {} for {} ({} records)",
            self.page,
            self.address,
            fetched.transactions.len()
        );
        Ok(fetched)
    }
}

fn normalize_address(address: &str) -> Result<String, HistoryError> {
    validate_safe_address(address).map_err(|_| HistoryError::InvalidAddress(address.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TierSettings;
    use crate::tests::support::{chain_of, executed_records, memory_cache, Behavior, FakeSource, SAFE};

    fn job(cache: &PageCache, source: &Arc<FakeSource>) -> PageJob {
        let filters = Filters::default();
        PageJob {
            cache: cache.clone(),
            chain: chain_of(&[source.clone()]),
            enhancer: Arc::new(NoopEnhancer),
            address: SAFE.to_string(),
            page: 0,
            key: CacheKey::transaction_page(SAFE, 0, &filters).to_string(),
            filters,
            page_size: 20,
        }
    }

    #[tokio::test]
    async fn page_cached_before_the_job_runs_is_not_refetched() {
        let cache = memory_cache(TierSettings::default());
        let source = Arc::new(FakeSource::new("tx-service", Behavior::Records(executed_records(5))));
        let job = job(&cache, &source);

        let cached = TransactionPage {
            transactions: executed_records(2),
            total_count: 2,
            has_more: false,
            next_offset: 2,
            cache_key: job.key.clone(),
        };
        cache.set(&job.key, cached.clone(), None).await;

        let page = job.run().await.unwrap();

        assert_eq!(page, cached);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn uncached_job_fetches_and_stores() {
        let cache = memory_cache(TierSettings::default());
        let source = Arc::new(FakeSource::new("tx-service", Behavior::Records(executed_records(5))));
        let job = job(&cache, &source);
        let key = job.key.clone();

        let page = job.run().await.unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(page.transactions.len(), 5);
        assert_eq!(cache.get(&key).await.unwrap().data, page);
    }
}
