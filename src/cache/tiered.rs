//! Two-tier cache: a bounded moka cache in front of a persistent key/value store

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::entry::CacheEntry;
use crate::db::KeyValueStore;

/// Per-entry expiry driven by `CacheEntry::expires_at`
struct EntryExpiry;

impl<T> Expiry<String, CacheEntry<T>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry<T>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.remaining_ttl())
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry<T>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.remaining_ttl())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TierSettings {
    pub ephemeral_ttl: Duration,
    pub persistent_ttl: Duration,
    pub ephemeral_capacity: u64,
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            ephemeral_ttl: Duration::from_secs(5 * 60),
            persistent_ttl: Duration::from_secs(30 * 60),
            ephemeral_capacity: 1000,
        }
    }
}

/// Sweep outcome, mostly for logging
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub ephemeral_removed: usize,
    pub persistent_removed: usize,
}

/// Manages the ephemeral and persistent tiers of a cache
#[derive(Clone)]
pub struct TieredCache<T> {
    ephemeral: Cache<String, CacheEntry<T>>,
    persistent: Arc<dyn KeyValueStore>,
    settings: TierSettings,
}

impl<T> TieredCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(persistent: Arc<dyn KeyValueStore>, settings: TierSettings) -> Self {
        // LRU keeps recently read pages once the capacity is hit, even if none expired yet
        let ephemeral = Cache::builder()
            .max_capacity(settings.ephemeral_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryExpiry)
            .build();

        Self {
            ephemeral,
            persistent,
            settings,
        }
    }

    pub fn settings(&self) -> TierSettings {
        self.settings
    }

    /// Look a key up in the ephemeral tier, then the persistent tier.
    ///
    /// A persistent hit is promoted into the ephemeral tier with the ephemeral TTL.
    pub async fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        if let Some(entry) = self.ephemeral.get(key).await {
            if entry.is_valid() {
                debug!("Ephemeral cache hit for key: {}", key);
                return Some(entry);
            }
            self.ephemeral.invalidate(key).await;
        }

        let raw = match self.persistent.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("Cache miss for key: {}", key);
                return None;
            }
            Err(e) => {
                warn!("Persistent cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) if entry.is_valid() => {
                debug!("Persistent cache hit for key: {}", key);
                let promoted = self.sized_entry(key, entry.data, self.settings.ephemeral_ttl);
                self.ephemeral.insert(key.to_string(), promoted.clone()).await;
                Some(promoted)
            }
            Ok(_) => {
                debug!("Persistent entry expired for key: {}", key);
                self.remove_persistent(key).await;
                None
            }
            Err(e) => {
                warn!("Corrupt persistent cache entry {}: {}", key, e);
                self.remove_persistent(key).await;
                None
            }
        }
    }

    /// Whether a valid entry exists, without promoting anything
    pub async fn contains(&self, key: &str) -> bool {
        if let Some(entry) = self.ephemeral.get(key).await {
            if entry.is_valid() {
                return true;
            }
        }
        match self.persistent.get(key).await {
            Ok(Some(raw)) => serde_json::from_str::<CacheEntry<T>>(&raw)
                .map(|entry| entry.is_valid())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Store a value in both tiers. `ttl` overrides the ephemeral TTL; the
    /// persistent tier always uses its own TTL.
    pub async fn set(&self, key: &str, data: T, ttl: Option<Duration>) {
        let persistent = CacheEntry::new(key, data.clone(), self.settings.persistent_ttl);
        match serde_json::to_string(&persistent) {
            Ok(raw) => {
                if let Err(e) = self.persistent.set(key, &raw).await {
                    warn!("Persistent cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Failed to serialize cache entry {}: {}", key, e),
        }

        let ttl = ttl.unwrap_or(self.settings.ephemeral_ttl);
        let entry = self.sized_entry(key, data, ttl);
        self.ephemeral.insert(key.to_string(), entry).await;
        debug!("Cached {} with TTL: {:?}", key, ttl);
    }

    /// Remove every entry in both tiers whose key starts with `prefix`
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let ephemeral_keys: Vec<String> = self
            .ephemeral
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        for key in &ephemeral_keys {
            self.ephemeral.invalidate(key).await;
        }

        let mut persistent_removed = 0;
        match self.persistent.keys().await {
            Ok(keys) => {
                for key in keys.iter().filter(|key| key.starts_with(prefix)) {
                    if self.remove_persistent(key).await {
                        persistent_removed += 1;
                    }
                }
            }
            Err(e) => warn!("Failed to list persistent cache keys: {}", e),
        }

        info!(
            "Invalidated cache entries with prefix {} ({} ephemeral, {} persistent)",
            prefix,
            ephemeral_keys.len(),
            persistent_removed
        );
        ephemeral_keys.len() + persistent_removed
    }

    /// Purge expired entries from both tiers independently
    pub async fn sweep(&self) -> SweepReport {
        let expired: Vec<String> = self
            .ephemeral
            .iter()
            .filter(|(_, entry)| !entry.is_valid())
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        for key in &expired {
            self.ephemeral.invalidate(key).await;
        }
        self.ephemeral.run_pending_tasks().await;

        let mut persistent_removed = 0;
        match self.persistent.keys().await {
            Ok(keys) => {
                for key in keys {
                    let keep = match self.persistent.get(&key).await {
                        Ok(Some(raw)) => serde_json::from_str::<CacheEntry<T>>(&raw)
                            .map(|entry| entry.is_valid())
                            .unwrap_or(false),
                        Ok(None) => true,
                        Err(e) => {
                            warn!("Persistent cache read failed during sweep for {}: {}", key, e);
                            true
                        }
                    };
                    if !keep && self.remove_persistent(&key).await {
                        persistent_removed += 1;
                    }
                }
            }
            Err(e) => warn!("Failed to list persistent cache keys: {}", e),
        }

        SweepReport {
            ephemeral_removed: expired.len(),
            persistent_removed,
        }
    }

    /// Run `sweep` every `interval` until `shutdown` fires
    pub fn spawn_cleanup(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = cache.sweep().await;
                        if report.ephemeral_removed + report.persistent_removed > 0 {
                            debug!(
                                "Cache sweep removed {} ephemeral and {} persistent entries",
                                report.ephemeral_removed, report.persistent_removed
                            );
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("Shutting down cache cleanup task");
                        break;
                    }
                }
            }
        })
    }

    pub async fn ephemeral_count(&self) -> u64 {
        self.ephemeral.run_pending_tasks().await;
        self.ephemeral.entry_count()
    }

    pub async fn persistent_count(&self) -> u64 {
        match self.persistent.keys().await {
            Ok(keys) => keys.len() as u64,
            Err(e) => {
                warn!("Failed to list persistent cache keys: {}", e);
                0
            }
        }
    }

    pub fn approx_memory_size(&self) -> u64 {
        self.ephemeral
            .iter()
            .filter(|(_, entry)| entry.is_valid())
            .map(|(_, entry)| entry.approx_size)
            .sum()
    }

    fn sized_entry(&self, key: &str, data: T, ttl: Duration) -> CacheEntry<T> {
        let mut entry = CacheEntry::new(key, data, ttl);
        entry.approx_size = serde_json::to_vec(&entry.data)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0);
        entry
    }

    async fn remove_persistent(&self, key: &str) -> bool {
        match self.persistent.delete(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to remove persistent cache entry {}: {}", key, e);
                false
            }
        }
    }
}
