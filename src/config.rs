// Configuration structure for:
// - Server listening address/port
// - Persistent cache database
// - Source endpoints (tx service, RPC node, explorer) and their timeouts
// - Paging, preloading and cache settings (size, TTL)

use dotenv::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::ExplorerSettings;
use crate::cache::TierSettings;
use crate::service::HistorySettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub tx_service_url: Option<String>,
    pub rpc_url: Option<String>,
    pub explorer_url: Option<String>,
    pub explorer_api_key: Option<String>,
    pub explorer_rate_limit: u32,
    pub page_size: u64,
    pub preload_pages: u32,
    pub ephemeral_ttl: Duration,
    pub persistent_ttl: Duration,
    pub ephemeral_capacity: u64,
    pub cleanup_interval: Duration,
    pub tx_service_timeout: Duration,
    pub rpc_timeout: Duration,
    pub explorer_timeout: Duration,
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(parsed(key, default))
}

// Unset or blank means the source is left out of the chain
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://cache.db".to_string());
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = parsed("SERVER_PORT", 8080);

        Self {
            database_url,
            server_host,
            server_port,
            tx_service_url: optional("TX_SERVICE_URL"),
            rpc_url: optional("RPC_URL"),
            explorer_url: optional("EXPLORER_URL"),
            explorer_api_key: optional("EXPLORER_API_KEY"),
            explorer_rate_limit: parsed("EXPLORER_RATE_LIMIT", 5),
            page_size: parsed("PAGE_SIZE", 20),
            preload_pages: parsed("PRELOAD_PAGES", 2),
            ephemeral_ttl: secs("EPHEMERAL_TTL_SECS", 300),
            persistent_ttl: secs("PERSISTENT_TTL_SECS", 1800),
            ephemeral_capacity: parsed("EPHEMERAL_CAPACITY", 1000),
            cleanup_interval: secs("CLEANUP_INTERVAL_SECS", 60),
            tx_service_timeout: secs("TX_SERVICE_TIMEOUT_SECS", 10),
            rpc_timeout: secs("RPC_TIMEOUT_SECS", 10),
            explorer_timeout: secs("EXPLORER_TIMEOUT_SECS", 8),
        }
    }

    pub fn tier_settings(&self) -> TierSettings {
        TierSettings {
            ephemeral_ttl: self.ephemeral_ttl,
            persistent_ttl: self.persistent_ttl,
            ephemeral_capacity: self.ephemeral_capacity,
        }
    }

    pub fn history_settings(&self) -> HistorySettings {
        HistorySettings {
            page_size: self.page_size.max(1),
            preload_pages: self.preload_pages,
        }
    }

    pub fn explorer_settings(&self) -> ExplorerSettings {
        ExplorerSettings {
            requests_per_second: self.explorer_rate_limit.max(1),
            timeout: self.explorer_timeout,
            ..ExplorerSettings::default()
        }
    }
}
