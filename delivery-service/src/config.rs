/// Configuration management for delivery-service
///
/// Loads configuration from environment variables with sensible defaults.
use edge_cache::DEFAULT_WINDOW_SECS;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CacheConfig {
    /// Unset or empty REDIS_URL drops back to the in-process cache.
    pub redis_url: Option<String>,
    pub window_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub account_id: Option<String>,
    /// Explicit endpoint override (S3-compatible storage); otherwise
    /// derived from the account id.
    pub endpoint: Option<String>,
    /// Base URL used for unsigned fallback delivery.
    pub public_base_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DeliveryConfig {
    /// Segments resolved synchronously before the first byte.
    pub head_size: usize,
    pub signer_ttl_secs: u64,
    /// Bound on one batched sign-or-cache round trip.
    pub sign_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config {
            app: AppConfig {
                host: std::env::var("DELIVERY_SERVICE_HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("DELIVERY_SERVICE_PORT")
                    .unwrap_or_else(|_| "8086".to_string())
                    .parse()
                    .unwrap_or(8086),
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            },
            cache: CacheConfig {
                redis_url: std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
                window_secs: std::env::var("CACHE_WINDOW_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_WINDOW_SECS),
            },
            storage: StorageConfig {
                bucket: std::env::var("STORAGE_BUCKET")
                    .unwrap_or_else(|_| "media-objects".to_string()),
                region: std::env::var("STORAGE_REGION").ok(),
                access_key_id: std::env::var("STORAGE_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("STORAGE_SECRET_ACCESS_KEY").ok(),
                account_id: std::env::var("STORAGE_ACCOUNT_ID").ok(),
                endpoint: std::env::var("STORAGE_ENDPOINT").ok(),
                public_base_url: std::env::var("PUBLIC_BASE_URL")
                    .unwrap_or_else(|_| "https://media.example.com".to_string()),
            },
            delivery: DeliveryConfig {
                head_size: std::env::var("DELIVERY_HEAD_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
                signer_ttl_secs: std::env::var("SIGNER_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(21_600),
                sign_timeout_ms: std::env::var("SIGN_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2_000),
            },
        };

        // The window quantizes wall-clock time; zero would divide by it.
        if config.cache.window_secs == 0 {
            return Err("CACHE_WINDOW_SECS must be positive".into());
        }

        // A cached signed URL must never be returned already expired
        // relative to the window that cached it.
        if config.delivery.signer_ttl_secs < config.cache.window_secs {
            return Err(format!(
                "SIGNER_TTL_SECS ({}) must be >= CACHE_WINDOW_SECS ({})",
                config.delivery.signer_ttl_secs, config.cache.window_secs
            )
            .into());
        }

        Ok(config)
    }
}
