//! Time-windowed cache key schema
//!
//! Keys carry a coarse time window instead of an exact timestamp, so all
//! logically-identical requests inside one window converge on a single
//! cached value. Formats here must match exactly across every process
//! sharing the cache store.

use std::time::{SystemTime, UNIX_EPOCH};

/// Default quantization window: 4 hours.
pub const DEFAULT_WINDOW_SECS: u64 = 14_400;

/// Window index for a wall-clock timestamp.
pub fn time_window(unix_seconds: u64, window_secs: u64) -> u64 {
    unix_seconds / window_secs
}

/// Window index for the current wall clock.
pub fn now_window(window_secs: u64) -> u64 {
    time_window(now_unix(), window_secs)
}

/// Seconds left until the current window rolls over.
pub fn window_remaining_secs(window_secs: u64) -> u64 {
    window_secs - now_unix() % window_secs
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Fully rewritten variant manifest text.
    /// Format: manifest:variant:{video_key}:{filename}:{window}
    pub fn variant_manifest(video_key: &str, filename: &str, window: u64) -> String {
        format!("manifest:variant:{}:{}:{}", video_key, filename, window)
    }

    /// One signed URL for one storage key.
    /// Format: signed:url:{storage_key}:{window}
    pub fn signed_url(storage_key: &str, window: u64) -> String {
        format!("signed:url:{}:{}", storage_key, window)
    }
}
