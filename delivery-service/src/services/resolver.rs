/// Batched sign-or-cache resolution of storage keys
///
/// Resolving N keys partitions them into cached and uncached, issues at
/// most ONE batched sign call for all misses, writes each result back
/// individually, and recombines everything positionally. Completion
/// order never influences output order.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use edge_cache::{keys, CacheKey, CacheStore};
use tracing::warn;
use url_signing::{SignError, SignedUrl, UrlSigner};

use crate::error::{AppError, Result};

/// Seam for the signing backend, mockable under test.
#[async_trait]
pub trait BatchSigner: Send + Sync {
    async fn sign_batch(&self, keys: &[&str]) -> std::result::Result<Vec<SignedUrl>, SignError>;
}

#[async_trait]
impl BatchSigner for UrlSigner {
    async fn sign_batch(&self, keys: &[&str]) -> std::result::Result<Vec<SignedUrl>, SignError> {
        UrlSigner::sign_batch(self, keys)
    }
}

pub struct SignedUrlResolver {
    cache: Arc<dyn CacheStore>,
    signer: Option<Arc<dyn BatchSigner>>,
    public_base_url: String,
    window_secs: u64,
    sign_timeout: Duration,
}

impl SignedUrlResolver {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        signer: Option<Arc<dyn BatchSigner>>,
        public_base_url: String,
        window_secs: u64,
        sign_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            signer,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            window_secs,
            sign_timeout,
        }
    }

    /// Resolve storage keys to delivery URLs, in input order.
    ///
    /// Absolute URLs pass through untouched. Keys already signed within
    /// the current time window are served from the cache; the remainder
    /// is signed in one batch and written back individually.
    pub async fn resolve(&self, storage_keys: &[String]) -> Result<Vec<String>> {
        let Some(signer) = &self.signer else {
            return Ok(storage_keys.iter().map(|k| self.unsigned_url(k)).collect());
        };

        let window = keys::now_window(self.window_secs);
        let mut resolved: Vec<Option<String>> = vec![None; storage_keys.len()];

        let mut lookup_indices: Vec<usize> = Vec::new();
        let mut cache_keys: Vec<String> = Vec::new();
        for (index, key) in storage_keys.iter().enumerate() {
            if is_absolute(key) {
                resolved[index] = Some(key.clone());
            } else {
                lookup_indices.push(index);
                cache_keys.push(CacheKey::signed_url(key, window));
            }
        }

        // A cache outage degrades to signing everything, never to failure.
        let cached = match self.cache.get_many(&cache_keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "signature cache lookup failed; signing full batch");
                vec![None; cache_keys.len()]
            }
        };

        let mut miss_indices: Vec<usize> = Vec::new();
        for (slot, value) in lookup_indices.iter().zip(cached) {
            match value {
                Some(url) => resolved[*slot] = Some(url),
                None => miss_indices.push(*slot),
            }
        }

        if !miss_indices.is_empty() {
            let miss_keys: Vec<&str> = miss_indices
                .iter()
                .map(|index| storage_keys[*index].as_str())
                .collect();

            match self.sign_with_retry(signer.as_ref(), &miss_keys).await? {
                Some(signed) => {
                    let entries: Vec<(String, String)> = signed
                        .iter()
                        .map(|s| {
                            (
                                CacheKey::signed_url(&s.storage_key, window),
                                s.url.clone(),
                            )
                        })
                        .collect();
                    // Keys carry the window index; the TTL runs to the
                    // end of the current window, not a full window.
                    let ttl = keys::window_remaining_secs(self.window_secs);
                    if let Err(e) = self.cache.put_many(&entries, ttl).await {
                        warn!(error = %e, "failed to store signed urls");
                    }
                    for (slot, signed_url) in miss_indices.iter().zip(signed) {
                        resolved[*slot] = Some(signed_url.url);
                    }
                }
                // Signing became unavailable; deliver the misses unsigned.
                None => {
                    for slot in miss_indices {
                        resolved[slot] = Some(self.unsigned_url(&storage_keys[slot]));
                    }
                }
            }
        }

        Ok(resolved.into_iter().flatten().collect())
    }

    /// One bounded signing attempt, retried once with backoff on timeout.
    ///
    /// `Ok(None)` means signing is unavailable for this request and the
    /// caller must fall back to unsigned delivery; a backend rejection
    /// remains a hard `SigningFailure`.
    async fn sign_with_retry(
        &self,
        signer: &dyn BatchSigner,
        keys: &[&str],
    ) -> Result<Option<Vec<SignedUrl>>> {
        for attempt in 0..2 {
            match tokio::time::timeout(self.sign_timeout, signer.sign_batch(keys)).await {
                Ok(Ok(signed)) => return Ok(Some(signed)),
                Ok(Err(SignError::MissingCredentials(field))) => {
                    warn!(field, "credentials incomplete; falling back to unsigned urls");
                    return Ok(None);
                }
                Ok(Err(SignError::Backend(message))) => {
                    return Err(AppError::SigningFailure(message));
                }
                Err(_) => {
                    warn!(attempt, timeout_ms = self.sign_timeout.as_millis() as u64,
                        "signing timed out");
                    if attempt == 0 {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
        warn!("signing timed out after retry; falling back to unsigned urls");
        Ok(None)
    }

    fn unsigned_url(&self, key: &str) -> String {
        if is_absolute(key) {
            key.to_string()
        } else {
            format!("{}/{}", self.public_base_url, key)
        }
    }
}

fn is_absolute(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}
