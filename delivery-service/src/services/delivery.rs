/// Progressive manifest delivery engine
///
/// Minimizes time-to-first-byte for media playlists with many segments:
/// the head is resolved synchronously and emitted immediately while the
/// tail resolves concurrently through one batched sign-or-cache call.
/// Output order always equals source order.
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use edge_cache::{keys, CacheKey, CacheStore};
use futures::Stream;
use manifest_core::{segment_entry, Manifest, Segment, END_LIST_TAG};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::services::resolver::SignedUrlResolver;

/// Identity of one requested manifest, used for cache keying and for
/// anchoring relative segment uris in the object store.
#[derive(Debug, Clone)]
pub struct ManifestIdentity {
    pub video_key: String,
    pub filename: String,
}

impl ManifestIdentity {
    pub fn storage_key(&self, uri: &str) -> String {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            uri.to_string()
        } else {
            format!("videos/{}/{}", self.video_key, uri)
        }
    }

    fn manifest_cache_key(&self, window: u64) -> String {
        CacheKey::variant_manifest(&self.video_key, &self.filename, window)
    }
}

pub struct DeliveryEngine {
    resolver: Arc<SignedUrlResolver>,
    cache: Arc<dyn CacheStore>,
    head_size: usize,
    window_secs: u64,
}

impl DeliveryEngine {
    pub fn new(
        resolver: Arc<SignedUrlResolver>,
        cache: Arc<dyn CacheStore>,
        head_size: usize,
        window_secs: u64,
    ) -> Self {
        Self {
            resolver,
            cache,
            head_size,
            window_secs,
        }
    }

    /// Rewritten text for this identity, when already cached this window.
    pub async fn cached_manifest(&self, identity: &ManifestIdentity) -> Option<String> {
        let key = identity.manifest_cache_key(keys::now_window(self.window_secs));
        match self.cache.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "manifest cache lookup failed");
                None
            }
        }
    }

    /// Fully-synchronous resolution: every uri is signed before any byte
    /// is produced. Same output as the streaming path, worse latency.
    pub async fn resolve_manifest(
        &self,
        raw_text: &str,
        identity: &ManifestIdentity,
    ) -> Result<String> {
        let manifest = Manifest::parse(raw_text)?;
        let storage_keys: Vec<String> = manifest
            .uris()
            .iter()
            .map(|uri| identity.storage_key(uri))
            .collect();
        let resolved = self.resolver.resolve(&storage_keys).await?;
        let text = manifest.rewrite(resolved).render();
        self.store_manifest(identity, &text).await;
        Ok(text)
    }

    /// Progressive resolution: a lazy, finite, non-restartable sequence
    /// of text chunks. The first chunk carries the header and the signed
    /// head; the tail follows once its batch resolves. A tail failure
    /// after the head was sent terminates the stream rather than emit
    /// malformed entries.
    pub async fn resolve_manifest_stream(
        &self,
        raw_text: &str,
        identity: &ManifestIdentity,
    ) -> Result<ManifestStream> {
        let manifest = Manifest::parse(raw_text)?;

        let media = match manifest {
            Manifest::Media(media) if media.segments.len() > self.head_size => media,
            // Master playlists and short media playlists reduce to the
            // fully-synchronous single-chunk path.
            other => {
                let text = self.resolve_parsed(other, identity).await?;
                return Ok(ManifestStream::single(text));
            }
        };

        let (head, tail) = media.segments.split_at(self.head_size);

        // Head must complete before the first byte goes out.
        let head_keys: Vec<String> = head
            .iter()
            .map(|segment| identity.storage_key(&segment.uri))
            .collect();
        let head_urls = self.resolver.resolve(&head_keys).await?;

        let mut first_chunk = media.header();
        for (segment, url) in head.iter().zip(&head_urls) {
            first_chunk.push_str(&segment_entry(segment.duration, url));
        }

        let tail_keys: Vec<String> = tail
            .iter()
            .map(|segment| identity.storage_key(&segment.uri))
            .collect();
        let tail_segments: Vec<Segment> = tail.to_vec();

        let (tx, rx) = mpsc::channel::<Bytes>(1);
        tokio::spawn(resolve_tail(
            self.resolver.clone(),
            self.cache.clone(),
            identity.clone(),
            self.window_secs,
            first_chunk.clone(),
            tail_segments,
            tail_keys,
            media.end_list,
            tx,
        ));

        Ok(ManifestStream::with_tail(first_chunk, rx))
    }

    async fn resolve_parsed(&self, manifest: Manifest, identity: &ManifestIdentity) -> Result<String> {
        let storage_keys: Vec<String> = manifest
            .uris()
            .iter()
            .map(|uri| identity.storage_key(uri))
            .collect();
        let resolved = self.resolver.resolve(&storage_keys).await?;
        let text = manifest.rewrite(resolved).render();
        self.store_manifest(identity, &text).await;
        Ok(text)
    }

    async fn store_manifest(&self, identity: &ManifestIdentity, text: &str) {
        let key = identity.manifest_cache_key(keys::now_window(self.window_secs));
        let ttl = keys::window_remaining_secs(self.window_secs);
        if let Err(e) = self.cache.put(&key, text, ttl).await {
            warn!(error = %e, "failed to store rewritten manifest");
        }
    }
}

/// Producer half of the progressive stream: resolves the tail while the
/// head chunk is already in flight, then emits it in source order.
#[allow(clippy::too_many_arguments)]
async fn resolve_tail(
    resolver: Arc<SignedUrlResolver>,
    cache: Arc<dyn CacheStore>,
    identity: ManifestIdentity,
    window_secs: u64,
    head_text: String,
    tail_segments: Vec<Segment>,
    tail_keys: Vec<String>,
    end_list: bool,
    tx: mpsc::Sender<Bytes>,
) {
    let tail_urls = match resolver.resolve(&tail_keys).await {
        Ok(urls) => urls,
        Err(e) => {
            // The head is already on the wire and cannot be retracted;
            // end the stream instead of emitting malformed entries.
            warn!(error = %e, video_key = %identity.video_key, "tail resolution failed; truncating stream");
            return;
        }
    };

    let mut tail_text = String::new();
    for (segment, url) in tail_segments.iter().zip(&tail_urls) {
        tail_text.push_str(&segment_entry(segment.duration, url));
    }
    if end_list {
        tail_text.push_str(END_LIST_TAG);
    }

    let total_bytes = head_text.len() + tail_text.len();
    if tx.send(Bytes::from(tail_text.clone())).await.is_err() {
        // Receiver dropped: the client disconnected mid-stream. The
        // computed result still populates the cache for later requests.
        debug!(video_key = %identity.video_key, "client disconnected before tail delivery");
    } else {
        debug!(
            video_key = %identity.video_key,
            segments = tail_segments.len(),
            bytes = total_bytes,
            "manifest stream complete"
        );
    }

    let full_text = head_text + &tail_text;
    let key = CacheKey::variant_manifest(
        &identity.video_key,
        &identity.filename,
        keys::now_window(window_secs),
    );
    let ttl = keys::window_remaining_secs(window_secs);
    if let Err(e) = cache.put(&key, &full_text, ttl).await {
        warn!(error = %e, "failed to store rewritten manifest");
    }
}

/// Lazy, finite, non-restartable sequence of manifest text chunks.
pub struct ManifestStream {
    pending: VecDeque<Bytes>,
    tail: Option<mpsc::Receiver<Bytes>>,
}

impl ManifestStream {
    fn single(text: String) -> Self {
        Self {
            pending: VecDeque::from([Bytes::from(text)]),
            tail: None,
        }
    }

    fn with_tail(first_chunk: String, rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            pending: VecDeque::from([Bytes::from(first_chunk)]),
            tail: Some(rx),
        }
    }
}

impl Stream for ManifestStream {
    type Item = std::result::Result<Bytes, AppError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(chunk) = self.pending.pop_front() {
            return Poll::Ready(Some(Ok(chunk)));
        }
        match &mut self.tail {
            None => Poll::Ready(None),
            Some(rx) => rx.poll_recv(cx).map(|chunk| chunk.map(Ok)),
        }
    }
}

// Tests for the full engine live in tests/delivery_pipeline.rs; the
// module-level tests below pin the split arithmetic.
#[cfg(test)]
mod tests {
    use super::*;
    use manifest_core::MediaPlaylist;

    #[test]
    fn test_storage_key_anchors_relative_uris() {
        let identity = ManifestIdentity {
            video_key: "abc123".to_string(),
            filename: "720p.m3u8".to_string(),
        };
        assert_eq!(
            identity.storage_key("segment_000.ts"),
            "videos/abc123/segment_000.ts"
        );
        assert_eq!(
            identity.storage_key("https://other.example.com/ad.ts"),
            "https://other.example.com/ad.ts"
        );
    }

    #[test]
    fn test_media_split_preserves_counts() {
        let segments: Vec<Segment> = (0..20)
            .map(|i| Segment {
                uri: format!("seg_{i:03}.ts"),
                duration: 6.0,
                sequence: i,
            })
            .collect();
        let media = MediaPlaylist {
            version: 3,
            target_duration: 6,
            media_sequence: Some(0),
            segments,
            end_list: true,
        };

        let (head, tail) = media.segments.split_at(5);
        assert_eq!(head.len(), 5);
        assert_eq!(tail.len(), 15);
        assert_eq!(head[4].uri, "seg_004.ts");
        assert_eq!(tail[0].uri, "seg_005.ts");
    }
}
