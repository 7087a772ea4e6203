//! End-to-end tests for the progressive delivery pipeline against the
//! in-memory cache and object store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware as actix_middleware, test, web, App};
use async_trait::async_trait;
use delivery_service::handlers::{self, AppState};
use delivery_service::services::{
    BatchSigner, DeliveryEngine, ManifestIdentity, MemoryObjectStore, SignedUrlResolver,
};
use edge_cache::{CacheStore, MemoryCache, DEFAULT_WINDOW_SECS};
use futures::StreamExt;
use url_signing::{SignError, SignedUrl, SigningCredentials, UrlSigner};

const HEAD_SIZE: usize = 5;

fn media_playlist(segments: usize, end_list: bool) -> String {
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n");
    for index in 0..segments {
        text.push_str(&format!("#EXTINF:6.000000,\nsegment_{index:03}.ts\n"));
    }
    if end_list {
        text.push_str("#EXT-X-ENDLIST\n");
    }
    text
}

fn test_signer() -> Arc<UrlSigner> {
    let credentials = SigningCredentials::from_parts(
        Some("AKIDEXAMPLE".to_string()),
        Some("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string()),
        Some("auto".to_string()),
        Some("media-bucket".to_string()),
        Some("f00dfeed".to_string()),
    )
    .unwrap();
    Arc::new(UrlSigner::new(credentials, 21_600))
}

fn build_engine(
    cache: Arc<dyn CacheStore>,
    signer: Option<Arc<dyn BatchSigner>>,
) -> Arc<DeliveryEngine> {
    let resolver = Arc::new(SignedUrlResolver::new(
        cache.clone(),
        signer,
        "https://media.example.com".to_string(),
        DEFAULT_WINDOW_SECS,
        Duration::from_millis(500),
    ));
    Arc::new(DeliveryEngine::new(
        resolver,
        cache,
        HEAD_SIZE,
        DEFAULT_WINDOW_SECS,
    ))
}

fn identity() -> ManifestIdentity {
    ManifestIdentity {
        video_key: "abc123".to_string(),
        filename: "720p.m3u8".to_string(),
    }
}

async fn collect_chunks(
    mut stream: delivery_service::services::ManifestStream,
) -> Vec<String> {
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(String::from_utf8(chunk.unwrap().to_vec()).unwrap());
    }
    chunks
}

#[tokio::test]
async fn first_chunk_holds_exactly_the_head() {
    let engine = build_engine(Arc::new(MemoryCache::new()), Some(test_signer()));
    let raw = media_playlist(20, true);

    let stream = engine
        .resolve_manifest_stream(&raw, &identity())
        .await
        .unwrap();
    let chunks = collect_chunks(stream).await;

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].matches("#EXTINF").count(), 5);
    assert!(chunks[0].contains("segment_004.ts"));
    assert!(!chunks[0].contains("segment_005.ts"));
    assert!(chunks[0].contains("X-Amz-Signature="));

    let full = chunks.concat();
    assert_eq!(full.matches("#EXTINF").count(), 20);
    assert!(full.trim_end().ends_with("#EXT-X-ENDLIST"));

    // Original source order survives the concurrent tail resolution.
    let positions: Vec<usize> = (0..20)
        .map(|i| full.find(&format!("segment_{i:03}.ts")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn short_playlist_resolves_in_one_chunk() {
    let engine = build_engine(Arc::new(MemoryCache::new()), Some(test_signer()));
    let raw = media_playlist(3, true);

    let stream = engine
        .resolve_manifest_stream(&raw, &identity())
        .await
        .unwrap();
    let chunks = collect_chunks(stream).await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].matches("#EXTINF").count(), 3);
}

#[tokio::test]
async fn second_request_in_window_is_byte_identical() {
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
    let engine = build_engine(cache, Some(test_signer()));
    let raw = media_playlist(20, true);

    let stream = engine
        .resolve_manifest_stream(&raw, &identity())
        .await
        .unwrap();
    let full = collect_chunks(stream).await.concat();

    let cached = engine.cached_manifest(&identity()).await;
    assert_eq!(cached.as_deref(), Some(full.as_str()));
}

#[tokio::test]
async fn buffered_and_streaming_paths_agree() {
    let raw = media_playlist(20, true);

    let buffered_engine = build_engine(Arc::new(MemoryCache::new()), Some(test_signer()));
    let buffered = buffered_engine
        .resolve_manifest(&raw, &identity())
        .await
        .unwrap();

    let streaming_engine = build_engine(Arc::new(MemoryCache::new()), Some(test_signer()));
    let stream = streaming_engine
        .resolve_manifest_stream(&raw, &identity())
        .await
        .unwrap();
    let streamed = collect_chunks(stream).await.concat();

    // Both paths sign at their own instant but within one time window,
    // so the structure must agree line for line.
    assert_eq!(buffered.lines().count(), streamed.lines().count());
    for (a, b) in buffered.lines().zip(streamed.lines()) {
        if a.starts_with('#') {
            assert_eq!(a, b);
        }
    }
}

#[tokio::test]
async fn in_progress_playlist_keeps_missing_end_marker() {
    let engine = build_engine(Arc::new(MemoryCache::new()), Some(test_signer()));
    let raw = media_playlist(20, false);

    let stream = engine
        .resolve_manifest_stream(&raw, &identity())
        .await
        .unwrap();
    let full = collect_chunks(stream).await.concat();

    assert_eq!(full.matches("#EXTINF").count(), 20);
    assert!(!full.contains("#EXT-X-ENDLIST"));
}

#[tokio::test]
async fn unparseable_manifest_produces_no_output() {
    let engine = build_engine(Arc::new(MemoryCache::new()), Some(test_signer()));

    let result = engine
        .resolve_manifest_stream("#EXTM3U\n#EXT-X-VERSION:3\n", &identity())
        .await;
    assert!(result.is_err());
}

/// Succeeds on the first (head) batch, rejects every later one.
struct HeadOnlySigner {
    delegate: Arc<UrlSigner>,
    calls: AtomicUsize,
}

#[async_trait]
impl BatchSigner for HeadOnlySigner {
    async fn sign_batch(&self, keys: &[&str]) -> Result<Vec<SignedUrl>, SignError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            UrlSigner::sign_batch(self.delegate.as_ref(), keys)
        } else {
            Err(SignError::Backend("simulated backend outage".to_string()))
        }
    }
}

#[tokio::test]
async fn tail_failure_truncates_instead_of_corrupting() {
    let signer = Arc::new(HeadOnlySigner {
        delegate: test_signer(),
        calls: AtomicUsize::new(0),
    });
    let engine = build_engine(Arc::new(MemoryCache::new()), Some(signer));
    let raw = media_playlist(20, true);

    let stream = engine
        .resolve_manifest_stream(&raw, &identity())
        .await
        .unwrap();
    let chunks = collect_chunks(stream).await;

    // Head went out, then the stream ended without malformed entries.
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].matches("#EXTINF").count(), 5);
    assert!(!chunks.concat().contains("#EXT-X-ENDLIST"));
}

#[tokio::test]
async fn client_disconnect_still_populates_the_cache() {
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
    let engine = build_engine(cache, Some(test_signer()));
    let raw = media_playlist(20, true);

    let mut stream = engine
        .resolve_manifest_stream(&raw, &identity())
        .await
        .unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert!(!first.is_empty());

    // Receiver gone after the first chunk, as when a player disconnects.
    drop(stream);

    // The producer finishes its cache write regardless; wait it out.
    let mut cached = None;
    for _ in 0..100 {
        if let Some(text) = engine.cached_manifest(&identity()).await {
            cached = Some(text);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let cached = cached.expect("manifest cache not populated after disconnect");
    assert_eq!(cached.matches("#EXTINF").count(), 20);
    assert!(cached.trim_end().ends_with("#EXT-X-ENDLIST"));
}

#[tokio::test]
async fn missing_credentials_fall_back_to_unsigned_delivery() {
    let engine = build_engine(Arc::new(MemoryCache::new()), None);
    let raw = media_playlist(8, true);

    let text = engine.resolve_manifest(&raw, &identity()).await.unwrap();

    assert_eq!(text.matches("#EXTINF").count(), 8);
    assert!(text.contains("https://media.example.com/videos/abc123/segment_000.ts"));
    assert!(!text.contains("X-Amz-Signature"));
}

#[tokio::test]
async fn master_playlist_preserves_variant_attributes() {
    let engine = build_engine(Arc::new(MemoryCache::new()), Some(test_signer()));
    let raw = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n\
        360p.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720\n\
        720p.m3u8\n";

    let master_identity = ManifestIdentity {
        video_key: "abc123".to_string(),
        filename: "index.m3u8".to_string(),
    };
    let text = engine
        .resolve_manifest(raw, &master_identity)
        .await
        .unwrap();

    assert!(text.contains("BANDWIDTH=800000,RESOLUTION=640x360"));
    assert!(text.contains("BANDWIDTH=2800000,RESOLUTION=1280x720"));
    assert_eq!(text.matches("#EXT-X-STREAM-INF").count(), 2);
    assert!(text.contains("X-Amz-Signature="));
}

fn app_state(raw: &str) -> web::Data<AppState> {
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
    let engine = build_engine(cache, Some(test_signer()));

    let mut store = MemoryObjectStore::new();
    store.insert("videos/abc123/720p.m3u8", raw);

    web::Data::new(AppState {
        engine,
        store: Arc::new(store),
        window_secs: DEFAULT_WINDOW_SECS,
    })
}

#[actix_web::test]
async fn manifest_endpoint_streams_resolved_playlist() {
    let raw = media_playlist(20, true);
    let app = test::init_service(
        App::new()
            .app_data(app_state(&raw))
            .wrap(actix_middleware::Logger::default())
            .route(
                "/videos/{video_key}/{filename}",
                web::get().to(handlers::get_variant_manifest),
            ),
    )
    .await;

    let request = test::TestRequest::get()
        .uri("/videos/abc123/720p.m3u8")
        .to_request();
    let response = test::call_service(&app, request).await;

    assert!(response.status().is_success());
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert_eq!(content_type, "application/vnd.apple.mpegurl");
    assert!(response.headers().contains_key("cache-control"));

    let body = String::from_utf8(test::read_body(response).await.to_vec()).unwrap();
    assert_eq!(body.matches("#EXTINF").count(), 20);
    assert!(body.contains("X-Amz-Signature="));
}

#[actix_web::test]
async fn absent_manifest_is_a_clean_404() {
    let raw = media_playlist(4, true);
    let app = test::init_service(App::new().app_data(app_state(&raw)).route(
        "/videos/{video_key}/{filename}",
        web::get().to(handlers::get_variant_manifest),
    ))
    .await;

    let request = test::TestRequest::get()
        .uri("/videos/nope/1080p.m3u8")
        .to_request();
    let response = test::call_service(&app, request).await;

    assert_eq!(response.status().as_u16(), 404);
}
