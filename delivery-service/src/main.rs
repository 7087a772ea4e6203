/// Delivery Service - HTTP Server
///
/// Resolves adaptive-bitrate manifests into time-limited signed form and
/// streams them progressively from the edge.
use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware as actix_middleware, web, App, HttpResponse, HttpServer};
use delivery_service::handlers::{self, AppState};
use delivery_service::services::{
    BatchSigner, DeliveryEngine, ObjectStore, S3ObjectStore, SignedUrlResolver,
};
use delivery_service::Config;
use edge_cache::{CacheStore, MemoryCache, RedisCache};
use url_signing::{SigningCredentials, UrlSigner};

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{e}")))?;

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!(env = %config.app.env, "Delivery Service starting HTTP server on {}", bind_address);

    let cache: Arc<dyn CacheStore> = match &config.cache.redis_url {
        Some(redis_url) => {
            let redis_cache = RedisCache::connect(redis_url).await.map_err(|e| {
                io::Error::new(io::ErrorKind::Other, format!("Failed to initialize cache: {e}"))
            })?;
            Arc::new(redis_cache)
        }
        None => {
            tracing::warn!("REDIS_URL not set; using in-process cache, requests will not converge across instances");
            Arc::new(MemoryCache::new())
        }
    };

    let signer: Option<Arc<dyn BatchSigner>> = match SigningCredentials::from_parts(
        config.storage.access_key_id.clone(),
        config.storage.secret_access_key.clone(),
        config.storage.region.clone(),
        Some(config.storage.bucket.clone()),
        config.storage.account_id.clone(),
    ) {
        Ok(credentials) => Some(Arc::new(UrlSigner::new(
            credentials,
            config.delivery.signer_ttl_secs,
        ))),
        Err(e) => {
            tracing::warn!("{e}; serving unsigned urls");
            None
        }
    };

    let store: Arc<dyn ObjectStore> = Arc::new(
        S3ObjectStore::connect(&config.storage)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{e}")))?,
    );

    let resolver = Arc::new(SignedUrlResolver::new(
        cache.clone(),
        signer,
        config.storage.public_base_url.clone(),
        config.cache.window_secs,
        Duration::from_millis(config.delivery.sign_timeout_ms),
    ));
    let engine = Arc::new(DeliveryEngine::new(
        resolver,
        cache.clone(),
        config.delivery.head_size,
        config.cache.window_secs,
    ));

    let state = web::Data::new(AppState {
        engine,
        store,
        window_secs: config.cache.window_secs,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(actix_middleware::Logger::default())
            .route(
                "/api/v1/health",
                web::get()
                    .to(|| async { HttpResponse::Ok().json(serde_json::json!({"status": "ok"})) }),
            )
            .route(
                "/api/v1/health/ready",
                web::get().to(|| async { HttpResponse::Ok().finish() }),
            )
            .route(
                "/api/v1/health/live",
                web::get().to(|| async { HttpResponse::Ok().finish() }),
            )
            .route(
                "/videos/{video_key}/{filename}",
                web::get().to(handlers::get_variant_manifest),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
