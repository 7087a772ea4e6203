/// Manifest resolution endpoint
///
/// Hands the player a fully-resolved playlist whose entries point
/// straight at the object store; segment bytes never transit here.
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use edge_cache::keys;
use manifest_core::MANIFEST_CONTENT_TYPE;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::services::{DeliveryEngine, ManifestIdentity, ObjectStore};

pub struct AppState {
    pub engine: Arc<DeliveryEngine>,
    pub store: Arc<dyn ObjectStore>,
    pub window_secs: u64,
}

/// Resolve one variant playlist into signed form.
pub async fn get_variant_manifest(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (video_key, filename) = path.into_inner();
    let identity = ManifestIdentity {
        video_key,
        filename,
    };

    // Responses must not outlive the signing window they were built in.
    let cache_control = format!(
        "public, max-age={}",
        keys::window_remaining_secs(state.window_secs)
    );

    if let Some(text) = state.engine.cached_manifest(&identity).await {
        debug!(video_key = %identity.video_key, filename = %identity.filename, "manifest cache hit");
        return Ok(HttpResponse::Ok()
            .content_type(MANIFEST_CONTENT_TYPE)
            .insert_header(("Cache-Control", cache_control))
            .body(text));
    }

    let storage_key = format!("videos/{}/{}", identity.video_key, identity.filename);
    let raw_bytes = state
        .store
        .get(&storage_key)
        .await?
        .ok_or_else(|| AppError::StorageMiss(format!("manifest not found: {storage_key}")))?;
    let raw_text = String::from_utf8(raw_bytes.to_vec())
        .map_err(|_| AppError::Parse("manifest is not valid UTF-8".to_string()))?;

    let stream = state
        .engine
        .resolve_manifest_stream(&raw_text, &identity)
        .await?;

    Ok(HttpResponse::Ok()
        .content_type(MANIFEST_CONTENT_TYPE)
        .insert_header(("Cache-Control", cache_control))
        .streaming(stream))
}
