/// HTTP handlers
mod manifests;

pub use manifests::{get_variant_manifest, AppState};
