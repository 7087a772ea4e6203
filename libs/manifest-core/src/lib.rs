//! HLS playlist parsing and rewriting
//!
//! Parses the M3U8 text dialect into a structured form and re-serializes
//! it with substituted resource references. Rewriting never reorders,
//! adds, or drops entries; only uri fields change.

mod error;
mod playlist;

pub use error::ParseError;
pub use playlist::{
    segment_entry, Manifest, MasterPlaylist, MediaPlaylist, Resolution, Segment, VariantRef,
    END_LIST_TAG,
};

/// Content type served for all resolved playlists.
pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
