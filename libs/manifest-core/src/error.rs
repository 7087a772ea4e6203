//! Playlist parse error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    /// Text contains neither variant-stream entries nor segment entries.
    #[error("playlist contains no variant or segment entries")]
    UnrecognizedShape,

    #[error("malformed playlist tag: {0}")]
    MalformedTag(String),
}
