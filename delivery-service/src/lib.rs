//! Delivery Service
//!
//! Resolves adaptive-bitrate manifests into signed form and streams them
//! from the edge; media bytes are never proxied through this service.

pub mod config;
pub mod error;
pub mod handlers;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
