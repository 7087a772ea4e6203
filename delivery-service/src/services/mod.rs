//! Service layer
//!
//! - **storage.rs** - object store access (fetch raw manifests)
//! - **resolver.rs** - batched sign-or-cache resolution of storage keys
//! - **delivery.rs** - progressive manifest delivery engine

pub mod delivery;
pub mod resolver;
pub mod storage;

pub use delivery::{DeliveryEngine, ManifestIdentity, ManifestStream};
pub use resolver::{BatchSigner, SignedUrlResolver};
pub use storage::{MemoryObjectStore, ObjectStore, S3ObjectStore};
