//! High-level API for the Depot storage layer.
//!
//! [`Depot`] ties together the checksum-addressed [`BinaryStore`], the shared
//! [`PathLockRegistry`] and an [`ItemRepository`] holding path metadata. It
//! hands out [`Session`]s for lock-scoped work and offers deploy, download
//! and delete helpers built on them.

pub mod depot;
pub mod error;

pub use depot::Depot;
pub use error::{SdkError, SdkResult};

// Re-export the types callers need alongside the context.
pub use depot_binstore::{BinaryStore, BinaryStoreConfig, BinaryStream, ProviderKind, StorageMode};
pub use depot_session::{
    ItemInfo, ItemRepository, ItemSnapshot, MutableItem, PathLockRegistry, Session,
    SessionLockManager,
};
pub use depot_types::{BinaryRecord, RepoPath, Sha1};
