//! Checksum-addressed binary storage for Depot.
//!
//! Binary content is stored once per SHA-1 no matter how many repository
//! paths refer to it. Storage is a chain of providers, each owning the next:
//!
//! ```text
//! usage-tracking -> [cache-fs] -> [retry] -> file-system | blob -> empty
//! ```
//!
//! # Providers
//!
//! - [`FileProvider`] -- sharded directory of files, authoritative
//! - [`FileCacheProvider`] -- bounded LRU copy in front of the next link
//! - [`BlobProvider`] -- rows in a SQLite table, authoritative
//! - [`RetryProvider`] -- re-attempts transient failures of the next link
//! - [`UsageTrackingProvider`] -- always the head; records access statistics
//! - [`EmptyProvider`] -- always the tail; nothing is ever found there
//!
//! # Building a store
//!
//! [`BinaryStoreConfig`] describes the chain (storage mode, named template
//! with overrides, or a fully custom chain). [`ChainBuilder`] checks it and
//! wires the providers; [`BinaryStore`] is the facade the rest of the system
//! uses.
//!
//! # Design Rules
//!
//! 1. Binaries are immutable once written; a second store of the same
//!    checksum is a no-op.
//! 2. Content is verified against its declared checksum before it is stored.
//! 3. A checksum nobody has is `Ok(None)`, never an error.
//! 4. Configuration problems surface when the chain is built, not when it is
//!    used.

pub mod builder;
pub mod config;
pub mod error;
pub mod providers;
pub mod staging;
pub mod store;
pub mod traits;

pub use builder::{ChainBuilder, ChainPlan, ProviderSettings, ResolvedProvider};
pub use config::{
    parse_size, BinaryStoreConfig, ChainSpec, ProviderNode, ProviderParams, SizeValue,
    StorageMode,
};
pub use error::{ConfigError, ConfigResult, StoreError, StoreResult};
pub use providers::{
    BlobProvider, EmptyProvider, FileCacheProvider, FileProvider, RetryProvider, UsageStats,
    UsageTrackingProvider,
};
pub use staging::StagedBinary;
pub use store::BinaryStore;
pub use traits::{BinaryProvider, BinaryStream, ProviderKind};
