use std::fmt;
use std::io::Read;

use depot_types::{BinaryRecord, Sha1};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::staging::StagedBinary;

/// A readable stream over stored binary content.
pub type BinaryStream = Box<dyn Read + Send>;

/// The closed set of provider kinds a chain can be built from.
///
/// Serialized with the type tags used in chain configuration files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Terminal sentinel: nothing is ever found, nothing is delegated.
    Empty,
    /// Sharded directory of files keyed by SHA-1.
    FileSystem,
    /// Bounded LRU file cache in front of the next provider.
    CacheFs,
    /// Rows in a database table.
    Blob,
    /// Re-attempts the next provider's operations on transient failure.
    Retry,
    /// Head of every chain: records usage statistics.
    UsageTracking,
}

impl ProviderKind {
    /// Kinds that are the source of truth for what they store.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::FileSystem | Self::Blob)
    }

    /// Kinds the chain builder places itself and configuration may not name.
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Empty | Self::UsageTracking)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::FileSystem => "file-system",
            Self::CacheFs => "cache-fs",
            Self::Blob => "blob",
            Self::Retry => "retry",
            Self::UsageTracking => "usage-tracking",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One link in a binary provider chain.
///
/// Providers serve the operations meaningful to their backend and hand every
/// other request, unchanged, to the provider they own as `next`. Every chain
/// ends in [`EmptyProvider`](crate::providers::EmptyProvider), so a request
/// no real provider can satisfy resolves to "not found" instead of an error.
///
/// Implementations must be safe to call from many sessions at once.
pub trait BinaryProvider: Send + Sync + fmt::Debug {
    /// The configured id of this link (template node name or custom id).
    fn id(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Open the content stored under `sha1`.
    ///
    /// Returns `Ok(None)` if no provider from here down has it.
    fn get(&self, sha1: &Sha1) -> StoreResult<Option<BinaryStream>>;

    /// Persist a staged binary and return its record.
    ///
    /// Storing content that is already present is a no-op.
    fn put(&self, staged: &StagedBinary) -> StoreResult<BinaryRecord>;

    /// Whether content for `sha1` is available from here down.
    fn exists(&self, sha1: &Sha1) -> StoreResult<bool>;

    /// Delete the content for `sha1`. Returns `true` if something was removed.
    fn delete(&self, sha1: &Sha1) -> StoreResult<bool>;

    /// The link this provider delegates to. `None` only for the terminal
    /// sentinel.
    fn next(&self) -> Option<&dyn BinaryProvider>;
}
