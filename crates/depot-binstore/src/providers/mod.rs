//! The provider kinds a chain is assembled from.

mod blob;
mod cache;
mod empty;
mod file;
mod retry;
mod tracking;

pub use blob::{BlobProvider, IN_MEMORY_DB};
pub use cache::FileCacheProvider;
pub use empty::EmptyProvider;
pub use file::FileProvider;
pub use retry::{RetryProvider, DEFAULT_INTERVAL, DEFAULT_MAX_TRIES};
pub use tracking::{UsageStats, UsageTrackingProvider};

use depot_types::{BinaryRecord, Sha1};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::StoreResult;
use crate::staging::StagedBinary;
use crate::traits::BinaryProvider;

/// Name of the staging directory inside a provider root. Files are written
/// there first and renamed into place once complete.
pub(crate) const PRE_DIR: &str = "_pre";

/// Sharded location of a binary under `root`: `{root}/{sha1[0..2]}/{sha1}`.
///
/// The two-character prefix bounds any single directory to a 256th of the
/// stored binaries.
pub(crate) fn shard_path(root: &Path, sha1: &Sha1) -> PathBuf {
    let hex = sha1.to_hex();
    root.join(&hex[..2]).join(hex)
}

/// Finish a write attempted by provider `id`. A refusal from the medium hands
/// `staged` on to `next`; any other failure is returned.
pub(crate) fn put_or_delegate(
    id: &str,
    written: StoreResult<()>,
    staged: &StagedBinary,
    next: &dyn BinaryProvider,
) -> StoreResult<BinaryRecord> {
    match written {
        Ok(()) => Ok(*staged.record()),
        Err(e) if e.is_refusal() => {
            warn!(provider = id, sha1 = %staged.sha1(), error = %e, "write refused, passing to next provider");
            next.put(staged)
        }
        Err(e) => Err(e),
    }
}
