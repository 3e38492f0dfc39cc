use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use depot_types::{BinaryRecord, Sha1};
use tracing::{debug, info};

use crate::builder::ChainBuilder;
use crate::config::BinaryStoreConfig;
use crate::error::{ConfigError, ConfigResult, StoreError, StoreResult};
use crate::providers::{UsageStats, UsageTrackingProvider};
use crate::staging::StagedBinary;
use crate::traits::{BinaryProvider, BinaryStream, ProviderKind};

/// Directory under `base-dir` where uploads are spooled before storing.
const STAGING_DIR: &str = "_staging";

/// The single entry point for binary content.
///
/// Owns the head of a provider chain and hides its shape: callers fetch,
/// store, check and remove by checksum. Safe to share across threads.
#[derive(Debug)]
pub struct BinaryStore {
    head: UsageTrackingProvider,
    staging_dir: Option<PathBuf>,
}

impl BinaryStore {
    /// Build the chain described by `config`.
    pub fn from_config(config: &BinaryStoreConfig) -> ConfigResult<Self> {
        let head = ChainBuilder::new(config).build()?;
        let staging_dir = match &config.base_dir {
            Some(base) => {
                let dir = base.join(STAGING_DIR);
                fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
                    path: dir.clone(),
                    source,
                })?;
                Some(dir)
            }
            None => None,
        };
        Ok(Self { head, staging_dir })
    }

    /// Wrap an already built chain. Uploads spool to the system temp
    /// directory.
    pub fn new(head: UsageTrackingProvider) -> Self {
        Self {
            head,
            staging_dir: None,
        }
    }

    /// Spool uploads under `dir` instead.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging_dir.as_deref()
    }

    /// Open the content stored under `sha1`, or `None` if no provider has it.
    pub fn fetch(&self, sha1: &Sha1) -> StoreResult<Option<BinaryStream>> {
        self.head.get(sha1)
    }

    /// Read the whole binary into memory.
    pub fn fetch_bytes(&self, sha1: &Sha1) -> StoreResult<Option<Vec<u8>>> {
        match self.fetch(sha1)? {
            Some(mut stream) => {
                let mut data = Vec::new();
                stream.read_to_end(&mut data)?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Store content declared to hash to `sha1`.
    ///
    /// The content is checksummed while it is spooled; a different SHA-1
    /// fails with [`StoreError::ChecksumMismatch`] and nothing is stored.
    /// Storing a checksum that already exists is a no-op returning the same
    /// record.
    pub fn store(&self, sha1: &Sha1, reader: impl Read) -> StoreResult<BinaryRecord> {
        let staged = self.stage(reader)?;
        if staged.sha1() != sha1 {
            return Err(StoreError::ChecksumMismatch {
                expected: *sha1,
                actual: *staged.sha1(),
            });
        }
        self.put(&staged)
    }

    /// Store content, computing its checksums.
    pub fn ingest(&self, reader: impl Read) -> StoreResult<BinaryRecord> {
        let staged = self.stage(reader)?;
        self.put(&staged)
    }

    pub fn exists(&self, sha1: &Sha1) -> StoreResult<bool> {
        self.head.exists(sha1)
    }

    /// Delete the content for `sha1` from every provider that holds it.
    pub fn remove(&self, sha1: &Sha1) -> StoreResult<bool> {
        let removed = self.head.delete(sha1)?;
        if removed {
            info!(sha1 = %sha1, "binary removed");
        }
        Ok(removed)
    }

    /// Shape of the provider chain, head first.
    pub fn chain(&self) -> Vec<ProviderKind> {
        self.head.chain()
    }

    pub fn usage(&self, sha1: &Sha1) -> Option<UsageStats> {
        self.head.usage(sha1)
    }

    fn stage(&self, reader: impl Read) -> StoreResult<StagedBinary> {
        Ok(StagedBinary::stage(self.staging_dir.as_deref(), reader)?)
    }

    fn put(&self, staged: &StagedBinary) -> StoreResult<BinaryRecord> {
        if self.head.exists(staged.sha1())? {
            debug!(sha1 = %staged.sha1(), "binary already stored");
            return Ok(*staged.record());
        }
        let record = self.head.put(staged)?;
        info!(sha1 = %record.sha1, len = record.length, "binary stored");
        Ok(record)
    }
}
