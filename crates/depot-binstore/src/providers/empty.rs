use depot_types::{BinaryRecord, Sha1};

use crate::error::{StoreError, StoreResult};
use crate::staging::StagedBinary;
use crate::traits::{BinaryProvider, BinaryStream, ProviderKind};

/// Terminal link of every chain.
///
/// Reports every checksum as absent and never delegates. A `put` reaching
/// this link means no provider above persisted the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyProvider;

impl BinaryProvider for EmptyProvider {
    fn id(&self) -> &str {
        "empty"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Empty
    }

    fn get(&self, _sha1: &Sha1) -> StoreResult<Option<BinaryStream>> {
        Ok(None)
    }

    fn put(&self, staged: &StagedBinary) -> StoreResult<BinaryRecord> {
        Err(StoreError::NotStored(*staged.sha1()))
    }

    fn exists(&self, _sha1: &Sha1) -> StoreResult<bool> {
        Ok(false)
    }

    fn delete(&self, _sha1: &Sha1) -> StoreResult<bool> {
        Ok(false)
    }

    fn next(&self) -> Option<&dyn BinaryProvider> {
        None
    }
}
