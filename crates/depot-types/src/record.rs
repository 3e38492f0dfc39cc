use serde::{Deserialize, Serialize};

use crate::checksum::{Checksum, ChecksumType, Md5, Sha1, Sha256};

/// The durable description of one stored binary.
///
/// A record is created when content is first stored and never updated in
/// place; identical content always yields an identical record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinaryRecord {
    pub sha1: Sha1,
    pub md5: Md5,
    pub sha256: Sha256,
    /// Content length in bytes.
    pub length: u64,
}

impl BinaryRecord {
    pub fn new(sha1: Sha1, md5: Md5, sha256: Sha256, length: u64) -> Self {
        Self {
            sha1,
            md5,
            sha256,
            length,
        }
    }

    /// The digest of the requested algorithm.
    pub fn checksum(&self, kind: ChecksumType) -> Checksum {
        match kind {
            ChecksumType::Sha1 => self.sha1.into(),
            ChecksumType::Md5 => self.md5.into(),
            ChecksumType::Sha256 => self.sha256.into(),
        }
    }

    /// Whether `checksum` matches the corresponding digest of this record.
    pub fn matches(&self, checksum: &Checksum) -> bool {
        self.checksum(checksum.checksum_type()) == *checksum
    }
}
