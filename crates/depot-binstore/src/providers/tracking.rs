use chrono::{DateTime, Utc};
use dashmap::DashMap;
use depot_types::{BinaryRecord, Sha1};
use serde::Serialize;

use crate::error::StoreResult;
use crate::staging::StagedBinary;
use crate::traits::{BinaryProvider, BinaryStream, ProviderKind};

/// Access counters for one binary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub reads: u64,
    pub writes: u64,
    pub last_read: Option<DateTime<Utc>>,
    pub last_write: Option<DateTime<Utc>>,
}

/// Head of every chain. Counts successful reads and writes per checksum and
/// otherwise passes everything through untouched.
#[derive(Debug)]
pub struct UsageTrackingProvider {
    usage: DashMap<Sha1, UsageStats>,
    next: Box<dyn BinaryProvider>,
}

impl UsageTrackingProvider {
    pub fn new(next: Box<dyn BinaryProvider>) -> Self {
        Self {
            usage: DashMap::new(),
            next,
        }
    }

    pub fn usage(&self, sha1: &Sha1) -> Option<UsageStats> {
        self.usage.get(sha1).map(|stats| *stats)
    }

    /// Number of binaries with recorded usage.
    pub fn tracked(&self) -> usize {
        self.usage.len()
    }

    /// Kinds of the chain below the tracker, head first, ending in `Empty`.
    pub fn chain(&self) -> Vec<ProviderKind> {
        let mut kinds = vec![self.kind()];
        let mut link = self.next();
        while let Some(provider) = link {
            kinds.push(provider.kind());
            link = provider.next();
        }
        kinds
    }
}

impl BinaryProvider for UsageTrackingProvider {
    fn id(&self) -> &str {
        "usage-tracking"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::UsageTracking
    }

    fn get(&self, sha1: &Sha1) -> StoreResult<Option<BinaryStream>> {
        let stream = self.next.get(sha1)?;
        if stream.is_some() {
            let mut stats = self.usage.entry(*sha1).or_default();
            stats.reads += 1;
            stats.last_read = Some(Utc::now());
        }
        Ok(stream)
    }

    fn put(&self, staged: &StagedBinary) -> StoreResult<BinaryRecord> {
        let record = self.next.put(staged)?;
        let mut stats = self.usage.entry(record.sha1).or_default();
        stats.writes += 1;
        stats.last_write = Some(Utc::now());
        Ok(record)
    }

    fn exists(&self, sha1: &Sha1) -> StoreResult<bool> {
        self.next.exists(sha1)
    }

    fn delete(&self, sha1: &Sha1) -> StoreResult<bool> {
        let deleted = self.next.delete(sha1)?;
        if deleted {
            self.usage.remove(sha1);
        }
        Ok(deleted)
    }

    fn next(&self) -> Option<&dyn BinaryProvider> {
        Some(self.next.as_ref())
    }
}
