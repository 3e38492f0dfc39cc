use std::thread;
use std::time::Duration;

use depot_types::{BinaryRecord, Sha1};
use tracing::warn;

use crate::error::StoreResult;
use crate::staging::StagedBinary;
use crate::traits::{BinaryProvider, BinaryStream, ProviderKind};

pub const DEFAULT_MAX_TRIES: u32 = 5;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Re-runs operations on the next provider when they fail transiently.
///
/// Each operation is attempted at most `max_tries` times with `interval`
/// between attempts. Errors that are not transient, and the last error once
/// attempts run out, are returned unchanged.
#[derive(Debug)]
pub struct RetryProvider {
    id: String,
    max_tries: u32,
    interval: Duration,
    next: Box<dyn BinaryProvider>,
}

impl RetryProvider {
    pub fn new(
        id: impl Into<String>,
        max_tries: u32,
        interval: Duration,
        next: Box<dyn BinaryProvider>,
    ) -> Self {
        Self {
            id: id.into(),
            max_tries: max_tries.max(1),
            interval,
            next,
        }
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn attempt<T>(
        &self,
        op: &'static str,
        sha1: &Sha1,
        mut f: impl FnMut(&dyn BinaryProvider) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut tries = 1;
        loop {
            match f(self.next.as_ref()) {
                Err(e) if e.is_transient() && tries < self.max_tries => {
                    warn!(
                        provider = %self.id,
                        op,
                        sha1 = %sha1,
                        attempt = tries,
                        max_tries = self.max_tries,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tries += 1;
                    thread::sleep(self.interval);
                }
                result => return result,
            }
        }
    }
}

impl BinaryProvider for RetryProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Retry
    }

    fn get(&self, sha1: &Sha1) -> StoreResult<Option<BinaryStream>> {
        self.attempt("get", sha1, |next| next.get(sha1))
    }

    fn put(&self, staged: &StagedBinary) -> StoreResult<BinaryRecord> {
        self.attempt("put", staged.sha1(), |next| next.put(staged))
    }

    fn exists(&self, sha1: &Sha1) -> StoreResult<bool> {
        self.attempt("exists", sha1, |next| next.exists(sha1))
    }

    fn delete(&self, sha1: &Sha1) -> StoreResult<bool> {
        self.attempt("delete", sha1, |next| next.delete(sha1))
    }

    fn next(&self) -> Option<&dyn BinaryProvider> {
        Some(self.next.as_ref())
    }
}
