//! The shared path lock registry.
//!
//! One reader/writer lock exists per repository path across every session
//! that shares a registry. The registry only vends lock objects; it knows
//! nothing about which session holds what.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use depot_types::RepoPath;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use tracing::trace;

type SharedLock = Arc<RwLock<()>>;

/// A held lock on one path. Dropping it releases the lock.
///
/// Holds are tied to the thread that acquired them.
pub enum LockHold {
    Read(ArcRwLockReadGuard<RawRwLock, ()>),
    Write(ArcRwLockWriteGuard<RawRwLock, ()>),
}

impl LockHold {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}

impl fmt::Debug for LockHold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read(_) => "LockHold::Read",
            Self::Write(_) => "LockHold::Write",
        })
    }
}

/// Handle to the lock for one path.
///
/// Handles for the same path obtained from the same registry share one lock.
#[derive(Clone)]
pub struct PathLock {
    path: RepoPath,
    lock: SharedLock,
}

impl PathLock {
    pub fn path(&self) -> &RepoPath {
        &self.path
    }

    /// Block until a read hold is granted.
    pub fn read(&self) -> LockHold {
        LockHold::Read(self.lock.read_arc())
    }

    /// Block until the write hold is granted.
    pub fn write(&self) -> LockHold {
        LockHold::Write(self.lock.write_arc())
    }

    pub fn try_read(&self) -> Option<LockHold> {
        self.lock.try_read_arc().map(LockHold::Read)
    }

    pub fn try_write(&self) -> Option<LockHold> {
        self.lock.try_write_arc().map(LockHold::Write)
    }

    /// Whether both handles refer to the same underlying lock.
    pub fn same_lock(&self, other: &PathLock) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }

    /// Whether anyone holds the lock in any mode.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Whether someone holds the write lock.
    pub fn is_write_locked(&self) -> bool {
        self.lock.is_locked_exclusive()
    }
}

impl fmt::Debug for PathLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathLock")
            .field("path", &self.path)
            .field("locked", &self.is_locked())
            .field("write_locked", &self.is_write_locked())
            .finish()
    }
}

/// Process-wide table of path locks.
///
/// Get-or-create runs under the map's per-shard lock, so concurrent first
/// callers for a path always receive the same lock. Entries are reference
/// counted: [`release_if_unused`](Self::release_if_unused) removes a path's
/// lock once no handle or hold refers to it anymore, which keeps the table
/// bounded by the number of paths currently in use.
#[derive(Debug, Default)]
pub struct PathLockRegistry {
    locks: DashMap<RepoPath, SharedLock>,
}

impl PathLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `path`, creating it on first use.
    pub fn acquire_or_create(&self, path: &RepoPath) -> PathLock {
        let lock = self.locks.entry(path.clone()).or_default().clone();
        PathLock {
            path: path.clone(),
            lock,
        }
    }

    /// Drop the registry's entry for `path` if nothing else references it.
    /// Returns whether an entry was removed.
    pub fn release_if_unused(&self, path: &RepoPath) -> bool {
        let removed = self
            .locks
            .remove_if(path, |_, lock| Arc::strong_count(lock) == 1)
            .is_some();
        if removed {
            trace!(path = %path, "path lock evicted");
        }
        removed
    }

    /// Evict every unused entry. Returns how many were removed.
    pub fn purge_unused(&self) -> usize {
        let mut removed = 0;
        self.locks.retain(|_, lock| {
            let in_use = Arc::strong_count(lock) > 1;
            if !in_use {
                removed += 1;
            }
            in_use
        });
        removed
    }

    pub fn contains(&self, path: &RepoPath) -> bool {
        self.locks.contains_key(path)
    }

    /// Number of paths with a live lock object.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
