//! The per-session lock manager.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use depot_types::RepoPath;
use tracing::{debug, info};

use crate::entry::{EntryItems, SessionLockEntry};
use crate::error::{SessionError, SessionResult};
use crate::item::{ItemInfo, ItemSnapshot, MutableItem};
use crate::registry::{LockHold, PathLock, PathLockRegistry};
use crate::repository::ItemRepository;

/// User recorded on items created by a manager that was not given one.
pub const ANONYMOUS: &str = "anonymous";

/// One session's locks.
///
/// Enforces single-writer / multi-reader access per path on top of the shared
/// [`PathLockRegistry`], and manages the snapshot / working copy pair for
/// each locked path. Every hold is released by [`release_all`], which also
/// runs on drop.
///
/// Lock holds are bound to the thread that took them, so a manager cannot be
/// sent to another thread. Locks on different paths are taken in whatever
/// order the caller asks for them.
///
/// [`release_all`]: SessionLockManager::release_all
pub struct SessionLockManager {
    registry: Arc<PathLockRegistry>,
    repository: Arc<dyn ItemRepository>,
    user: String,
    entries: BTreeMap<RepoPath, SessionLockEntry>,
}

impl SessionLockManager {
    pub fn new(registry: Arc<PathLockRegistry>, repository: Arc<dyn ItemRepository>) -> Self {
        Self {
            registry,
            repository,
            user: ANONYMOUS.to_owned(),
            entries: BTreeMap::new(),
        }
    }

    /// Record `user` as the creator of items this manager creates.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Take a read lock on `path` and return its committed snapshot.
    ///
    /// A path already locked by this session is returned as is. If no item
    /// exists the lock is released again and `None` is returned.
    pub fn read_lock(&mut self, path: &RepoPath) -> SessionResult<Option<ItemSnapshot>> {
        if let Some(entry) = self.entries.get(path) {
            return Ok(entry.snapshot().cloned());
        }

        let lock = self.registry.acquire_or_create(path);
        let hold = lock.read();
        let loaded = match self.repository.load(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.abandon(lock, hold);
                return Err(e);
            }
        };
        let Some(snapshot) = loaded else {
            debug!(path = %path, "nothing to read-lock");
            self.abandon(lock, hold);
            return Ok(None);
        };

        let entry = SessionLockEntry::new(lock, hold, EntryItems::Snapshot(snapshot.clone()))?;
        self.entries.insert(path.clone(), entry);
        debug!(path = %path, "read lock acquired");
        Ok(Some(snapshot))
    }

    /// Take the write lock on `path` and return its working copy.
    ///
    /// A write-locked path returns the existing working copy. A read-locked
    /// path is upgraded only when `upgrade` is set: the read hold is released
    /// before the write hold is taken, so another writer may commit in
    /// between and the working copy is cloned from whatever snapshot is
    /// current once the write hold is granted. A path with no item gets a
    /// fresh working copy.
    pub fn write_lock(&mut self, path: &RepoPath, upgrade: bool) -> SessionResult<&mut MutableItem> {
        let lock = match self.entries.get(path).map(SessionLockEntry::is_write_locked) {
            Some(true) => return self.working_copy(path),
            Some(false) if !upgrade => {
                return Err(SessionError::UpgradeRequired { path: path.clone() })
            }
            Some(false) => {
                let entry = self.entries.remove(path).ok_or_else(|| SessionError::InvariantViolation {
                    path: path.clone(),
                    reason: "entry vanished during upgrade".into(),
                })?;
                debug!(path = %path, "upgrading read lock");
                entry.into_lock()
            }
            None => self.registry.acquire_or_create(path),
        };

        let hold = lock.write();
        let loaded = match self.repository.load(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.abandon(lock, hold);
                return Err(e);
            }
        };
        let items = match loaded {
            Some(snapshot) => {
                let working = MutableItem::from_snapshot(&snapshot);
                EntryItems::both(snapshot, working)?
            }
            None => EntryItems::Working(MutableItem::create(path.clone(), &self.user)),
        };
        let entry = SessionLockEntry::new(lock, hold, items)?;
        self.entries.insert(path.clone(), entry);
        debug!(path = %path, "write lock acquired");
        self.working_copy(path)
    }

    /// Release this session's read lock on `path`. Returns `false` if the
    /// session holds no read lock there (including when it holds the write
    /// lock).
    pub fn release_read_lock(&mut self, path: &RepoPath) -> bool {
        if !self.is_read_locked(path) {
            return false;
        }
        if let Some(entry) = self.entries.remove(path) {
            self.unlock(entry);
        }
        debug!(path = %path, "read lock released");
        true
    }

    /// The working copy for `path` if this session holds its write lock.
    pub fn get_if_write_locked(&mut self, path: &RepoPath) -> SessionResult<Option<&mut MutableItem>> {
        match self.entries.get_mut(path) {
            Some(entry) if entry.is_write_locked() => match entry.working_mut() {
                Some(working) => Ok(Some(working)),
                None => Err(SessionError::MissingWorkingCopy { path: path.clone() }),
            },
            _ => Ok(None),
        }
    }

    /// This session's view of `path` if it holds any lock on it: the working
    /// copy when there is one, the snapshot otherwise.
    pub fn get_if_locked(&self, path: &RepoPath) -> Option<&ItemInfo> {
        self.entries.get(path).map(SessionLockEntry::current)
    }

    /// Commit every dirty working copy, parents before children. Returns how
    /// many items were committed.
    ///
    /// Write locks are kept; committed paths stay editable with a clean
    /// working copy.
    ///
    /// Items are committed one at a time and the first repository error
    /// stops the save. Paths ordered before the failing one are then already
    /// committed, while it and every later path keep their dirty working
    /// copies, so calling `save` again resumes where it stopped.
    pub fn save(&mut self) -> SessionResult<usize> {
        let mut committed = 0;
        for (path, entry) in self.entries.iter_mut() {
            if let Some(snapshot) = entry.commit(self.repository.as_ref())? {
                info!(path = %path, size = snapshot.size(), user = %snapshot.modified_by, "item committed");
                committed += 1;
            }
        }
        Ok(committed)
    }

    /// Whether any working copy holds uncommitted changes.
    pub fn has_pending_resources(&self) -> bool {
        self.entries.values().any(SessionLockEntry::is_dirty)
    }

    /// Throw away uncommitted changes to `path`.
    ///
    /// The working copy is re-cloned from the snapshot and the write lock is
    /// kept. A new path has no snapshot to return to, so its entry is removed
    /// and its lock released. Returns whether there was anything to discard.
    pub fn discard(&mut self, path: &RepoPath) -> bool {
        let Some(entry) = self.entries.get_mut(path) else {
            return false;
        };
        if !entry.is_dirty() {
            return false;
        }
        if entry.rollback().is_none() {
            if let Some(entry) = self.entries.remove(path) {
                self.unlock(entry);
            }
        }
        debug!(path = %path, "working copy discarded");
        true
    }

    /// Drop and unlock the entry for `path`, discarding any uncommitted
    /// changes. Returns whether there was an entry.
    pub fn remove(&mut self, path: &RepoPath) -> bool {
        match self.entries.remove(path) {
            Some(entry) => {
                self.unlock(entry);
                debug!(path = %path, "lock entry removed");
                true
            }
            None => false,
        }
    }

    /// Release every hold and clear all entries. Uncommitted changes are
    /// discarded. Safe to call more than once.
    pub fn release_all(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let entries = std::mem::take(&mut self.entries);
        let count = entries.len();
        let pending = entries.values().filter(|e| e.is_dirty()).count();
        for (_, entry) in entries {
            self.unlock(entry);
        }
        debug!(released = count, discarded = pending, "session locks released");
    }

    pub fn is_read_locked(&self, path: &RepoPath) -> bool {
        self.entries.get(path).is_some_and(SessionLockEntry::is_read_locked)
    }

    pub fn is_write_locked(&self, path: &RepoPath) -> bool {
        self.entries.get(path).is_some_and(SessionLockEntry::is_write_locked)
    }

    /// Paths this session holds locks on, in order.
    pub fn locked_paths(&self) -> impl Iterator<Item = &RepoPath> {
        self.entries.keys()
    }

    pub fn entry(&self, path: &RepoPath) -> Option<&SessionLockEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn registry(&self) -> &Arc<PathLockRegistry> {
        &self.registry
    }

    pub fn repository(&self) -> &Arc<dyn ItemRepository> {
        &self.repository
    }

    fn working_copy(&mut self, path: &RepoPath) -> SessionResult<&mut MutableItem> {
        self.entries
            .get_mut(path)
            .and_then(SessionLockEntry::working_mut)
            .ok_or_else(|| SessionError::MissingWorkingCopy { path: path.clone() })
    }

    fn unlock(&self, entry: SessionLockEntry) {
        let path = entry.path().clone();
        drop(entry);
        self.registry.release_if_unused(&path);
    }

    fn abandon(&self, lock: PathLock, hold: LockHold) {
        let path = lock.path().clone();
        drop(hold);
        drop(lock);
        self.registry.release_if_unused(&path);
    }
}

impl Drop for SessionLockManager {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl fmt::Debug for SessionLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLockManager")
            .field("user", &self.user)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}
