//! Session lock entries: one session's hold on one path plus the item views
//! that hold protects.

use std::mem;

use depot_types::RepoPath;

use crate::error::{SessionError, SessionResult};
use crate::item::{ItemInfo, ItemSnapshot, MutableItem};
use crate::registry::{LockHold, PathLock};
use crate::repository::ItemRepository;

/// The item views held by an entry. An entry always holds at least one.
#[derive(Debug)]
pub enum EntryItems {
    /// Read access to the committed item.
    Snapshot(ItemSnapshot),
    /// A working copy of a path that had no item.
    Working(MutableItem),
    /// A working copy together with the snapshot it was cloned from.
    Both {
        snapshot: ItemSnapshot,
        working: MutableItem,
    },
}

impl EntryItems {
    /// Pair a snapshot with its working copy.
    ///
    /// Both must describe the same path and the working copy must still equal
    /// the snapshot.
    pub fn both(snapshot: ItemSnapshot, working: MutableItem) -> SessionResult<Self> {
        if snapshot.path != *working.path() {
            return Err(SessionError::InvariantViolation {
                path: snapshot.path.clone(),
                reason: format!("working copy belongs to {}", working.path()),
            });
        }
        if working.is_dirty() || snapshot.info() != working.info() {
            return Err(SessionError::InvariantViolation {
                path: snapshot.path.clone(),
                reason: "working copy differs from its snapshot".into(),
            });
        }
        Ok(Self::Both { snapshot, working })
    }

    pub fn path(&self) -> &RepoPath {
        match self {
            Self::Snapshot(snapshot) | Self::Both { snapshot, .. } => &snapshot.path,
            Self::Working(working) => working.path(),
        }
    }

    pub fn snapshot(&self) -> Option<&ItemSnapshot> {
        match self {
            Self::Snapshot(snapshot) | Self::Both { snapshot, .. } => Some(snapshot),
            Self::Working(_) => None,
        }
    }

    pub fn working(&self) -> Option<&MutableItem> {
        match self {
            Self::Working(working) | Self::Both { working, .. } => Some(working),
            Self::Snapshot(_) => None,
        }
    }

    pub fn working_mut(&mut self) -> Option<&mut MutableItem> {
        match self {
            Self::Working(working) | Self::Both { working, .. } => Some(working),
            Self::Snapshot(_) => None,
        }
    }

    /// The session's view: the working copy if there is one.
    pub fn current(&self) -> &ItemInfo {
        match self {
            Self::Working(working) | Self::Both { working, .. } => working.info(),
            Self::Snapshot(snapshot) => snapshot.info(),
        }
    }
}

/// One session's hold on one path.
///
/// Holds the path's shared lock in read or write mode together with the
/// items it protects. A read hold carries only a snapshot; a write hold
/// always carries a working copy. Dropping the entry releases the hold.
#[derive(Debug)]
pub struct SessionLockEntry {
    items: EntryItems,
    hold: LockHold,
    lock: PathLock,
}

impl SessionLockEntry {
    /// Assemble an entry, checking that the parts agree.
    pub fn new(lock: PathLock, hold: LockHold, items: EntryItems) -> SessionResult<Self> {
        if items.path() != lock.path() {
            return Err(SessionError::InvariantViolation {
                path: lock.path().clone(),
                reason: format!("items belong to {}", items.path()),
            });
        }
        match (&hold, &items) {
            (LockHold::Read(_), EntryItems::Snapshot(_)) => {}
            (LockHold::Write(_), EntryItems::Working(_) | EntryItems::Both { .. }) => {}
            (LockHold::Read(_), _) => {
                return Err(SessionError::InvariantViolation {
                    path: lock.path().clone(),
                    reason: "working copy under a read hold".into(),
                })
            }
            (LockHold::Write(_), EntryItems::Snapshot(_)) => {
                return Err(SessionError::InvariantViolation {
                    path: lock.path().clone(),
                    reason: "write hold without a working copy".into(),
                })
            }
        }
        Ok(Self { items, hold, lock })
    }

    pub fn path(&self) -> &RepoPath {
        self.lock.path()
    }

    pub fn lock(&self) -> &PathLock {
        &self.lock
    }

    pub fn items(&self) -> &EntryItems {
        &self.items
    }

    pub fn is_write_locked(&self) -> bool {
        self.hold.is_write()
    }

    pub fn is_read_locked(&self) -> bool {
        !self.hold.is_write()
    }

    pub fn snapshot(&self) -> Option<&ItemSnapshot> {
        self.items.snapshot()
    }

    pub fn working(&self) -> Option<&MutableItem> {
        self.items.working()
    }

    pub fn working_mut(&mut self) -> Option<&mut MutableItem> {
        self.items.working_mut()
    }

    pub fn current(&self) -> &ItemInfo {
        self.items.current()
    }

    /// Whether the working copy has uncommitted changes.
    pub fn is_dirty(&self) -> bool {
        self.working().is_some_and(MutableItem::is_dirty)
    }

    /// Commit a dirty working copy through `repository`.
    ///
    /// The committed state becomes the entry's snapshot and a clean working
    /// copy of it replaces the old one, so the entry stays write-held and
    /// editable. Returns the new snapshot, or `None` if nothing was dirty.
    pub fn commit(&mut self, repository: &dyn ItemRepository) -> SessionResult<Option<ItemSnapshot>> {
        let Some(working) = self.items.working().filter(|w| w.is_dirty()) else {
            return Ok(None);
        };
        let snapshot = working.freeze();
        repository.commit(snapshot.clone())?;
        self.items = EntryItems::both(snapshot.clone(), MutableItem::from_snapshot(&snapshot))?;
        Ok(Some(snapshot))
    }

    /// Throw away the working copy's changes by re-cloning the snapshot.
    ///
    /// Returns the discarded copy. An entry whose working copy has no
    /// snapshot behind it cannot be rolled back in place; the caller must
    /// drop the entry instead, and `None` is returned.
    pub fn rollback(&mut self) -> Option<MutableItem> {
        let snapshot = match &self.items {
            EntryItems::Both { snapshot, .. } => snapshot.clone(),
            EntryItems::Snapshot(_) | EntryItems::Working(_) => return None,
        };
        let fresh = EntryItems::Both {
            working: MutableItem::from_snapshot(&snapshot),
            snapshot,
        };
        match mem::replace(&mut self.items, fresh) {
            EntryItems::Both { working, .. } => Some(working),
            EntryItems::Snapshot(_) | EntryItems::Working(_) => None,
        }
    }

    /// Give up the hold, keeping the lock handle.
    pub fn into_lock(self) -> PathLock {
        let Self { hold, lock, .. } = self;
        drop(hold);
        lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemInfo;
    use crate::registry::PathLockRegistry;
    use crate::repository::InMemoryItemRepository;

    fn path(p: &str) -> RepoPath {
        RepoPath::parse(p).unwrap()
    }

    fn snapshot(p: &str) -> ItemSnapshot {
        ItemSnapshot::new(ItemInfo::file(path(p), "alice"))
    }

    #[test]
    fn both_requires_same_path() {
        let err = EntryItems::both(
            snapshot("repo:a.jar"),
            MutableItem::from_snapshot(&snapshot("repo:b.jar")),
        )
        .unwrap_err();
        assert!(err.is_defect());
    }

    #[test]
    fn both_requires_equivalent_content() {
        let snap = snapshot("repo:a.jar");
        let mut working = MutableItem::from_snapshot(&snap);
        working.set_property("k", "v", "bob");
        assert!(matches!(
            EntryItems::both(snap.clone(), working),
            Err(SessionError::InvariantViolation { .. })
        ));
        assert!(EntryItems::both(snap.clone(), MutableItem::from_snapshot(&snap)).is_ok());
    }

    #[test]
    fn hold_mode_must_match_items() {
        let registry = PathLockRegistry::new();
        let lock = registry.acquire_or_create(&path("repo:a.jar"));

        let working = EntryItems::Working(MutableItem::create(path("repo:a.jar"), "alice"));
        let err = SessionLockEntry::new(lock.clone(), lock.read(), working).unwrap_err();
        assert!(err.is_defect());

        let snap = EntryItems::Snapshot(snapshot("repo:a.jar"));
        let err = SessionLockEntry::new(lock.clone(), lock.write(), snap).unwrap_err();
        assert!(err.is_defect());
    }

    #[test]
    fn items_must_match_lock_path() {
        let registry = PathLockRegistry::new();
        let lock = registry.acquire_or_create(&path("repo:a.jar"));
        let items = EntryItems::Snapshot(snapshot("repo:other.jar"));
        assert!(SessionLockEntry::new(lock.clone(), lock.read(), items).is_err());
    }

    #[test]
    fn commit_makes_working_copy_the_snapshot() {
        let registry = PathLockRegistry::new();
        let repo = InMemoryItemRepository::new();
        let p = path("repo:a.jar");
        let lock = registry.acquire_or_create(&p);
        let hold = lock.write();
        let mut entry =
            SessionLockEntry::new(lock, hold, EntryItems::Working(MutableItem::create(p.clone(), "alice")))
                .unwrap();
        assert!(entry.is_dirty());

        let committed = entry.commit(&repo).unwrap().expect("dirty copy committed");
        assert!(!entry.is_dirty());
        assert!(entry.snapshot().unwrap().ptr_eq(&committed));
        assert!(entry.is_write_locked());
        assert!(repo.load(&p).unwrap().unwrap().ptr_eq(&committed));

        // Nothing left to commit.
        assert!(entry.commit(&repo).unwrap().is_none());
    }

    #[test]
    fn rollback_restores_snapshot_state() {
        let registry = PathLockRegistry::new();
        let snap = snapshot("repo:a.jar");
        let lock = registry.acquire_or_create(&snap.path);
        let hold = lock.write();
        let items = EntryItems::both(snap.clone(), MutableItem::from_snapshot(&snap)).unwrap();
        let mut entry = SessionLockEntry::new(lock, hold, items).unwrap();

        entry.working_mut().unwrap().set_property("k", "v", "bob");
        assert!(entry.is_dirty());
        let discarded = entry.rollback().unwrap();
        assert!(discarded.is_dirty());
        assert!(!entry.is_dirty());
        assert_eq!(entry.current(), snap.info());
    }

    #[test]
    fn into_lock_releases_hold() {
        let registry = PathLockRegistry::new();
        let snap = snapshot("repo:a.jar");
        let lock = registry.acquire_or_create(&snap.path);
        let entry = SessionLockEntry::new(lock.clone(), lock.read(), EntryItems::Snapshot(snap)).unwrap();
        assert!(lock.is_locked());
        let handle = entry.into_lock();
        assert!(!handle.is_locked());
    }
}
