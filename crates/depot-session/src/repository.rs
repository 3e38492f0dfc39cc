//! The [`ItemRepository`] trait: where committed item snapshots live.
//!
//! The session lock manager loads snapshots through this trait and commits
//! working copies back through it. Any backend (in-memory, database) can
//! implement it.

use std::collections::BTreeMap;

use depot_types::RepoPath;
use parking_lot::RwLock;

use crate::error::SessionResult;
use crate::item::ItemSnapshot;

/// Storage for committed item snapshots.
///
/// Implementations must be thread-safe; many sessions call into one
/// repository concurrently. Callers serialize access per path through the
/// lock registry, so implementations need not.
pub trait ItemRepository: Send + Sync {
    /// The current snapshot at `path`. Returns `Ok(None)` if no item exists.
    fn load(&self, path: &RepoPath) -> SessionResult<Option<ItemSnapshot>>;

    /// Make `item` the current snapshot at its path.
    fn commit(&self, item: ItemSnapshot) -> SessionResult<()>;

    /// Delete the item at `path`. Returns `Ok(true)` if it existed.
    fn delete(&self, path: &RepoPath) -> SessionResult<bool>;

    /// `prefix` and every item beneath it, in path order.
    fn list(&self, prefix: &RepoPath) -> SessionResult<Vec<ItemSnapshot>>;
}

/// An in-memory implementation of [`ItemRepository`].
///
/// Snapshots live in a `BTreeMap` behind a `RwLock` and are lost when the
/// repository is dropped.
#[derive(Debug, Default)]
pub struct InMemoryItemRepository {
    items: RwLock<BTreeMap<RepoPath, ItemSnapshot>>,
}

impl InMemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl ItemRepository for InMemoryItemRepository {
    fn load(&self, path: &RepoPath) -> SessionResult<Option<ItemSnapshot>> {
        Ok(self.items.read().get(path).cloned())
    }

    fn commit(&self, item: ItemSnapshot) -> SessionResult<()> {
        self.items.write().insert(item.path.clone(), item);
        Ok(())
    }

    fn delete(&self, path: &RepoPath) -> SessionResult<bool> {
        Ok(self.items.write().remove(path).is_some())
    }

    fn list(&self, prefix: &RepoPath) -> SessionResult<Vec<ItemSnapshot>> {
        Ok(self
            .items
            .read()
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.repo_key() == prefix.repo_key())
            .filter(|(path, _)| path.is_descendant_of(prefix))
            .map(|(_, item)| item.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemInfo;

    fn path(p: &str) -> RepoPath {
        RepoPath::parse(p).unwrap()
    }

    fn file(p: &str) -> ItemSnapshot {
        ItemSnapshot::new(ItemInfo::file(path(p), "test"))
    }

    #[test]
    fn commit_load_delete() {
        let repo = InMemoryItemRepository::new();
        assert!(repo.load(&path("libs:a.jar")).unwrap().is_none());

        repo.commit(file("libs:a.jar")).unwrap();
        assert_eq!(repo.len(), 1);
        let loaded = repo.load(&path("libs:a.jar")).unwrap().unwrap();
        assert_eq!(loaded.path, path("libs:a.jar"));

        assert!(repo.delete(&path("libs:a.jar")).unwrap());
        assert!(!repo.delete(&path("libs:a.jar")).unwrap());
        assert!(repo.is_empty());
    }

    #[test]
    fn commit_replaces_snapshot() {
        let repo = InMemoryItemRepository::new();
        let first = file("libs:a.jar");
        repo.commit(first.clone()).unwrap();
        let second = file("libs:a.jar");
        repo.commit(second.clone()).unwrap();
        let loaded = repo.load(&path("libs:a.jar")).unwrap().unwrap();
        assert!(loaded.ptr_eq(&second));
        assert!(!loaded.ptr_eq(&first));
    }

    #[test]
    fn list_returns_subtree_in_order() {
        let repo = InMemoryItemRepository::new();
        for p in [
            "libs:org/acme/b.jar",
            "libs:org/acme/a.jar",
            "libs:org/acme",
            "libs:org/acmex/c.jar",
            "libs:org",
            "other:org/acme/a.jar",
        ] {
            repo.commit(file(p)).unwrap();
        }

        let listed: Vec<String> = repo
            .list(&path("libs:org/acme"))
            .unwrap()
            .iter()
            .map(|item| item.path.to_string())
            .collect();
        assert_eq!(
            listed,
            ["libs:org/acme", "libs:org/acme/a.jar", "libs:org/acme/b.jar"]
        );
        assert_eq!(repo.list(&path("libs")).unwrap().len(), 5);
    }
}
