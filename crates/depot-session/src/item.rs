//! Filesystem items: the metadata describing a repository path.
//!
//! An item exists in two ownership modes. [`ItemSnapshot`] is an immutable,
//! cheaply shared view that any number of readers may hold. [`MutableItem`]
//! is one writer's private working copy; it becomes a new snapshot only when
//! frozen and committed.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use depot_types::{BinaryRecord, Md5, RepoPath, Sha1, Sha256};
use serde::{Deserialize, Serialize};

/// Checksums and size of a file item. Checksums are unset until content has
/// been attached.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub sha1: Option<Sha1>,
    pub md5: Option<Md5>,
    pub sha256: Option<Sha256>,
    pub size: u64,
}

impl FileInfo {
    pub fn from_record(record: &BinaryRecord) -> Self {
        Self {
            sha1: Some(record.sha1),
            md5: Some(record.md5),
            sha256: Some(record.sha256),
            size: record.length,
        }
    }

    /// The binary this file refers to, once all checksums are known.
    pub fn record(&self) -> Option<BinaryRecord> {
        Some(BinaryRecord::new(self.sha1?, self.md5?, self.sha256?, self.size))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ItemKind {
    File(FileInfo),
    Folder { children: BTreeSet<String> },
}

/// Metadata for one repository path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub path: RepoPath,
    pub kind: ItemKind,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub created_by: String,
    pub modified_by: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl ItemInfo {
    pub fn new(path: RepoPath, kind: ItemKind, user: &str) -> Self {
        let now = Utc::now();
        Self {
            path,
            kind,
            created: now,
            modified: now,
            created_by: user.to_owned(),
            modified_by: user.to_owned(),
            properties: BTreeMap::new(),
        }
    }

    /// A file with no content attached yet.
    pub fn file(path: RepoPath, user: &str) -> Self {
        Self::new(path, ItemKind::File(FileInfo::default()), user)
    }

    pub fn folder(path: RepoPath, user: &str) -> Self {
        Self::new(
            path,
            ItemKind::Folder {
                children: BTreeSet::new(),
            },
            user,
        )
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, ItemKind::File(_))
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ItemKind::Folder { .. })
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        match &self.kind {
            ItemKind::File(info) => Some(info),
            ItemKind::Folder { .. } => None,
        }
    }

    pub fn children(&self) -> Option<&BTreeSet<String>> {
        match &self.kind {
            ItemKind::Folder { children } => Some(children),
            ItemKind::File(_) => None,
        }
    }

    /// SHA-1 of the attached content, for files that have some.
    pub fn sha1(&self) -> Option<&Sha1> {
        self.file_info()?.sha1.as_ref()
    }

    /// Content size; zero for folders.
    pub fn size(&self) -> u64 {
        self.file_info().map_or(0, |f| f.size)
    }
}

/// Immutable, shareable view of an item.
///
/// Clones share the same allocation; nothing can mutate it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemSnapshot(Arc<ItemInfo>);

impl ItemSnapshot {
    pub fn new(info: ItemInfo) -> Self {
        Self(Arc::new(info))
    }

    pub fn info(&self) -> &ItemInfo {
        &self.0
    }

    /// Whether both handles share one allocation.
    pub fn ptr_eq(&self, other: &ItemSnapshot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for ItemSnapshot {
    type Target = ItemInfo;

    fn deref(&self) -> &ItemInfo {
        &self.0
    }
}

impl From<ItemInfo> for ItemSnapshot {
    fn from(info: ItemInfo) -> Self {
        Self::new(info)
    }
}

/// A writer's private working copy of an item.
///
/// Tracks whether it has been changed since it was cloned and whether the
/// path existed before. Every mutation goes through a method that marks the
/// copy dirty and stamps the modification time.
#[derive(Clone, Debug)]
pub struct MutableItem {
    info: ItemInfo,
    dirty: bool,
    new: bool,
}

impl MutableItem {
    /// Clone a snapshot for modification.
    pub fn from_snapshot(snapshot: &ItemSnapshot) -> Self {
        Self {
            info: snapshot.info().clone(),
            dirty: false,
            new: false,
        }
    }

    /// Working copy for a path with no current item: an empty file.
    pub fn create(path: RepoPath, user: &str) -> Self {
        Self {
            info: ItemInfo::file(path, user),
            dirty: true,
            new: true,
        }
    }

    pub fn info(&self) -> &ItemInfo {
        &self.info
    }

    pub fn path(&self) -> &RepoPath {
        &self.info.path
    }

    /// Changed since it was cloned (always true for new items).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// No item existed at the path when this copy was made.
    pub fn is_new(&self) -> bool {
        self.new
    }

    /// Apply an arbitrary change to the item.
    pub fn update<R>(&mut self, user: &str, f: impl FnOnce(&mut ItemInfo) -> R) -> R {
        let out = f(&mut self.info);
        self.touch(user);
        out
    }

    /// Attach binary content, turning the item into a file.
    pub fn set_content(&mut self, record: &BinaryRecord, user: &str) {
        self.info.kind = ItemKind::File(FileInfo::from_record(record));
        self.touch(user);
    }

    /// Turn the item into an empty folder. Only meaningful for new items.
    pub fn make_folder(&mut self, user: &str) {
        if !self.info.is_folder() {
            self.info.kind = ItemKind::Folder {
                children: BTreeSet::new(),
            };
            self.touch(user);
        }
    }

    /// Record a child name. Returns `false` if the item is not a folder or
    /// already lists the child.
    pub fn add_child(&mut self, name: &str, user: &str) -> bool {
        let added = match &mut self.info.kind {
            ItemKind::Folder { children } => children.insert(name.to_owned()),
            ItemKind::File(_) => false,
        };
        if added {
            self.touch(user);
        }
        added
    }

    pub fn remove_child(&mut self, name: &str, user: &str) -> bool {
        let removed = match &mut self.info.kind {
            ItemKind::Folder { children } => children.remove(name),
            ItemKind::File(_) => false,
        };
        if removed {
            self.touch(user);
        }
        removed
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>, user: &str) {
        self.info.properties.insert(key.into(), value.into());
        self.touch(user);
    }

    pub fn remove_property(&mut self, key: &str, user: &str) -> Option<String> {
        let old = self.info.properties.remove(key);
        if old.is_some() {
            self.touch(user);
        }
        old
    }

    /// Freeze the current state into a new snapshot.
    pub fn freeze(&self) -> ItemSnapshot {
        ItemSnapshot::new(self.info.clone())
    }

    fn touch(&mut self, user: &str) {
        self.dirty = true;
        self.info.modified = Utc::now();
        self.info.modified_by = user.to_owned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> RepoPath {
        RepoPath::parse(p).unwrap()
    }

    fn record() -> BinaryRecord {
        BinaryRecord::new(
            Sha1::from_bytes([1; 20]),
            Md5::from_bytes([2; 16]),
            Sha256::from_bytes([3; 32]),
            42,
        )
    }

    #[test]
    fn working_copy_starts_clean_and_equal() {
        let snapshot = ItemSnapshot::new(ItemInfo::file(path("repo:a.jar"), "alice"));
        let working = MutableItem::from_snapshot(&snapshot);
        assert!(!working.is_dirty());
        assert!(!working.is_new());
        assert_eq!(working.info(), snapshot.info());
    }

    #[test]
    fn mutation_marks_dirty_and_leaves_snapshot_alone() {
        let snapshot = ItemSnapshot::new(ItemInfo::file(path("repo:a.jar"), "alice"));
        let mut working = MutableItem::from_snapshot(&snapshot);
        working.set_content(&record(), "bob");

        assert!(working.is_dirty());
        assert_eq!(working.info().size(), 42);
        assert_eq!(working.info().modified_by, "bob");
        assert_eq!(snapshot.size(), 0);
        assert_eq!(snapshot.modified_by, "alice");
    }

    #[test]
    fn new_items_are_dirty_files() {
        let item = MutableItem::create(path("repo:new.jar"), "alice");
        assert!(item.is_new());
        assert!(item.is_dirty());
        assert!(item.info().is_file());
        assert!(item.info().file_info().unwrap().record().is_none());
    }

    #[test]
    fn folder_children() {
        let mut item = MutableItem::create(path("repo:org"), "alice");
        assert!(!item.add_child("acme", "alice"));
        item.make_folder("alice");
        assert!(item.add_child("acme", "alice"));
        assert!(!item.add_child("acme", "alice"));
        assert!(item.info().children().unwrap().contains("acme"));
        assert!(item.remove_child("acme", "alice"));
        assert!(item.info().children().unwrap().is_empty());
    }

    #[test]
    fn untouched_property_removal_stays_clean() {
        let snapshot = ItemSnapshot::new(ItemInfo::folder(path("repo:org"), "alice"));
        let mut item = MutableItem::from_snapshot(&snapshot);
        assert_eq!(item.remove_property("missing", "bob"), None);
        assert!(!item.is_dirty());
        item.set_property("build.number", "7", "bob");
        assert!(item.is_dirty());
    }

    #[test]
    fn freeze_produces_independent_snapshot() {
        let mut item = MutableItem::create(path("repo:a.jar"), "alice");
        item.set_content(&record(), "alice");
        let frozen = item.freeze();
        item.set_property("k", "v", "alice");
        assert!(frozen.properties.is_empty());
        assert_eq!(frozen.file_info().unwrap().record(), Some(record()));
    }

    #[test]
    fn snapshot_clones_share_allocation() {
        let a = ItemSnapshot::new(ItemInfo::file(path("repo:a"), "u"));
        let b = a.clone();
        let c = ItemSnapshot::new(a.info().clone());
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a, c);
    }

    #[test]
    fn item_info_serializes_with_kind_tag() {
        let info = ItemInfo::folder(path("repo:org"), "alice");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["kind"]["type"], "folder");
        let back: ItemInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }
}
