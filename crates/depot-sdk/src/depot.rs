use std::io::Read;
use std::sync::Arc;

use depot_binstore::{BinaryStore, BinaryStoreConfig, BinaryStream};
use depot_session::{
    InMemoryItemRepository, ItemRepository, ItemSnapshot, PathLockRegistry, Session,
    SessionLockManager, ANONYMOUS,
};
use depot_types::RepoPath;
use tracing::{debug, info};

use crate::error::{SdkError, SdkResult};

/// The storage layer's top-level context.
///
/// Owns the binary store, the path lock registry and the item repository,
/// and hands out sessions over them. Cheap to share: every part sits behind
/// an `Arc` and is safe to use from many threads, while each [`Session`] stays
/// on the thread that created it.
#[derive(Clone)]
pub struct Depot {
    binaries: Arc<BinaryStore>,
    locks: Arc<PathLockRegistry>,
    items: Arc<dyn ItemRepository>,
}

impl Depot {
    /// Build the binary store described by `config` with an in-memory item
    /// repository.
    pub fn open(config: &BinaryStoreConfig) -> SdkResult<Self> {
        let binaries = BinaryStore::from_config(config)?;
        info!(chain = ?binaries.chain(), "depot opened");
        Ok(Self::new(binaries, Arc::new(InMemoryItemRepository::new())))
    }

    /// A depot that keeps everything in memory.
    pub fn in_memory() -> SdkResult<Self> {
        Self::open(&BinaryStoreConfig::in_memory())
    }

    pub fn new(binaries: BinaryStore, items: Arc<dyn ItemRepository>) -> Self {
        Self {
            binaries: Arc::new(binaries),
            locks: Arc::new(PathLockRegistry::new()),
            items,
        }
    }

    pub fn binaries(&self) -> &BinaryStore {
        &self.binaries
    }

    pub fn registry(&self) -> &Arc<PathLockRegistry> {
        &self.locks
    }

    pub fn items(&self) -> &Arc<dyn ItemRepository> {
        &self.items
    }

    /// Start an anonymous session.
    pub fn session(&self) -> Session {
        self.session_as(ANONYMOUS)
    }

    /// Start a session acting as `user`.
    pub fn session_as(&self, user: impl Into<String>) -> Session {
        Session::new(self.locks.clone(), self.items.clone(), user)
    }

    /// Run `body` in a fresh anonymous session, saving on success. All locks
    /// are released when it returns.
    pub fn with_session<T>(&self, body: impl FnOnce(&mut Session) -> SdkResult<T>) -> SdkResult<T> {
        self.session().run(body)
    }

    /// Store `content` and make it the file at `path`, creating missing
    /// ancestor folders.
    ///
    /// Ancestors are locked from the repository root down before the file
    /// itself. Returns the committed file.
    pub fn deploy(&self, path: &RepoPath, content: impl Read, user: &str) -> SdkResult<ItemSnapshot> {
        if path.is_root() {
            return Err(SdkError::NotAFile(path.clone()));
        }
        let record = self.binaries.ingest(content)?;

        self.session_as(user).run(|session| {
            let locks = session.locks_mut();
            let ancestors = path.ancestors();
            let children = ancestors.iter().skip(1).chain(std::iter::once(path));
            for (folder, child) in ancestors.iter().zip(children) {
                link_child(locks, folder, child.name(), user)?;
            }

            let file = locks.write_lock(path, false)?;
            if !file.is_new() && !file.info().is_file() {
                return Err(SdkError::NotAFile(path.clone()));
            }
            file.set_content(&record, user);
            session.save()?;

            let committed = session
                .locks()
                .entry(path)
                .and_then(|entry| entry.snapshot().cloned())
                .ok_or_else(|| SdkError::NotAFile(path.clone()))?;
            info!(path = %path, sha1 = %record.sha1, size = record.length, user, "deployed");
            Ok(committed)
        })
    }

    /// The file at `path` with a stream over its content, or `None` if
    /// nothing is there.
    pub fn download(&self, path: &RepoPath) -> SdkResult<Option<(ItemSnapshot, BinaryStream)>> {
        let mut session = self.session();
        let Some(item) = session.locks_mut().read_lock(path)? else {
            return Ok(None);
        };
        let info = item
            .file_info()
            .ok_or_else(|| SdkError::NotAFile(path.clone()))?;
        let sha1 = info.sha1.ok_or_else(|| SdkError::NoContent { path: path.clone() })?;
        let stream = self
            .binaries
            .fetch(&sha1)?
            .ok_or_else(|| SdkError::ContentMissing {
                path: path.clone(),
                sha1,
            })?;
        debug!(path = %path, sha1 = %sha1, "download opened");
        Ok(Some((item, stream)))
    }

    /// Remove the item at `path` and everything beneath it. Binaries stay in
    /// the store since other paths may share them.
    ///
    /// The parent folder is write-locked before `path` and `path` before its
    /// descendants, matching the order [`deploy`](Self::deploy) uses.
    pub fn delete(&self, path: &RepoPath) -> SdkResult<bool> {
        let items = self.items.clone();
        self.with_session(|session| {
            let user = session.user().to_owned();
            let locks = session.locks_mut();
            let parent = path.parent();
            if let Some(parent) = &parent {
                locks.write_lock(parent, false)?;
            }
            if locks.write_lock(path, false)?.is_new() {
                locks.release_all();
                return Ok(false);
            }
            if let Some(parent) = &parent {
                let folder = locks.write_lock(parent, false)?;
                if folder.is_new() {
                    locks.remove(parent);
                } else {
                    folder.remove_child(path.name(), &user);
                }
            }

            let doomed = items.list(path)?;
            for item in doomed.iter().skip(1) {
                locks.write_lock(&item.path, false)?;
            }
            for item in doomed.iter().rev() {
                items.delete(&item.path)?;
                locks.remove(&item.path);
            }
            info!(path = %path, removed = doomed.len(), user = %user, "deleted");
            Ok(true)
        })
    }
}

/// Make sure `folder` exists and lists `child`, write-locking it only when it
/// has to change.
fn link_child(locks: &mut SessionLockManager, folder: &RepoPath, child: &str, user: &str) -> SdkResult<()> {
    if let Some(existing) = locks.read_lock(folder)? {
        match existing.children() {
            Some(children) if children.contains(child) => return Ok(()),
            Some(_) => {}
            None => return Err(SdkError::NotAFolder(folder.clone())),
        }
    }
    let working = locks.write_lock(folder, true)?;
    if working.is_new() {
        working.make_folder(user);
    } else if !working.info().is_folder() {
        return Err(SdkError::NotAFolder(folder.clone()));
    }
    working.add_child(child, user);
    Ok(())
}

impl std::fmt::Debug for Depot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Depot")
            .field("binaries", &self.binaries)
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn path(p: &str) -> RepoPath {
        RepoPath::parse(p).unwrap()
    }

    fn read_all(mut stream: BinaryStream) -> Vec<u8> {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn deploy_creates_ancestor_folders() {
        let depot = Depot::in_memory().unwrap();
        let file = depot
            .deploy(&path("libs:org/acme/app.jar"), &b"jar bytes"[..], "alice")
            .unwrap();
        assert_eq!(file.size(), 9);
        assert_eq!(file.created_by, "alice");

        let root = depot.items().load(&path("libs:")).unwrap().unwrap();
        assert!(root.children().unwrap().contains("org"));
        let acme = depot.items().load(&path("libs:org/acme")).unwrap().unwrap();
        assert!(acme.children().unwrap().contains("app.jar"));
        assert!(depot.registry().is_empty());
    }

    #[test]
    fn download_streams_deployed_content() {
        let depot = Depot::in_memory().unwrap();
        depot.deploy(&path("libs:a.txt"), &b"hello"[..], "alice").unwrap();

        let (item, stream) = depot.download(&path("libs:a.txt")).unwrap().unwrap();
        assert_eq!(item.size(), 5);
        assert_eq!(read_all(stream), b"hello");
        assert!(depot.download(&path("libs:missing.txt")).unwrap().is_none());
        assert!(depot.registry().is_empty());
    }

    #[test]
    fn download_of_folder_is_rejected() {
        let depot = Depot::in_memory().unwrap();
        depot.deploy(&path("libs:org/a.txt"), &b"x"[..], "alice").unwrap();
        assert!(matches!(
            depot.download(&path("libs:org")),
            Err(SdkError::NotAFile(_))
        ));
    }

    #[test]
    fn deploy_over_folder_is_rejected() {
        let depot = Depot::in_memory().unwrap();
        depot.deploy(&path("libs:org/a.txt"), &b"x"[..], "alice").unwrap();
        assert!(matches!(
            depot.deploy(&path("libs:org"), &b"y"[..], "alice"),
            Err(SdkError::NotAFile(_))
        ));
        assert!(matches!(
            depot.deploy(&path("libs:org/a.txt/b.txt"), &b"y"[..], "alice"),
            Err(SdkError::NotAFolder(_))
        ));
        assert!(depot.registry().is_empty());
    }

    #[test]
    fn delete_removes_subtree_and_unlinks_parent() {
        let depot = Depot::in_memory().unwrap();
        depot.deploy(&path("libs:org/acme/a.jar"), &b"a"[..], "alice").unwrap();
        depot.deploy(&path("libs:org/acme/b.jar"), &b"b"[..], "alice").unwrap();
        depot.deploy(&path("libs:org/other.jar"), &b"o"[..], "alice").unwrap();

        assert!(depot.delete(&path("libs:org/acme")).unwrap());
        assert!(!depot.delete(&path("libs:org/acme")).unwrap());

        assert!(depot.items().load(&path("libs:org/acme/a.jar")).unwrap().is_none());
        let org = depot.items().load(&path("libs:org")).unwrap().unwrap();
        assert!(!org.children().unwrap().contains("acme"));
        assert!(org.children().unwrap().contains("other.jar"));

        // Content stays in the store.
        let record = depot.binaries().ingest(&b"a"[..]).unwrap();
        assert!(depot.binaries().exists(&record.sha1).unwrap());
        assert!(depot.registry().is_empty());
    }

    #[test]
    fn with_session_saves_body_changes() {
        let depot = Depot::in_memory().unwrap();
        depot
            .with_session(|s| {
                s.locks_mut()
                    .write_lock(&path("libs:notes"), false)?
                    .set_property("owner", "ops", "alice");
                Ok(())
            })
            .unwrap();
        let stored = depot.items().load(&path("libs:notes")).unwrap().unwrap();
        assert_eq!(stored.properties["owner"], "ops");
    }
}
