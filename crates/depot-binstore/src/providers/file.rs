use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use depot_types::{BinaryRecord, Sha1};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{put_or_delegate, shard_path, PRE_DIR};
use crate::error::{StoreError, StoreResult};
use crate::staging::StagedBinary;
use crate::traits::{BinaryProvider, BinaryStream, ProviderKind};

/// Authoritative file store.
///
/// Layout:
/// ```text
/// {dir}/
///   _pre/            in-flight writes
///   a9/a9993e36...   one file per binary, sharded by SHA-1 prefix
/// ```
///
/// Writes land in `_pre/` and are renamed into their shard once complete, so
/// a reader never sees a partially written binary.
#[derive(Debug)]
pub struct FileProvider {
    id: String,
    dir: PathBuf,
    next: Box<dyn BinaryProvider>,
}

impl FileProvider {
    /// Open (or create) a file store rooted at `dir`.
    pub fn new(
        id: impl Into<String>,
        dir: impl AsRef<Path>,
        next: Box<dyn BinaryProvider>,
    ) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(PRE_DIR))?;
        Ok(Self {
            id: id.into(),
            dir,
            next,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the binary for `sha1` lives, whether or not it exists.
    pub fn binary_path(&self, sha1: &Sha1) -> PathBuf {
        shard_path(&self.dir, sha1)
    }

    fn write_binary(&self, staged: &StagedBinary, target: &Path) -> io::Result<()> {
        if let Some(shard) = target.parent() {
            fs::create_dir_all(shard)?;
        }
        let mut tmp = NamedTempFile::new_in(self.dir.join(PRE_DIR))?;
        io::copy(&mut staged.open()?, &mut tmp)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(target).map_err(|e| e.error)?;
        Ok(())
    }
}

impl BinaryProvider for FileProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::FileSystem
    }

    fn get(&self, sha1: &Sha1) -> StoreResult<Option<BinaryStream>> {
        match File::open(self.binary_path(sha1)) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.next.get(sha1),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, staged: &StagedBinary) -> StoreResult<BinaryRecord> {
        let target = self.binary_path(staged.sha1());
        match fs::metadata(&target) {
            Ok(meta) if meta.len() == staged.length() => {
                debug!(provider = %self.id, sha1 = %staged.sha1(), "binary already on disk");
                return Ok(*staged.record());
            }
            Ok(_) | Err(_) => {}
        }
        let written = self.write_binary(staged, &target).map_err(StoreError::from);
        if written.is_ok() {
            debug!(
                provider = %self.id,
                sha1 = %staged.sha1(),
                len = staged.length(),
                "wrote binary"
            );
        }
        put_or_delegate(&self.id, written, staged, self.next.as_ref())
    }

    fn exists(&self, sha1: &Sha1) -> StoreResult<bool> {
        if self.binary_path(sha1).is_file() {
            return Ok(true);
        }
        self.next.exists(sha1)
    }

    fn delete(&self, sha1: &Sha1) -> StoreResult<bool> {
        let local = match fs::remove_file(self.binary_path(sha1)) {
            Ok(()) => {
                debug!(provider = %self.id, sha1 = %sha1, "deleted binary");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        Ok(self.next.delete(sha1)? || local)
    }

    fn next(&self) -> Option<&dyn BinaryProvider> {
        Some(self.next.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::providers::{BlobProvider, EmptyProvider, IN_MEMORY_DB};

    fn provider(dir: &Path) -> FileProvider {
        FileProvider::new("file-system", dir, Box::new(EmptyProvider)).unwrap()
    }

    fn read(stream: BinaryStream) -> Vec<u8> {
        let mut out = Vec::new();
        let mut stream = stream;
        stream.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let fp = provider(dir.path());
        let staged = StagedBinary::from_bytes(b"jar bytes").unwrap();

        let record = fp.put(&staged).unwrap();
        assert_eq!(record, *staged.record());
        assert!(fp.exists(staged.sha1()).unwrap());

        let stream = fp.get(staged.sha1()).unwrap().expect("stored");
        assert_eq!(read(stream), b"jar bytes");
    }

    #[test]
    fn layout_is_sharded_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let fp = provider(dir.path());
        let staged = StagedBinary::from_bytes(b"abc").unwrap();
        fp.put(&staged).unwrap();

        let expected = dir
            .path()
            .join("a9")
            .join("a9993e364706816aba3e25717850c26c9cd0d89d");
        assert!(expected.is_file());
        assert_eq!(fp.binary_path(staged.sha1()), expected);
    }

    #[test]
    fn missing_binary_falls_through_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fp = provider(dir.path());
        let sha1 = Sha1::from_bytes([0xee; 20]);
        assert!(fp.get(&sha1).unwrap().is_none());
        assert!(!fp.exists(&sha1).unwrap());
        assert!(!fp.delete(&sha1).unwrap());
    }

    #[test]
    fn second_put_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let fp = provider(dir.path());
        let staged = StagedBinary::from_bytes(b"same").unwrap();
        let first = fp.put(&staged).unwrap();
        let modified = fs::metadata(fp.binary_path(staged.sha1()))
            .unwrap()
            .modified()
            .unwrap();

        let second = fp.put(&staged).unwrap();
        assert_eq!(first, second);
        let modified_again = fs::metadata(fp.binary_path(staged.sha1()))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(modified, modified_again);
    }

    #[test]
    fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let fp = provider(dir.path());
        let staged = StagedBinary::from_bytes(b"to delete").unwrap();
        fp.put(&staged).unwrap();

        assert!(fp.delete(staged.sha1()).unwrap());
        assert!(!fp.exists(staged.sha1()).unwrap());
        assert!(!fp.delete(staged.sha1()).unwrap());
    }

    #[test]
    fn delete_reaches_every_store_holding_the_binary() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobProvider::open("blob", IN_MEMORY_DB, Box::new(EmptyProvider)).unwrap();
        let fp = FileProvider::new("file-system", dir.path(), Box::new(blob)).unwrap();
        let staged = StagedBinary::from_bytes(b"in both").unwrap();
        fp.put(&staged).unwrap();
        fp.next.put(&staged).unwrap();

        assert!(fp.delete(staged.sha1()).unwrap());
        assert!(!fp.exists(staged.sha1()).unwrap());
        assert!(fp.get(staged.sha1()).unwrap().is_none());
    }

    #[test]
    fn pre_dir_is_empty_after_writes() {
        let dir = tempfile::tempdir().unwrap();
        let fp = provider(dir.path());
        for i in 0..5u8 {
            fp.put(&StagedBinary::from_bytes(&[i; 10]).unwrap()).unwrap();
        }
        let leftovers = fs::read_dir(dir.path().join(PRE_DIR)).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
