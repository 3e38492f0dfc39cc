use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use depot_crypto::ChecksumReader;
use depot_types::{BinaryRecord, Sha1};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{shard_path, PRE_DIR};
use crate::error::{StoreError, StoreResult};
use crate::staging::StagedBinary;
use crate::traits::{BinaryProvider, BinaryStream, ProviderKind};

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    len: u64,
    last_used: u64,
}

/// LRU bookkeeping for the cache directory.
#[derive(Debug, Default)]
struct CacheIndex {
    entries: HashMap<Sha1, CacheEntry>,
    total: u64,
    clock: u64,
}

impl CacheIndex {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, sha1: &Sha1) -> bool {
        let now = self.tick();
        match self.entries.get_mut(sha1) {
            Some(entry) => {
                entry.last_used = now;
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, sha1: Sha1, len: u64) {
        let last_used = self.tick();
        if let Some(old) = self.entries.insert(sha1, CacheEntry { len, last_used }) {
            self.total -= old.len;
        }
        self.total += len;
    }

    fn remove(&mut self, sha1: &Sha1) -> Option<CacheEntry> {
        let entry = self.entries.remove(sha1)?;
        self.total -= entry.len;
        Some(entry)
    }

    /// Drop least recently used entries until `total <= max`, never evicting
    /// `keep`. Returns the evicted checksums.
    fn evict_to(&mut self, max: u64, keep: Option<&Sha1>) -> Vec<Sha1> {
        let mut evicted = Vec::new();
        while self.total > max {
            let victim = self
                .entries
                .iter()
                .filter(|(sha1, _)| Some(*sha1) != keep)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(sha1, _)| *sha1);
            match victim {
                Some(sha1) => {
                    self.remove(&sha1);
                    evicted.push(sha1);
                }
                None => break,
            }
        }
        evicted
    }
}

/// Bounded local file cache in front of the next provider.
///
/// `get` serves a local copy when present and otherwise fetches from `next`,
/// verifying and keeping a copy on the way back. `put` writes through to
/// `next` first; the cache is never the source of truth, so failures to
/// populate it are logged and ignored. When the total size exceeds
/// `max_size` the least recently used files are evicted. Binaries larger
/// than `max_size` are streamed through without being cached.
#[derive(Debug)]
pub struct FileCacheProvider {
    id: String,
    dir: PathBuf,
    max_size: u64,
    index: Mutex<CacheIndex>,
    next: Box<dyn BinaryProvider>,
}

impl FileCacheProvider {
    /// Open a cache rooted at `dir`, indexing binaries already present.
    pub fn new(
        id: impl Into<String>,
        dir: impl AsRef<Path>,
        max_size: u64,
        next: Box<dyn BinaryProvider>,
    ) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let pre = dir.join(PRE_DIR);
        if pre.exists() {
            fs::remove_dir_all(&pre)?;
        }
        fs::create_dir_all(&pre)?;

        let provider = Self {
            id: id.into(),
            index: Mutex::new(scan_cache_dir(&dir)),
            dir,
            max_size,
            next,
        };
        let evicted = provider.index.lock().evict_to(max_size, None);
        provider.remove_files(&evicted);
        debug!(
            provider = %provider.id,
            cached = provider.cached_count(),
            bytes = provider.cached_bytes(),
            "cache index loaded"
        );
        Ok(provider)
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Total bytes currently cached.
    pub fn cached_bytes(&self) -> u64 {
        self.index.lock().total
    }

    /// Number of binaries currently cached.
    pub fn cached_count(&self) -> usize {
        self.index.lock().entries.len()
    }

    /// Whether `sha1` is in the local cache (ignores the rest of the chain).
    pub fn is_cached(&self, sha1: &Sha1) -> bool {
        self.index.lock().entries.contains_key(sha1)
    }

    fn remove_files(&self, evicted: &[Sha1]) {
        for sha1 in evicted {
            if let Err(e) = fs::remove_file(shard_path(&self.dir, sha1)) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(provider = %self.id, sha1 = %sha1, error = %e, "failed to evict cached binary");
                }
            }
            debug!(provider = %self.id, sha1 = %sha1, "evicted");
        }
    }

    /// Record a file that now exists at its shard path and evict to fit.
    fn admit(&self, sha1: &Sha1, len: u64) {
        let evicted = {
            let mut index = self.index.lock();
            index.insert(*sha1, len);
            index.evict_to(self.max_size, Some(sha1))
        };
        self.remove_files(&evicted);
    }

    fn open_cached(&self, sha1: &Sha1) -> io::Result<Option<File>> {
        if !self.index.lock().touch(sha1) {
            return Ok(None);
        }
        match File::open(shard_path(&self.dir, sha1)) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Removed behind our back; forget it and refetch.
                self.index.lock().remove(sha1);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Copy `stream` into the cache, verifying it hashes to `sha1`. Returns a
    /// handle positioned at the start of the copy.
    fn fill(&self, sha1: &Sha1, stream: BinaryStream) -> StoreResult<File> {
        let mut tmp = NamedTempFile::new_in(self.dir.join(PRE_DIR))?;
        let mut reader = ChecksumReader::new(stream);
        io::copy(&mut reader, &mut tmp)?;
        tmp.flush()?;
        let record = reader.finish();
        if record.sha1 != *sha1 {
            return Err(StoreError::Corrupt {
                sha1: *sha1,
                reason: format!("next provider returned content hashing to {}", record.sha1),
            });
        }

        if record.length > self.max_size {
            debug!(provider = %self.id, sha1 = %sha1, len = record.length, "too large to cache");
            let mut file = tmp.into_file();
            file.seek(SeekFrom::Start(0))?;
            return Ok(file);
        }

        let target = shard_path(&self.dir, sha1);
        if let Some(shard) = target.parent() {
            fs::create_dir_all(shard)?;
        }
        let handle = tmp.reopen()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        self.admit(sha1, record.length);
        debug!(provider = %self.id, sha1 = %sha1, len = record.length, "cached");
        Ok(handle)
    }

    fn cache_staged(&self, staged: &StagedBinary) -> io::Result<()> {
        let target = shard_path(&self.dir, staged.sha1());
        if let Some(shard) = target.parent() {
            fs::create_dir_all(shard)?;
        }
        let mut tmp = NamedTempFile::new_in(self.dir.join(PRE_DIR))?;
        io::copy(&mut staged.open()?, &mut tmp)?;
        tmp.flush()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        self.admit(staged.sha1(), staged.length());
        Ok(())
    }
}

/// Index binaries left in a cache directory by a previous run.
///
/// Older files are treated as less recently used. Anything that is not a
/// checksum-named file in a shard directory is ignored.
fn scan_cache_dir(dir: &Path) -> CacheIndex {
    let mut found: Vec<(Sha1, u64, std::time::SystemTime)> = WalkDir::new(dir)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .is_some_and(|name| name != PRE_DIR)
        })
        .filter_map(|entry| {
            let sha1 = Sha1::from_hex(entry.file_name().to_str()?).ok()?;
            let meta = entry.metadata().ok()?;
            let modified = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
            Some((sha1, meta.len(), modified))
        })
        .collect();
    found.sort_by_key(|(_, _, modified)| *modified);

    let mut index = CacheIndex::default();
    for (sha1, len, _) in found {
        index.insert(sha1, len);
    }
    index
}

impl BinaryProvider for FileCacheProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::CacheFs
    }

    fn get(&self, sha1: &Sha1) -> StoreResult<Option<BinaryStream>> {
        if let Some(file) = self.open_cached(sha1)? {
            debug!(provider = %self.id, sha1 = %sha1, "cache hit");
            return Ok(Some(Box::new(file)));
        }
        debug!(provider = %self.id, sha1 = %sha1, "cache miss");
        match self.next.get(sha1)? {
            Some(stream) => Ok(Some(Box::new(self.fill(sha1, stream)?))),
            None => Ok(None),
        }
    }

    fn put(&self, staged: &StagedBinary) -> StoreResult<BinaryRecord> {
        let record = self.next.put(staged)?;
        if staged.length() <= self.max_size && !self.is_cached(staged.sha1()) {
            if let Err(e) = self.cache_staged(staged) {
                warn!(provider = %self.id, sha1 = %staged.sha1(), error = %e, "failed to populate cache");
            }
        }
        Ok(record)
    }

    fn exists(&self, sha1: &Sha1) -> StoreResult<bool> {
        if self.is_cached(sha1) {
            return Ok(true);
        }
        self.next.exists(sha1)
    }

    fn delete(&self, sha1: &Sha1) -> StoreResult<bool> {
        if self.index.lock().remove(sha1).is_some() {
            self.remove_files(&[*sha1]);
        }
        self.next.delete(sha1)
    }

    fn next(&self) -> Option<&dyn BinaryProvider> {
        Some(self.next.as_ref())
    }
}
