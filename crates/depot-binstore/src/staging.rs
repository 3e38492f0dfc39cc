use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use depot_crypto::ChecksumReader;
use depot_types::{BinaryRecord, Sha1};
use tempfile::NamedTempFile;

/// An upload spooled to a temporary file with its checksums computed.
///
/// Staging happens once, at the facade. Providers reopen the spooled file as
/// often as they need, which lets a retrying provider re-run a failed `put`
/// and a cache store a copy after the authoritative provider has.
pub struct StagedBinary {
    record: BinaryRecord,
    file: NamedTempFile,
}

impl StagedBinary {
    /// Spool `reader` into a temp file under `dir` (the system temp directory
    /// when `None`).
    pub fn stage<R: Read>(dir: Option<&Path>, reader: R) -> io::Result<Self> {
        let mut file = match dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        let mut reader = ChecksumReader::new(reader);
        io::copy(&mut reader, &mut file)?;
        file.flush()?;
        Ok(Self {
            record: reader.finish(),
            file,
        })
    }

    /// Stage an in-memory buffer.
    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        Self::stage(None, data)
    }

    pub fn record(&self) -> &BinaryRecord {
        &self.record
    }

    pub fn sha1(&self) -> &Sha1 {
        &self.record.sha1
    }

    pub fn length(&self) -> u64 {
        self.record.length
    }

    /// Open an independent read handle positioned at the start.
    pub fn open(&self) -> io::Result<File> {
        self.file.reopen()
    }

    /// Read the whole staged content into memory.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.record.length as usize);
        self.open()?.read_to_end(&mut data)?;
        Ok(data)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl std::fmt::Debug for StagedBinary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedBinary")
            .field("sha1", &self.record.sha1)
            .field("length", &self.record.length)
            .finish()
    }
}
