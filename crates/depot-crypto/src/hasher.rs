use std::io::{self, Read, Write};

use depot_types::{BinaryRecord, Md5, Sha1, Sha256};
use md5::Digest;

/// Incremental SHA-1 / MD5 / SHA-256 calculator.
///
/// All three digests are computed in a single pass so an upload only has to
/// be read once, no matter how many checksums the repository keeps for it.
#[derive(Clone, Default)]
pub struct ChecksumCalculator {
    sha1: sha1::Sha1,
    md5: md5::Md5,
    sha256: sha2::Sha256,
    length: u64,
}

impl ChecksumCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more content.
    pub fn update(&mut self, data: &[u8]) {
        self.sha1.update(data);
        self.md5.update(data);
        self.sha256.update(data);
        self.length += data.len() as u64;
    }

    /// Bytes consumed so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Finish and produce the binary record for everything fed so far.
    pub fn finish(self) -> BinaryRecord {
        BinaryRecord::new(
            Sha1::from_bytes(self.sha1.finalize().into()),
            Md5::from_bytes(self.md5.finalize().into()),
            Sha256::from_bytes(self.sha256.finalize().into()),
            self.length,
        )
    }

    /// Checksums of an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> BinaryRecord {
        let mut calc = Self::new();
        calc.update(data);
        calc.finish()
    }

    /// Drain `reader` to the end and return its checksums.
    pub fn of_reader<R: Read>(reader: R) -> io::Result<BinaryRecord> {
        let mut reader = ChecksumReader::new(reader);
        io::copy(&mut reader, &mut io::sink())?;
        Ok(reader.finish())
    }
}

impl Write for ChecksumCalculator {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A reader adapter that checksums everything read through it.
pub struct ChecksumReader<R> {
    inner: R,
    calc: ChecksumCalculator,
}

impl<R: Read> ChecksumReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            calc: ChecksumCalculator::new(),
        }
    }

    /// Bytes read so far.
    pub fn length(&self) -> u64 {
        self.calc.length()
    }

    /// Checksums of the bytes read so far. Unread input is not included.
    pub fn finish(self) -> BinaryRecord {
        self.calc.finish()
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.calc.update(&buf[..n]);
        Ok(n)
    }
}
