use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use depot_types::{BinaryRecord, Md5, Sha1, Sha256};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::put_or_delegate;
use crate::error::{StoreError, StoreResult};
use crate::staging::StagedBinary;
use crate::traits::{BinaryProvider, BinaryStream, ProviderKind};

/// Path value that opens a private in-memory database.
pub const IN_MEMORY_DB: &str = ":memory:";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS binary_blobs (
    sha1    TEXT PRIMARY KEY NOT NULL,
    md5     TEXT NOT NULL,
    sha256  TEXT NOT NULL,
    length  INTEGER NOT NULL,
    data    BLOB NOT NULL,
    created TEXT NOT NULL
);
";

/// Authoritative store keeping each binary as a row in a SQLite table.
///
/// The connection is serialized behind a mutex; SQLite handles the
/// cross-process side through WAL and the busy timeout. Busy and locked
/// errors surface as transient so a retry provider above can absorb them.
#[derive(Debug)]
pub struct BlobProvider {
    id: String,
    conn: Mutex<Connection>,
    next: Box<dyn BinaryProvider>,
}

impl BlobProvider {
    /// Open the database at `db_path` (or [`IN_MEMORY_DB`]) and create the
    /// table if needed.
    pub fn open(
        id: impl Into<String>,
        db_path: impl AsRef<Path>,
        next: Box<dyn BinaryProvider>,
    ) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        let conn = if db_path == Path::new(IN_MEMORY_DB) {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(db_path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn
        };
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            id: id.into(),
            conn: Mutex::new(conn),
            next,
        })
    }

    /// Checksums recorded for `sha1`, without loading the content.
    pub fn record(&self, sha1: &Sha1) -> StoreResult<Option<BinaryRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT md5, sha256, length FROM binary_blobs WHERE sha1 = ?1",
                params![sha1.to_hex()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);

        let Some((md5, sha256, length)) = row else {
            return Ok(None);
        };
        let corrupt = |reason: String| StoreError::Corrupt {
            sha1: *sha1,
            reason,
        };
        Ok(Some(BinaryRecord::new(
            *sha1,
            Md5::from_hex(&md5).map_err(|e| corrupt(e.to_string()))?,
            Sha256::from_hex(&sha256).map_err(|e| corrupt(e.to_string()))?,
            u64::try_from(length).map_err(|e| corrupt(e.to_string()))?,
        )))
    }

    /// Number of stored rows.
    pub fn count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM binary_blobs", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }

    fn load(&self, sha1: &Sha1) -> StoreResult<Option<Vec<u8>>> {
        let data = self
            .conn
            .lock()
            .query_row(
                "SELECT data FROM binary_blobs WHERE sha1 = ?1",
                params![sha1.to_hex()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }
}

impl BinaryProvider for BlobProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Blob
    }

    fn get(&self, sha1: &Sha1) -> StoreResult<Option<BinaryStream>> {
        match self.load(sha1)? {
            Some(data) => {
                debug!(provider = %self.id, sha1 = %sha1, len = data.len(), "blob hit");
                Ok(Some(Box::new(Cursor::new(data))))
            }
            None => self.next.get(sha1),
        }
    }

    fn put(&self, staged: &StagedBinary) -> StoreResult<BinaryRecord> {
        let record = *staged.record();
        let mut data = Vec::with_capacity(record.length as usize);
        staged.open()?.read_to_end(&mut data)?;

        let inserted = self.conn.lock().execute(
            "INSERT OR IGNORE INTO binary_blobs (sha1, md5, sha256, length, data, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.sha1.to_hex(),
                record.md5.to_hex(),
                record.sha256.to_hex(),
                record.length as i64,
                data,
                chrono::Utc::now().to_rfc3339(),
            ],
        );
        match inserted {
            Ok(0) => debug!(provider = %self.id, sha1 = %record.sha1, "blob already stored"),
            Ok(_) => debug!(provider = %self.id, sha1 = %record.sha1, len = record.length, "stored blob"),
            Err(e) => return put_or_delegate(&self.id, Err(e.into()), staged, self.next.as_ref()),
        }
        Ok(record)
    }

    fn exists(&self, sha1: &Sha1) -> StoreResult<bool> {
        let found = self
            .conn
            .lock()
            .query_row(
                "SELECT 1 FROM binary_blobs WHERE sha1 = ?1",
                params![sha1.to_hex()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if found {
            return Ok(true);
        }
        self.next.exists(sha1)
    }

    fn delete(&self, sha1: &Sha1) -> StoreResult<bool> {
        let removed = self.conn.lock().execute(
            "DELETE FROM binary_blobs WHERE sha1 = ?1",
            params![sha1.to_hex()],
        )?;
        if removed > 0 {
            debug!(provider = %self.id, sha1 = %sha1, "deleted blob");
        }
        Ok(self.next.delete(sha1)? || removed > 0)
    }

    fn next(&self) -> Option<&dyn BinaryProvider> {
        Some(self.next.as_ref())
    }
}
