//! Open file handles.
//!
//! A [`FileHandle`] is a cursor plus an access mode over one `file_meta` row.
//! Nothing about the handle itself is persisted: the size and content always
//! come from the store, so several handles on the same file see each other's
//! writes as soon as they commit.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

use crate::db::{self, FileMeta};
use crate::engine;
use crate::error::{DbfsError, DbfsResult};
use crate::path::key_path;
use crate::types::{FileInfo, now_micros};

/// Shared SQLite connection.
pub(crate) type DbHandle = Arc<Mutex<Connection>>;

/// An open file.
///
/// Implements [`Read`], [`Write`] and [`Seek`], so it can be handed to
/// `BufReader`, `io::copy` and friends. Reads are short: one call returns at
/// most the remainder of the current block.
pub struct FileHandle {
    db: DbHandle,
    meta_id: i64,
    full_path: String,
    block_size: u64,
    allow_read: bool,
    allow_write: bool,
    offset: u64,
    cancel: Arc<AtomicBool>,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("meta_id", &self.meta_id)
            .field("full_path", &self.full_path)
            .field("block_size", &self.block_size)
            .field("allow_read", &self.allow_read)
            .field("allow_write", &self.allow_write)
            .field("offset", &self.offset)
            .finish()
    }
}

impl FileHandle {
    pub(crate) fn new(
        db: DbHandle,
        cancel: Arc<AtomicBool>,
        meta: &FileMeta,
        allow_read: bool,
        allow_write: bool,
        offset: u64,
    ) -> Self {
        Self {
            db,
            meta_id: meta.id,
            full_path: meta.full_path.clone(),
            block_size: meta.block_size,
            allow_read,
            allow_write,
            offset,
            cancel,
        }
    }

    /// Normalized path this handle was opened with.
    pub fn path(&self) -> &str {
        key_path(&self.full_path)
    }

    /// Block size of the underlying file.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Current cursor.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn can_read(&self) -> bool {
        self.allow_read
    }

    pub fn can_write(&self) -> bool {
        self.allow_write
    }

    fn load_meta(&self, conn: &Connection) -> DbfsResult<FileMeta> {
        db::find_meta_by_id(conn, self.meta_id)?
            .ok_or_else(|| DbfsError::not_exist(key_path(&self.full_path)))
    }

    /// Read at `offset` without moving the cursor.
    ///
    /// Returns 0 at end-of-file. Never crosses a block boundary.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> DbfsResult<usize> {
        if !self.allow_read {
            return Err(DbfsError::invalid(format!(
                "{} not opened for reading",
                self.path()
            )));
        }
        let conn = self.db.lock();
        let meta = self.load_meta(&conn)?;
        engine::read_at(&conn, &meta, offset, buf)
    }

    /// Read at the cursor and advance it.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> DbfsResult<usize> {
        let n = self.read_at(self.offset, buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    /// Write all of `buf` at the cursor and advance it.
    ///
    /// Every block touched and the size update commit in one transaction.
    pub fn write_bytes(&mut self, buf: &[u8]) -> DbfsResult<usize> {
        if !self.allow_write {
            return Err(DbfsError::invalid(format!(
                "{} not opened for writing",
                self.path()
            )));
        }
        let mut conn = self.db.lock();
        // An interrupt only cancels the write that holds the connection.
        self.cancel.store(false, Ordering::Release);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let meta = self.load_meta(&tx)?;
        let outcome =
            engine::write_at(&tx, &meta, self.offset, buf, now_micros(), &self.cancel)?;
        tx.commit()?;

        self.offset = outcome.end;
        Ok(buf.len())
    }

    /// Move the cursor. Seeking past end-of-file is allowed.
    pub fn seek_to(&mut self, pos: SeekFrom) -> DbfsResult<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.offset.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let size = {
                    let conn = self.db.lock();
                    self.load_meta(&conn)?.file_size
                };
                size.checked_add_signed(delta)
            }
        };
        let target = target.ok_or_else(|| {
            DbfsError::invalid(format!("seek {:?} from {} is out of range", pos, self.offset))
        })?;
        self.offset = target;
        Ok(target)
    }

    /// Drop all content and reset the size to zero. The cursor stays put.
    pub fn truncate(&mut self) -> DbfsResult<()> {
        if !self.allow_write {
            return Err(DbfsError::invalid(format!(
                "{} not opened for writing",
                self.path()
            )));
        }
        let mut conn = self.db.lock();
        truncate_file(&mut conn, self.meta_id)
    }

    /// Current size, timestamps and name.
    pub fn stat(&self) -> DbfsResult<FileInfo> {
        let conn = self.db.lock();
        let meta = self.load_meta(&conn)?;
        Ok(FileInfo::from_meta(&meta))
    }

    /// Release the handle. Nothing is flushed; every write already committed.
    pub fn close(self) -> DbfsResult<()> {
        debug!(path = %self.path(), offset = self.offset, "close");
        Ok(())
    }
}

/// Set the size to zero and delete every block, atomically.
pub(crate) fn truncate_file(conn: &mut Connection, meta_id: i64) -> DbfsResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    db::reset_meta_size(&tx, meta_id, now_micros())?;
    let removed = db::delete_blocks(&tx, meta_id)?;
    tx.commit()?;
    debug!(meta_id, removed, "truncate");
    Ok(())
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_bytes(buf)?)
    }
}

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.seek_to(pos)?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.offset)
    }
}
