//! The store handle and path-level operations.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rusqlite::{Connection, InterruptHandle, TransactionBehavior};
use tracing::{debug, info};

use crate::config::DbfsConfig;
use crate::db;
use crate::error::{DbfsError, DbfsResult};
use crate::file::{DbHandle, FileHandle, truncate_file};
use crate::path::path_key;
use crate::types::{FileInfo, OpenFlags, now_micros};

/// A dbfs store.
///
/// Owns one SQLite connection; clones share it. Every operation locks the
/// connection for as long as its statements run.
#[derive(Clone)]
pub struct Dbfs {
    db: DbHandle,
    interrupt: Arc<InterruptHandle>,
    cancel: Arc<AtomicBool>,
    config: Arc<DbfsConfig>,
}

impl std::fmt::Debug for Dbfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dbfs").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Dbfs {
    /// Wrap an existing connection, creating the tables if needed.
    pub fn new(conn: Connection, config: DbfsConfig) -> DbfsResult<Self> {
        config
            .validate()
            .map_err(|e| DbfsError::invalid(e.to_string()))?;
        conn.busy_timeout(config.busy_timeout())?;
        db::init_schema(&conn)?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            interrupt,
            cancel: Arc::new(AtomicBool::new(false)),
            config: Arc::new(config),
        })
    }

    /// Open or create a database file.
    pub fn open_path(path: impl AsRef<Path>, config: DbfsConfig) -> DbfsResult<Self> {
        let path = path.as_ref();
        config
            .validate()
            .map_err(|e| DbfsError::invalid(e.to_string()))?;
        let conn = Connection::open(path)?;
        conn.busy_timeout(config.busy_timeout())?;
        let mode: String = conn.pragma_update_and_check(
            None,
            "journal_mode",
            &config.journal_mode,
            |row| row.get(0),
        )?;
        info!(path = %path.display(), journal_mode = %mode, "opened dbfs database");
        Self::new(conn, config)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory(config: DbfsConfig) -> DbfsResult<Self> {
        Self::new(Connection::open_in_memory()?, config)
    }

    pub fn config(&self) -> &DbfsConfig {
        &self.config
    }

    /// Cancel the operation currently running on the connection.
    ///
    /// A write in progress stops before its next block; any other statement
    /// is aborted by SQLite. The interrupted operation fails with a store
    /// error (see [`DbfsError::is_interrupted`]). Writes are transactional, so
    /// an interrupted write leaves no partial blocks. With nothing running
    /// this is a no-op.
    pub fn interrupt(&self) {
        self.cancel.store(true, Ordering::Release);
        self.interrupt.interrupt();
    }

    // =========================================================================
    // Opening
    // =========================================================================

    /// Open an existing file read-only.
    pub fn open(&self, path: &str) -> DbfsResult<FileHandle> {
        self.open_file(path, OpenFlags::read())
    }

    /// Open read-write, creating the file or truncating it if it exists.
    pub fn create(&self, path: &str) -> DbfsResult<FileHandle> {
        self.open_file(path, OpenFlags::create_truncate())
    }

    /// Open with explicit flags.
    pub fn open_file(&self, path: &str, flags: OpenFlags) -> DbfsResult<FileHandle> {
        let key = path_key(path);
        let (allow_read, allow_write) = flags.access();
        let mut conn = self.db.lock();

        let mut meta = db::find_meta_by_path(&conn, &key)?;

        if allow_write && flags.create {
            if meta.is_some() {
                if flags.exclusive {
                    return Err(DbfsError::exist(path));
                }
            } else {
                let inserted =
                    db::insert_meta(&conn, &key, self.config.block_size, now_micros())?;
                match inserted {
                    Some(id) => debug!(
                        path,
                        key = %key,
                        id,
                        block_size = self.config.block_size,
                        "created file"
                    ),
                    // lost a race with another process
                    None if flags.exclusive => return Err(DbfsError::exist(path)),
                    None => {}
                }
                meta = db::find_meta_by_path(&conn, &key)?;
            }
        }

        let Some(mut meta) = meta else {
            return Err(DbfsError::not_exist(path));
        };

        if allow_write && flags.truncate {
            truncate_file(&mut conn, meta.id)?;
            meta.file_size = 0;
        }

        let offset = if allow_write && flags.append {
            meta.file_size
        } else {
            0
        };

        debug!(
            path,
            meta_id = meta.id,
            allow_read,
            allow_write,
            offset,
            "open"
        );
        Ok(FileHandle::new(
            self.db.clone(),
            self.cancel.clone(),
            &meta,
            allow_read,
            allow_write,
            offset,
        ))
    }

    // =========================================================================
    // Path operations
    // =========================================================================

    /// Move a file to a new path.
    ///
    /// Fails with `Exist` if another file already lives at `new_path`.
    pub fn rename(&self, old_path: &str, new_path: &str) -> DbfsResult<()> {
        let old_key = path_key(old_path);
        let new_key = path_key(new_path);
        let mut conn = self.db.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let meta = db::find_meta_by_path(&tx, &old_key)?
            .ok_or_else(|| DbfsError::not_exist(old_path))?;
        if old_key == new_key {
            return Ok(());
        }
        if db::find_meta_by_path(&tx, &new_key)?.is_some() {
            return Err(DbfsError::exist(new_path));
        }
        db::update_meta_path(&tx, meta.id, &new_key)?;
        tx.commit()?;

        debug!(from = %old_key, to = %new_key, meta_id = meta.id, "rename");
        Ok(())
    }

    /// Delete a file and all of its blocks.
    pub fn remove(&self, path: &str) -> DbfsResult<()> {
        let key = path_key(path);
        let mut conn = self.db.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let meta =
            db::find_meta_by_path(&tx, &key)?.ok_or_else(|| DbfsError::not_exist(path))?;
        let blocks = db::delete_blocks(&tx, meta.id)?;
        db::delete_meta(&tx, meta.id)?;
        tx.commit()?;

        debug!(key = %key, meta_id = meta.id, blocks, "remove");
        Ok(())
    }

    /// File info without opening a handle.
    pub fn stat(&self, path: &str) -> DbfsResult<FileInfo> {
        let conn = self.db.lock();
        db::find_meta_by_path(&conn, &path_key(path))?
            .map(|meta| FileInfo::from_meta(&meta))
            .ok_or_else(|| DbfsError::not_exist(path))
    }

    /// Check if a path exists.
    pub fn exists(&self, path: &str) -> DbfsResult<bool> {
        let conn = self.db.lock();
        Ok(db::find_meta_by_path(&conn, &path_key(path))?.is_some())
    }

    // =========================================================================
    // Convenience
    // =========================================================================

    /// Read entire file contents.
    pub fn read_to_end(&self, path: &str) -> DbfsResult<Vec<u8>> {
        let mut file = self.open(path)?;
        let mut data = Vec::new();
        let mut buf = vec![0u8; file.block_size() as usize];
        loop {
            let n = file.read_bytes(&mut buf)?;
            if n == 0 {
                return Ok(data);
            }
            data.extend_from_slice(&buf[..n]);
        }
    }

    /// Replace a file's contents, creating it if needed.
    pub fn write_all(&self, path: &str, data: &[u8]) -> DbfsResult<()> {
        let mut file = self.create(path)?;
        file.write_bytes(data)?;
        file.close()
    }
}
