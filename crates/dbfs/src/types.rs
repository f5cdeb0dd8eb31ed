//! Open flags and file info.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::db::FileMeta;
use crate::path::key_name;

/// File info returned by `stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Last path segment.
    pub name: String,
    /// Logical size in bytes.
    pub size: u64,
    /// Block size the file was created with.
    pub block_size: u64,
    /// Last successful write, truncate or create.
    pub mod_time: SystemTime,
    /// Creation time.
    pub create_time: SystemTime,
    /// Always false; there are no directories.
    pub is_dir: bool,
}

impl FileInfo {
    pub(crate) fn from_meta(meta: &FileMeta) -> Self {
        Self {
            name: key_name(&meta.full_path).to_string(),
            size: meta.file_size,
            block_size: meta.block_size,
            mod_time: micros_to_time(meta.modify_ts),
            create_time: micros_to_time(meta.create_ts),
            is_dir: false,
        }
    }

    /// Returns true for regular files, which is every file.
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }
}

/// Microseconds since the epoch, the unit timestamps are stored in.
pub(crate) fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

fn micros_to_time(ts: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_micros(ts.max(0) as u64)
}

/// Open file flags.
///
/// Access is derived the way `open(2)` does it: `write` without `read` is
/// write-only, both is read-write, anything else is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Start the cursor at end-of-file.
    pub append: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Read-write access to an existing file.
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Write-only access to an existing file.
    pub fn write_only() -> Self {
        Self {
            read: false,
            write: true,
            ..Default::default()
        }
    }

    /// Create with read-write access.
    pub fn create() -> Self {
        Self {
            create: true,
            ..Self::read_write()
        }
    }

    /// Create exclusively (fail if exists).
    pub fn create_exclusive() -> Self {
        Self {
            exclusive: true,
            ..Self::create()
        }
    }

    /// Create and truncate.
    pub fn create_truncate() -> Self {
        Self {
            truncate: true,
            ..Self::create()
        }
    }

    /// Create if needed and position writes at end-of-file.
    pub fn append() -> Self {
        Self {
            append: true,
            ..Self::create()
        }
    }

    /// `(allow_read, allow_write)` for a handle opened with these flags.
    pub fn access(&self) -> (bool, bool) {
        match (self.read, self.write) {
            (false, true) => (false, true),
            (true, true) => (true, true),
            _ => (true, false),
        }
    }
}
