//! SQLite tables for file metadata and file blocks.
//!
//! One `file_meta` row per logical file, zero or more `file_block` rows per
//! file keyed by `(meta_id, block_offset)`. Block data is stored unpadded:
//! anything past the end of a block's bytes reads as zeros.
//!
//! Every accessor takes a plain `&Connection`, so it works the same inside a
//! `rusqlite::Transaction` (which derefs to one).

use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};

/// A `file_meta` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub id: i64,
    /// Path key, see [`crate::path::path_key`].
    pub full_path: String,
    pub block_size: u64,
    pub file_size: u64,
    /// Microseconds since the Unix epoch.
    pub create_ts: i64,
    /// Microseconds since the Unix epoch.
    pub modify_ts: i64,
}

/// A `file_block` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub id: i64,
    /// Bumped on every update of the row.
    pub revision: i64,
    pub meta_id: i64,
    /// Offset of the block's first byte; a multiple of the file's block size.
    pub block_offset: u64,
    pub block_size: u64,
    /// At most `block_size` bytes.
    pub block_data: Vec<u8>,
}

pub(crate) const SCHEMA: &str = r#"
-- One row per logical file
CREATE TABLE IF NOT EXISTS file_meta (
    id INTEGER PRIMARY KEY,
    full_path TEXT NOT NULL UNIQUE,
    block_size INTEGER NOT NULL,
    file_size INTEGER NOT NULL,
    create_ts INTEGER NOT NULL,
    modify_ts INTEGER NOT NULL
);

-- File content, one row per touched block
CREATE TABLE IF NOT EXISTS file_block (
    id INTEGER PRIMARY KEY,
    revision INTEGER NOT NULL,
    meta_id INTEGER NOT NULL,
    block_offset INTEGER NOT NULL,
    block_size INTEGER NOT NULL,
    block_data BLOB NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_file_block_meta_offset ON file_block(meta_id, block_offset);
"#;

/// Create both tables if they are missing.
pub fn init_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(SCHEMA)
}

const META_COLUMNS: &str = "id, full_path, block_size, file_size, create_ts, modify_ts";

fn meta_from_row(row: &rusqlite::Row<'_>) -> SqliteResult<FileMeta> {
    let block_size: i64 = row.get(2)?;
    if block_size <= 0 {
        return Err(rusqlite::Error::IntegralValueOutOfRange(2, block_size));
    }
    let file_size: i64 = row.get(3)?;
    Ok(FileMeta {
        id: row.get(0)?,
        full_path: row.get(1)?,
        block_size: block_size as u64,
        file_size: file_size.max(0) as u64,
        create_ts: row.get(4)?,
        modify_ts: row.get(5)?,
    })
}

// =========================================================================
// Metadata
// =========================================================================

/// Look up a file by path key.
pub fn find_meta_by_path(conn: &Connection, key: &str) -> SqliteResult<Option<FileMeta>> {
    conn.query_row(
        &format!("SELECT {META_COLUMNS} FROM file_meta WHERE full_path = ?1"),
        params![key],
        meta_from_row,
    )
    .optional()
}

/// Look up a file by id.
pub fn find_meta_by_id(conn: &Connection, id: i64) -> SqliteResult<Option<FileMeta>> {
    conn.query_row(
        &format!("SELECT {META_COLUMNS} FROM file_meta WHERE id = ?1"),
        params![id],
        meta_from_row,
    )
    .optional()
}

/// Insert an empty file.
///
/// Returns the new id, or `None` when the key is already taken.
pub fn insert_meta(
    conn: &Connection,
    key: &str,
    block_size: u64,
    now: i64,
) -> SqliteResult<Option<i64>> {
    let inserted = conn.execute(
        "INSERT INTO file_meta (full_path, block_size, file_size, create_ts, modify_ts)
         VALUES (?1, ?2, 0, ?3, ?3)
         ON CONFLICT(full_path) DO NOTHING",
        params![key, block_size as i64, now],
    )?;
    Ok((inserted == 1).then(|| conn.last_insert_rowid()))
}

/// Record a completed write: always the modify time, the size only if it grew.
pub fn touch_meta(
    conn: &Connection,
    id: i64,
    new_size: Option<u64>,
    now: i64,
) -> SqliteResult<usize> {
    match new_size {
        Some(size) => conn.execute(
            "UPDATE file_meta SET file_size = ?1, modify_ts = ?2 WHERE id = ?3",
            params![size as i64, now, id],
        ),
        None => conn.execute(
            "UPDATE file_meta SET modify_ts = ?1 WHERE id = ?2",
            params![now, id],
        ),
    }
}

/// Reset a file's size to zero.
pub fn reset_meta_size(conn: &Connection, id: i64, now: i64) -> SqliteResult<usize> {
    conn.execute(
        "UPDATE file_meta SET file_size = 0, modify_ts = ?1 WHERE id = ?2",
        params![now, id],
    )
}

/// Point a file at a new path key.
pub fn update_meta_path(conn: &Connection, id: i64, key: &str) -> SqliteResult<usize> {
    conn.execute(
        "UPDATE file_meta SET full_path = ?1 WHERE id = ?2",
        params![key, id],
    )
}

/// Delete a file's metadata row. Blocks are deleted separately.
pub fn delete_meta(conn: &Connection, id: i64) -> SqliteResult<usize> {
    conn.execute("DELETE FROM file_meta WHERE id = ?1", params![id])
}

// =========================================================================
// Blocks
// =========================================================================

/// Fetch the block starting at `block_offset`, if one was ever written.
pub fn find_block(
    conn: &Connection,
    meta_id: i64,
    block_offset: u64,
) -> SqliteResult<Option<BlockRecord>> {
    conn.query_row(
        "SELECT id, revision, meta_id, block_offset, block_size, block_data
         FROM file_block WHERE meta_id = ?1 AND block_offset = ?2",
        params![meta_id, block_offset as i64],
        |row| {
            let block_offset: i64 = row.get(3)?;
            let block_size: i64 = row.get(4)?;
            Ok(BlockRecord {
                id: row.get(0)?,
                revision: row.get(1)?,
                meta_id: row.get(2)?,
                block_offset: block_offset as u64,
                block_size: block_size as u64,
                block_data: row.get(5)?,
            })
        },
    )
    .optional()
}

/// Insert a block, or replace its bytes and bump its revision.
pub fn upsert_block(
    conn: &Connection,
    meta_id: i64,
    block_offset: u64,
    block_size: u64,
    data: &[u8],
) -> SqliteResult<usize> {
    conn.execute(
        "INSERT INTO file_block (revision, meta_id, block_offset, block_size, block_data)
         VALUES (1, ?1, ?2, ?3, ?4)
         ON CONFLICT(meta_id, block_offset) DO UPDATE SET
             block_data = excluded.block_data,
             block_size = excluded.block_size,
             revision = file_block.revision + 1",
        params![meta_id, block_offset as i64, block_size as i64, data],
    )
}

/// Delete every block of a file.
pub fn delete_blocks(conn: &Connection, meta_id: i64) -> SqliteResult<usize> {
    conn.execute("DELETE FROM file_block WHERE meta_id = ?1", params![meta_id])
}

/// Number of stored blocks for a file.
pub fn count_blocks(conn: &Connection, meta_id: i64) -> SqliteResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_block WHERE meta_id = ?1",
        params![meta_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_meta_crud() {
        let conn = test_conn();

        let id = insert_meta(&conn, "0:a.log", 4, 100).unwrap().unwrap();
        let meta = find_meta_by_path(&conn, "0:a.log").unwrap().unwrap();
        assert_eq!(meta.id, id);
        assert_eq!(meta.block_size, 4);
        assert_eq!(meta.file_size, 0);
        assert_eq!(meta.create_ts, 100);
        assert_eq!(meta.modify_ts, 100);

        assert_eq!(touch_meta(&conn, id, Some(9), 200).unwrap(), 1);
        let meta = find_meta_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(meta.file_size, 9);
        assert_eq!(meta.modify_ts, 200);
        assert_eq!(meta.create_ts, 100);

        touch_meta(&conn, id, None, 300).unwrap();
        let meta = find_meta_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(meta.file_size, 9);
        assert_eq!(meta.modify_ts, 300);

        reset_meta_size(&conn, id, 400).unwrap();
        assert_eq!(find_meta_by_id(&conn, id).unwrap().unwrap().file_size, 0);

        update_meta_path(&conn, id, "0:b.log").unwrap();
        assert!(find_meta_by_path(&conn, "0:a.log").unwrap().is_none());
        assert!(find_meta_by_path(&conn, "0:b.log").unwrap().is_some());

        assert_eq!(delete_meta(&conn, id).unwrap(), 1);
        assert!(find_meta_by_id(&conn, id).unwrap().is_none());
    }

    #[test]
    fn test_insert_meta_conflict() {
        let conn = test_conn();
        assert!(insert_meta(&conn, "0:a", 4, 1).unwrap().is_some());
        assert!(insert_meta(&conn, "0:a", 8, 2).unwrap().is_none());

        // first row untouched
        let meta = find_meta_by_path(&conn, "0:a").unwrap().unwrap();
        assert_eq!(meta.block_size, 4);
    }

    #[test]
    fn test_full_path_unique() {
        let conn = test_conn();
        insert_meta(&conn, "0:a", 4, 1).unwrap();
        let b = insert_meta(&conn, "0:b", 4, 1).unwrap().unwrap();
        assert!(update_meta_path(&conn, b, "0:a").is_err());
    }

    #[test]
    fn test_block_upsert_bumps_revision() {
        let conn = test_conn();

        upsert_block(&conn, 1, 0, 4, b"ab").unwrap();
        let block = find_block(&conn, 1, 0).unwrap().unwrap();
        assert_eq!(block.revision, 1);
        assert_eq!(block.block_data, b"ab");

        upsert_block(&conn, 1, 0, 4, b"abcd").unwrap();
        let updated = find_block(&conn, 1, 0).unwrap().unwrap();
        assert_eq!(updated.id, block.id);
        assert_eq!(updated.revision, 2);
        assert_eq!(updated.block_data, b"abcd");

        assert_eq!(count_blocks(&conn, 1).unwrap(), 1);
    }

    #[test]
    fn test_blocks_scoped_by_file() {
        let conn = test_conn();
        upsert_block(&conn, 1, 0, 4, b"1111").unwrap();
        upsert_block(&conn, 1, 4, 4, b"22").unwrap();
        upsert_block(&conn, 2, 0, 4, b"3333").unwrap();

        assert!(find_block(&conn, 1, 8).unwrap().is_none());
        assert_eq!(find_block(&conn, 2, 0).unwrap().unwrap().block_data, b"3333");

        assert_eq!(delete_blocks(&conn, 1).unwrap(), 2);
        assert_eq!(count_blocks(&conn, 1).unwrap(), 0);
        assert_eq!(count_blocks(&conn, 2).unwrap(), 1);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = test_conn();
        init_schema(&conn).unwrap();
        insert_meta(&conn, "0:a", 4, 1).unwrap();
        init_schema(&conn).unwrap();
        assert!(find_meta_by_path(&conn, "0:a").unwrap().is_some());
    }

    #[test]
    fn test_zero_block_size_row_rejected() {
        let conn = test_conn();
        let id = insert_meta(&conn, "0:bad", 0, 1).unwrap().unwrap();
        conn.execute("UPDATE file_meta SET block_size = -4 WHERE id = ?1", params![id])
            .unwrap();
        let err = find_meta_by_path(&conn, "0:bad").unwrap_err();
        assert!(matches!(err, rusqlite::Error::IntegralValueOutOfRange(2, -4)));

        insert_meta(&conn, "0:zero", 0, 1).unwrap();
        assert!(find_meta_by_path(&conn, "0:zero").is_err());
    }
}
