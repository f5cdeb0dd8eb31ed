//! Block arithmetic for reads and writes.
//!
//! A read never crosses a block boundary: it returns at most the rest of the
//! block containing `offset`, zero-filling whatever the stored bytes do not
//! cover. A write walks block by block, merging new bytes into the existing
//! ones and storing only as many bytes as the block actually holds.
//!
//! Neither function opens a transaction. The file handle runs each write inside
//! one so that the block upserts and the size update land together, and a
//! cancelled write rolls back whole.

use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::Connection;
use tracing::{debug, trace};

use crate::db::{self, FileMeta};
use crate::error::{DbfsError, DbfsResult};

/// Where an offset falls inside its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockPos {
    /// Offset of the block's first byte.
    pub block_offset: u64,
    /// Offset within the block.
    pub in_block: usize,
    /// Bytes from `in_block` to the end of the block.
    pub space_left: usize,
}

impl BlockPos {
    pub fn at(offset: u64, block_size: u64) -> Self {
        let in_block = offset % block_size;
        Self {
            block_offset: offset - in_block,
            in_block: in_block as usize,
            space_left: (block_size - in_block) as usize,
        }
    }
}

/// Read from one block of `meta` at `offset`.
///
/// Returns 0 at or past end-of-file.
pub(crate) fn read_at(
    conn: &Connection,
    meta: &FileMeta,
    offset: u64,
    buf: &mut [u8],
) -> DbfsResult<usize> {
    if offset >= meta.file_size {
        return Ok(0);
    }
    let pos = BlockPos::at(offset, meta.block_size);
    let wanted = buf
        .len()
        .min(pos.space_left)
        .min((meta.file_size - offset).min(usize::MAX as u64) as usize);
    if wanted == 0 {
        return Ok(0);
    }

    let data = db::find_block(conn, meta.id, pos.block_offset)?
        .map(|block| block.block_data)
        .unwrap_or_default();
    let copied = wanted.min(data.len().saturating_sub(pos.in_block));
    if copied > 0 {
        buf[..copied].copy_from_slice(&data[pos.in_block..pos.in_block + copied]);
    }
    buf[copied..wanted].fill(0);

    trace!(
        meta_id = meta.id,
        block_offset = pos.block_offset,
        copied,
        zeroed = wanted - copied,
        "read block"
    );
    Ok(wanted)
}

/// Outcome of [`write_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WriteOutcome {
    /// Offset just past the last byte written.
    pub end: u64,
    /// File size after the write.
    pub file_size: u64,
}

/// Write `data` into `meta` starting at `offset` and record the new size.
///
/// `meta` is the row as it was before the write. Offsets past end-of-file are
/// fine: the gap is left unwritten and reads back as zeros.
///
/// `cancel` is checked before every block; once set, the write stops with an
/// interrupted error and the caller's transaction must be rolled back.
pub(crate) fn write_at(
    conn: &Connection,
    meta: &FileMeta,
    offset: u64,
    data: &[u8],
    now: i64,
    cancel: &AtomicBool,
) -> DbfsResult<WriteOutcome> {
    let end = offset
        .checked_add(data.len() as u64)
        .filter(|end| *end <= i64::MAX as u64)
        .ok_or_else(|| DbfsError::invalid(format!("write past {} overflows", offset)))?;

    let mut scratch = vec![0u8; meta.block_size as usize];
    let mut cursor = offset;
    let mut file_size = meta.file_size;
    let mut remaining = data;

    while !remaining.is_empty() {
        if cancel.load(Ordering::Acquire) {
            debug!(meta_id = meta.id, at = cursor, "write cancelled");
            return Err(DbfsError::interrupted());
        }
        let pos = BlockPos::at(cursor, meta.block_size);
        let to_write = remaining.len().min(pos.space_left);

        // Existing block content, zero-filled up to end-of-file.
        scratch.fill(0);
        let existing = read_at(conn, meta, pos.block_offset, &mut scratch)?;

        scratch[pos.in_block..pos.in_block + to_write].copy_from_slice(&remaining[..to_write]);
        let stored = existing.max(pos.in_block + to_write);
        db::upsert_block(conn, meta.id, pos.block_offset, meta.block_size, &scratch[..stored])?;

        trace!(
            meta_id = meta.id,
            block_offset = pos.block_offset,
            in_block = pos.in_block,
            to_write,
            stored,
            "wrote block"
        );

        cursor += to_write as u64;
        file_size = file_size.max(cursor);
        remaining = &remaining[to_write..];
    }
    debug_assert_eq!(cursor, end);

    let grown = (file_size > meta.file_size).then_some(file_size);
    db::touch_meta(conn, meta.id, grown, now)?;

    Ok(WriteOutcome { end, file_size })
}
