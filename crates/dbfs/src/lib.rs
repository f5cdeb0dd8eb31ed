//! # dbfs
//!
//! Files stored as rows in SQLite.
//!
//! A file is one `file_meta` row (path key, block size, logical size,
//! timestamps) plus one `file_block` row per block that has ever been written.
//! Blocks are stored without padding and missing blocks read as zeros, so
//! sparse files cost nothing for their holes.
//!
//! - [`Dbfs`] - The store: open, create, rename, remove, stat
//! - [`FileHandle`] - A cursor over one file; implements `Read`, `Write`, `Seek`
//! - [`DbfsConfig`] - Block size and SQLite settings, loadable from RON
//!
//! ```no_run
//! use std::io::{BufRead, BufReader, Write};
//! use dbfs::{Dbfs, DbfsConfig, OpenFlags};
//!
//! let fs = Dbfs::open_path("logs.db", DbfsConfig::default())?;
//! let mut log = fs.open_file("actions/1.log", OpenFlags::append())?;
//! writeln!(log, "step 1 done")?;
//!
//! for line in BufReader::new(fs.open("actions/1.log")?).lines() {
//!     println!("{}", line?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Design Decisions
//!
//! - **One transaction per write**: all blocks touched by a `write` and the
//!   size update commit together, so a failed write leaves nothing behind.
//! - **Short reads**: a read returns at most the rest of the current block.
//!   `std::io` consumers loop until `Ok(0)` and see the whole stream.
//! - **Rename never clobbers**: renaming onto an existing path fails.

pub mod config;
pub mod db;
mod engine;
pub mod error;
mod file;
mod fs;
pub mod path;
mod types;

pub use config::{ConfigError, DbfsConfig, DEFAULT_BLOCK_SIZE};
pub use db::{BlockRecord, FileMeta};
pub use error::{DbfsError, DbfsResult};
pub use file::FileHandle;
pub use fs::Dbfs;
pub use path::path_key;
pub use types::{FileInfo, OpenFlags};
