//! On-disk databases: persistence, transactions and multiple connections.

use std::io::{Seek, SeekFrom, Write};
use std::thread;

use dbfs::{Dbfs, DbfsConfig, OpenFlags, db};
use rusqlite::Connection;
use tempfile::TempDir;

fn config(block_size: u64) -> DbfsConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    DbfsConfig::with_block_size(block_size)
}

#[test]
fn test_content_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fs.db");

    {
        let fs = Dbfs::open_path(&path, config(4)).unwrap();
        fs.write_all("logs/1.log", b"persisted bytes").unwrap();
    }

    let fs = Dbfs::open_path(&path, config(64)).unwrap();
    assert_eq!(fs.read_to_end("logs/1.log").unwrap(), b"persisted bytes");
    // block size is the one the file was created with
    assert_eq!(fs.stat("logs/1.log").unwrap().block_size, 4);
}

#[test]
fn test_stored_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fs.db");

    let fs = Dbfs::open_path(&path, config(4)).unwrap();
    fs.write_all("a/b/c", b"0123456789").unwrap();

    let conn = Connection::open(&path).unwrap();
    let meta = db::find_meta_by_path(&conn, "2:a/b/c").unwrap().unwrap();
    assert_eq!(meta.file_size, 10);
    assert_eq!(meta.block_size, 4);
    assert_eq!(db::count_blocks(&conn, meta.id).unwrap(), 3);
    assert_eq!(db::find_block(&conn, meta.id, 0).unwrap().unwrap().block_data, b"0123");
    assert_eq!(db::find_block(&conn, meta.id, 4).unwrap().unwrap().block_data, b"4567");
    assert_eq!(db::find_block(&conn, meta.id, 8).unwrap().unwrap().block_data, b"89");

    // rewriting a block bumps its revision
    let mut f = fs.open_file("a/b/c", OpenFlags::read_write()).unwrap();
    f.seek(SeekFrom::Start(1)).unwrap();
    f.write_all(b"X").unwrap();
    let block = db::find_block(&conn, meta.id, 0).unwrap().unwrap();
    assert_eq!(block.revision, 2);
    assert_eq!(block.block_data, b"0X23");

    // truncate and remove leave no block rows behind
    fs.create("a/b/c").unwrap();
    assert_eq!(db::count_blocks(&conn, meta.id).unwrap(), 0);
    fs.write_all("a/b/c", b"again").unwrap();
    fs.remove("a/b/c").unwrap();
    assert_eq!(db::count_blocks(&conn, meta.id).unwrap(), 0);
    assert!(db::find_meta_by_id(&conn, meta.id).unwrap().is_none());
}

#[test]
fn test_failed_write_leaves_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fs.db");
    let fs = Dbfs::open_path(&path, config(4)).unwrap();
    fs.write_all("f", b"keep").unwrap();

    // make the third block's upsert fail
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_block BEFORE INSERT ON file_block
         WHEN NEW.block_offset = 8
         BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
    )
    .unwrap();

    let mut f = fs.open_file("f", OpenFlags::read_write()).unwrap();
    let err = f.write_bytes(b"0123456789").unwrap_err();
    assert!(matches!(err, dbfs::DbfsError::Store(_)));
    assert_eq!(f.offset(), 0);

    // earlier blocks and the size update rolled back with it
    assert_eq!(fs.read_to_end("f").unwrap(), b"keep");
    assert_eq!(fs.stat("f").unwrap().size, 4);
}

#[test]
fn test_two_connections_same_block() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fs.db");
    Dbfs::open_path(&path, config(64))
        .unwrap()
        .write_all("shared", &[b'.'; 64])
        .unwrap();

    let writers: Vec<_> = (0..4u8)
        .map(|w| {
            let path = path.clone();
            thread::spawn(move || {
                let fs = Dbfs::open_path(&path, config(64)).unwrap();
                let mut f = fs.open_file("shared", OpenFlags::read_write()).unwrap();
                for i in 0..16u64 {
                    let pos = i * 4 + w as u64;
                    f.seek(SeekFrom::Start(pos)).unwrap();
                    f.write_all(&[b'a' + w]).unwrap();
                }
            })
        })
        .collect();
    for handle in writers {
        handle.join().unwrap();
    }

    let data = Dbfs::open_path(&path, config(64))
        .unwrap()
        .read_to_end("shared")
        .unwrap();
    assert_eq!(data.len(), 64);
    for (pos, byte) in data.iter().enumerate() {
        assert_eq!(*byte, b'a' + (pos % 4) as u8, "lost update at {pos}");
    }
}
