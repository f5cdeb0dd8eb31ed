//! dbfs command-line tool.
//!
//! Copies files in and out of a dbfs database and manages them by path.
//!
//! Usage:
//!   dbfs --db logs.db put actions/1.log ./local.log
//!   echo "more" | dbfs --db logs.db append actions/1.log
//!   dbfs --db logs.db cat actions/1.log
//!   dbfs --db logs.db mv actions/1.log archive/1.log
//!   dbfs --db logs.db stat archive/1.log --json
//!   dbfs --db logs.db rm archive/1.log
//!
//! Logging goes to stderr; set `RUST_LOG=dbfs=debug` to see each operation.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use dbfs::{Dbfs, DbfsConfig, FileInfo, OpenFlags};

/// Files stored in a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "dbfs")]
#[command(about = "Read and write files stored in a dbfs database")]
struct Args {
    /// Database file
    #[arg(long, default_value = "dbfs.db")]
    db: String,

    /// RON config file (block size, busy timeout, journal mode)
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace a file with the contents of SRC (or stdin)
    Put {
        path: String,
        src: Option<PathBuf>,
    },
    /// Append SRC (or stdin) to a file, creating it if needed
    Append {
        path: String,
        src: Option<PathBuf>,
    },
    /// Write a file to stdout
    Cat { path: String },
    /// Copy a file out to DEST
    Get { path: String, dest: PathBuf },
    /// Delete a file
    Rm { path: String },
    /// Rename a file
    Mv { from: String, to: String },
    /// Show size and timestamps
    Stat {
        path: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let fs = open_store(&args)?;

    match args.command {
        Command::Put { path, src } => {
            let mut file = fs.create(&path)?;
            let n = copy_in(src.as_deref(), &mut file)?;
            tracing::info!(path = %path, bytes = n, "stored");
        }
        Command::Append { path, src } => {
            let mut file = fs.open_file(&path, OpenFlags::append())?;
            let n = copy_in(src.as_deref(), &mut file)?;
            tracing::info!(path = %path, bytes = n, "appended");
        }
        Command::Cat { path } => {
            let mut file = fs.open(&path)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            io::copy(&mut file, &mut out)?;
            out.flush()?;
        }
        Command::Get { path, dest } => {
            let mut file = fs.open(&path)?;
            let mut out = File::create(&dest)
                .with_context(|| format!("failed to create {}", dest.display()))?;
            let n = io::copy(&mut file, &mut out)?;
            tracing::info!(path = %path, dest = %dest.display(), bytes = n, "copied out");
        }
        Command::Rm { path } => {
            fs.remove(&path)?;
            println!("Removed {}", path);
        }
        Command::Mv { from, to } => {
            fs.rename(&from, &to)?;
            println!("Renamed {} -> {}", from, to);
        }
        Command::Stat { path, json } => {
            let info = fs.stat(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_info(&path, &info);
            }
        }
    }

    Ok(())
}

fn open_store(args: &Args) -> Result<Dbfs> {
    let config = match &args.config {
        Some(file) => {
            let file = shellexpand::tilde(file);
            DbfsConfig::load(file.as_ref())
                .with_context(|| format!("failed to load config {}", file))?
        }
        None => DbfsConfig::default(),
    };
    let db_path: PathBuf = shellexpand::tilde(&args.db).as_ref().into();
    Dbfs::open_path(&db_path, config)
        .with_context(|| format!("failed to open database {}", db_path.display()))
}

/// Copy a local file, or stdin when no path is given, into `dst`.
fn copy_in(src: Option<&Path>, dst: &mut impl Write) -> Result<u64> {
    let mut reader: Box<dyn Read> = match src {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };
    Ok(io::copy(&mut reader, dst)?)
}

fn print_info(path: &str, info: &FileInfo) {
    let secs = |t: std::time::SystemTime| {
        t.duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    };
    println!("{:<12} {}", "PATH", path);
    println!("{:<12} {}", "NAME", info.name);
    println!("{:<12} {}", "SIZE", info.size);
    println!("{:<12} {}", "BLOCK SIZE", info.block_size);
    println!("{:<12} {}", "CREATED", secs(info.create_time));
    println!("{:<12} {}", "MODIFIED", secs(info.mod_time));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["dbfs", "--db", "x.db", "mv", "a", "b"]).unwrap();
        assert_eq!(args.db, "x.db");
        assert!(matches!(args.command, Command::Mv { ref from, ref to } if from == "a" && to == "b"));

        let args = Args::try_parse_from(["dbfs", "stat", "a", "--json"]).unwrap();
        assert_eq!(args.db, "dbfs.db");
        assert!(matches!(args.command, Command::Stat { json: true, .. }));
    }

    #[test]
    fn test_copy_in_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        std::fs::write(&src, b"from disk").unwrap();

        let fs = Dbfs::in_memory(DbfsConfig::with_block_size(4)).unwrap();
        let mut file = fs.create("copied").unwrap();
        assert_eq!(copy_in(Some(&src), &mut file).unwrap(), 9);
        assert_eq!(fs.read_to_end("copied").unwrap(), b"from disk");
    }

    #[test]
    fn test_open_store_with_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("dbfs.ron");
        std::fs::write(&config, "(block_size: 8)").unwrap();

        let args = Args::try_parse_from([
            "dbfs",
            "--db",
            dir.path().join("t.db").to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "cat",
            "x",
        ])
        .unwrap();
        let fs = open_store(&args).unwrap();
        assert_eq!(fs.config().block_size, 8);
    }
}
