//! Dump files on disk: export artifacts and backups share naming and
//! durability rules.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::profile::Role;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Kind prefix of a dump file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    Export,
    Backup,
}

impl DumpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DumpKind::Export => "export",
            DumpKind::Backup => "backup",
        }
    }
}

/// A transient export produced by the transfer pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub database: String,
    pub source: Role,
    pub created_at: DateTime<Local>,
    pub size_bytes: u64,
}

/// `<kind>_<database>_<YYYYMMDD_HHMMSS>.sql`
pub fn dump_file_name(kind: DumpKind, database: &str, at: DateTime<Local>) -> String {
    format!("{}_{}_{}.sql", kind.as_str(), database, at.format(TIMESTAMP_FORMAT))
}

/// Create a new, empty dump file in `dir` that did not exist before.
///
/// Two dumps of the same database within one second would collide, so a
/// numeric suffix is appended until `create_new` succeeds.
pub fn create_unique(
    dir: &Path,
    kind: DumpKind,
    database: &str,
    at: DateTime<Local>,
) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let base = dump_file_name(kind, database, at);
    let stem = base.trim_end_matches(".sql");

    for attempt in 0..1000 {
        let name = if attempt == 0 {
            base.clone()
        } else {
            format!("{stem}_{attempt}.sql")
        };
        let candidate = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {base} in {}", dir.display()),
    ))
}

/// Flush a finished dump to stable storage and return its size.
///
/// An empty dump is an error: the client utilities always emit a header.
pub fn sync_and_measure(path: &Path) -> io::Result<u64> {
    let file = File::open(path)?;
    file.sync_all()?;
    let size = file.metadata()?.len();
    if size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} is empty", path.display()),
        ));
    }
    Ok(size)
}

/// Recover the database name and timestamp from a dump file name
pub fn parse_dump_file_name(kind: DumpKind, file_name: &str) -> Option<(String, DateTime<Local>)> {
    let rest = file_name
        .strip_prefix(kind.as_str())?
        .strip_prefix('_')?
        .strip_suffix(".sql")?;

    // Strip an optional collision suffix: <db>_<date>_<time>[_<n>]
    let parts: Vec<&str> = rest.rsplitn(4, '_').collect();
    let (database, date, time) = match parts.as_slice() {
        [n, time, date, db] if n.chars().all(|c| c.is_ascii_digit()) && n.len() < 4 => {
            (*db, *date, *time)
        }
        _ => {
            let parts: Vec<&str> = rest.rsplitn(3, '_').collect();
            match parts.as_slice() {
                [time, date, db] => (*db, *date, *time),
                _ => return None,
            }
        }
    };

    let naive = NaiveDateTime::parse_from_str(&format!("{date}_{time}"), TIMESTAMP_FORMAT).ok()?;
    let at = Local.from_local_datetime(&naive).earliest()?;
    Some((database.to_string(), at))
}
