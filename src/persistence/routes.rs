//! Append-only topic route log.
//!
//! Each line is one JSON object `{"topic_id":..,"site_id":..}`. Lines are
//! only ever appended and synced immediately. A crash mid-write leaves a
//! partial final line, which is detected and truncated on load.
//!
//! Several processes may share one log. Each `RouteLog` remembers how far it
//! has read, and `read_new` picks up lines appended by others. `open` and
//! `append` may cut off a partial tail, so callers serialize them across
//! processes.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fsync::fsync_file;
use crate::types::{SiteId, TopicId};

#[derive(Debug, Error)]
pub enum RouteLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another process held the log lock for longer than the wait bound.
    #[error("route log is locked by another process")]
    Locked,
}

pub type Result<T> = std::result::Result<T, RouteLogError>;

/// One persisted topic → site mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub topic_id: TopicId,
    pub site_id: SiteId,
}

/// An open route log, positioned for appending.
#[derive(Debug)]
pub struct RouteLog {
    file: File,
    path: PathBuf,
    /// Bytes of complete records consumed so far.
    offset: u64,
}

impl RouteLog {
    /// Opens (creating if needed) the log and returns it with every valid
    /// record it already contains, in file order.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<RouteRecord>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (records, offset) = replay(&path)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok((RouteLog { file, path, offset }, records))
    }

    /// Returns the complete records appended since the last read.
    ///
    /// A line still being written by another process is left for a later
    /// call.
    pub fn read_new(&mut self) -> Result<Vec<RouteRecord>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let (records, consumed) = read_records(BufReader::new(file))?;
        self.offset += consumed;
        Ok(records)
    }

    /// Appends a record and syncs it to disk.
    ///
    /// Call `read_new` first: anything past the read position is treated as
    /// the partial tail of a crashed writer and cut off.
    pub fn append(&mut self, record: RouteRecord) -> Result<()> {
        if self.file.metadata()?.len() > self.offset {
            self.file.set_len(self.offset)?;
        }
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        fsync_file(&self.file)?;
        self.offset += line.len() as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads all complete records, truncating the file at the first line that
/// does not parse. Returns the records and the length kept.
fn replay(path: &Path) -> Result<(Vec<RouteRecord>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e.into()),
    };
    let file_len = file.metadata()?.len();
    let (records, valid_len) = read_records(BufReader::new(file))?;

    if valid_len < file_len {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len)?;
        fsync_file(&file)?;
    }

    Ok((records, valid_len))
}

/// Reads records up to the first incomplete or unparsable line. Returns them
/// with the number of bytes they span.
fn read_records(mut reader: impl BufRead) -> Result<(Vec<RouteRecord>, u64)> {
    let mut records = Vec::new();
    let mut valid_len = 0u64;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }

        // A line without its newline was cut off mid-write.
        if !line.ends_with('\n') {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            valid_len += bytes_read as u64;
            continue;
        }

        match serde_json::from_str::<RouteRecord>(trimmed) {
            Ok(record) => {
                records.push(record);
                valid_len += bytes_read as u64;
            }
            Err(_) => break,
        }
    }

    Ok((records, valid_len))
}
