//! Append-only journal of transition records.
//!
//! One record per line:
//!
//! ```text
//! <crc32c of json, 8 hex digits> <json>\n
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use stonetrack_core::TransitionRecord;
use thiserror::Error;

/// Journal errors.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record corrupted at line {line}: CRC mismatch (expected {expected:#x}, got {actual:#x})")]
    CorruptedRecord { line: usize, expected: u32, actual: u32 },

    #[error("invalid record at line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },
}

/// Journal writer.
pub struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
    appended: usize,
}

impl Journal {
    /// Opens (or creates) the journal for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            appended: 0,
        })
    }

    /// Appends one record.
    pub fn append(&mut self, record: &TransitionRecord) -> Result<(), JournalError> {
        let json = serde_json::to_string(record)?;
        let crc = crc32c::crc32c(json.as_bytes());
        writeln!(self.writer, "{:08x} {}", crc, json)?;
        self.appended += 1;
        Ok(())
    }

    /// Flushes buffered records and syncs them to disk.
    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        tracing::debug!(path = %self.path.display(), appended = self.appended, "journal synced");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records appended through this handle.
    pub fn appended(&self) -> usize {
        self.appended
    }
}

/// Reads every record, verifying checksums.
pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<TransitionRecord>, JournalError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line.is_empty() {
            continue;
        }

        let (crc_hex, json) = line
            .split_once(' ')
            .ok_or_else(|| JournalError::InvalidRecord {
                line: line_no,
                reason: "missing checksum separator".to_string(),
            })?;
        let expected = u32::from_str_radix(crc_hex, 16).map_err(|e| JournalError::InvalidRecord {
            line: line_no,
            reason: format!("bad checksum: {}", e),
        })?;
        let actual = crc32c::crc32c(json.as_bytes());
        if expected != actual {
            return Err(JournalError::CorruptedRecord {
                line: line_no,
                expected,
                actual,
            });
        }

        records.push(serde_json::from_str(json)?);
    }

    Ok(records)
}
