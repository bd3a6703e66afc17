use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use batchconv_core::AcceptedRecord;
use batchconv_logging::{conv_debug, conv_warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Name of the session record kept at the workspace root.
pub const SESSION_FILENAME: &str = ".batchconv-session.json";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("directory missing or not writable: {0}")]
    Dir(String),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure the directory exists; create if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::Dir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::Dir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::Dir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SessionRecord {
    accepted: Vec<RecordEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordEntry {
    replacement: PathBuf,
    source: PathBuf,
}

impl From<&AcceptedRecord> for RecordEntry {
    fn from(record: &AcceptedRecord) -> Self {
        Self {
            replacement: record.replacement.clone(),
            source: record.source.clone(),
        }
    }
}

impl From<RecordEntry> for AcceptedRecord {
    fn from(entry: RecordEntry) -> Self {
        Self {
            replacement: entry.replacement,
            source: entry.source,
        }
    }
}

/// Result of reading a workspace's session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLoad {
    Missing,
    /// The file exists but cannot be read or parsed.
    Corrupt(String),
    Loaded(Vec<AcceptedRecord>),
}

pub fn load_session_record(root: &Path) -> RecordLoad {
    let path = root.join(SESSION_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return RecordLoad::Missing,
        Err(err) => return RecordLoad::Corrupt(err.to_string()),
    };

    match serde_json::from_str::<SessionRecord>(&content) {
        Ok(record) => {
            conv_debug!(
                "Loaded session record from {:?} ({} files)",
                path,
                record.accepted.len()
            );
            RecordLoad::Loaded(record.accepted.into_iter().map(Into::into).collect())
        }
        Err(err) => RecordLoad::Corrupt(err.to_string()),
    }
}

/// Replaces the session record; the write is atomic so a crash leaves the old or new record.
pub fn save_session_record(
    root: &Path,
    accepted: &[AcceptedRecord],
) -> Result<PathBuf, PersistError> {
    let record = SessionRecord {
        accepted: accepted.iter().map(RecordEntry::from).collect(),
    };
    let content = serde_json::to_string_pretty(&record)?;
    AtomicFileWriter::new(root.to_path_buf()).write(SESSION_FILENAME, &content)
}

/// Deletes the session record. A missing record is not an error.
pub fn remove_session_record(root: &Path) -> Result<(), PersistError> {
    let path = root.join(SESSION_FILENAME);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            conv_warn!("Failed to remove session record {:?}: {}", path, err);
            Err(err.into())
        }
    }
}
