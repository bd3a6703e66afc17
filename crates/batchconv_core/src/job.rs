use std::fmt;
use std::path::PathBuf;

use crate::{LanguagePair, SinkKey};

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// One request to convert a single source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub source: PathBuf,
    pub progress_key: SinkKey,
    pub status: JobStatus,
}

impl Job {
    pub fn new(id: JobId, source: PathBuf, languages: &LanguagePair) -> Self {
        let progress_key = languages.progress_key(&source);
        Self {
            id,
            source,
            progress_key,
            status: JobStatus::Queued,
        }
    }
}

/// Outcome of a finished job, held until the reviewer accepts or discards it.
///
/// For failed jobs `text` carries the error message and `result_key` is the
/// job's progress key; nothing was published under a result slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedJob {
    pub job: Job,
    pub result_key: SinkKey,
    pub text: String,
    pub error: bool,
}

/// A replacement file written by an accept inside the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedRecord {
    pub replacement: PathBuf,
    /// The source file as it was named on disk; its backup sits next to it.
    pub source: PathBuf,
}
