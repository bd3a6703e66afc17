use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Read,
    Write,
    Rename,
    Remove,
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FsOp::Read => "read",
            FsOp::Write => "write",
            FsOp::Rename => "rename",
            FsOp::Remove => "remove",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{op} {}: {source}", .path.display())]
pub struct FsError {
    pub op: FsOp,
    pub path: PathBuf,
    pub source: io::Error,
}

impl FsError {
    pub fn new(op: FsOp, path: &Path, source: io::Error) -> Self {
        Self {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.source.kind() == io::ErrorKind::NotFound
    }
}

/// The file operations the worker and session perform.
///
/// `rename` replaces an existing destination.
#[async_trait::async_trait]
pub trait FileOps: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError>;
    async fn write(&self, path: &Path, contents: &str) -> Result<(), FsError>;
    async fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError>;
    async fn remove_file(&self, path: &Path) -> Result<(), FsError>;
    async fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

#[async_trait::async_trait]
impl FileOps for LocalFs {
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|err| FsError::new(FsOp::Read, path, err))
    }

    async fn write(&self, path: &Path, contents: &str) -> Result<(), FsError> {
        tokio::fs::write(path, contents.as_bytes())
            .await
            .map_err(|err| FsError::new(FsOp::Write, path, err))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|err| FsError::new(FsOp::Rename, from, err))
    }

    async fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|err| FsError::new(FsOp::Remove, path, err))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}
