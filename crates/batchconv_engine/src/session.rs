use std::path::{Path, PathBuf};
use std::sync::Arc;

use batchconv_core::{AcceptedRecord, LanguagePair};
use batchconv_logging::{conv_debug, conv_error, conv_info, conv_warn};

use crate::persist::{
    load_session_record, remove_session_record, save_session_record, PersistError, RecordLoad,
};
use crate::{FileOps, FsError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no active conversion session")]
    Inactive,
    #[error("{} already exists and is not part of this session", .0.display())]
    TargetExists(PathBuf),
    #[error("failed to back up {}: {source}", .path.display())]
    Backup { path: PathBuf, source: FsError },
    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: FsError },
    #[error("failed to persist session state: {0}")]
    Persist(#[from] PersistError),
    #[error("could not restore {} original file(s)", .failed.len())]
    RestoreIncomplete { failed: Vec<PathBuf> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub active: bool,
    pub accepted: Vec<AcceptedRecord>,
    pub workspace_root: Option<PathBuf>,
}

/// What a commit or reject resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Replacement files the session held.
    pub files: Vec<PathBuf>,
    /// Originals those replacements were converted from.
    pub originals: Vec<PathBuf>,
    /// Best-effort cleanup steps that failed and were only logged.
    pub cleanup_failures: usize,
}

/// Provisional batch of file replacements, resolved as a group.
///
/// Accepting a file renames the original aside to its backup path before
/// anything else, so after a crash the original survives either in place or
/// as the backup. The on-disk record is written last and only lists accepted
/// replacements.
pub struct SessionManager {
    fs: Arc<dyn FileOps>,
    languages: LanguagePair,
    state: SessionState,
}

impl SessionManager {
    pub fn new(fs: Arc<dyn FileOps>, languages: LanguagePair) -> Self {
        Self {
            fs,
            languages,
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn accepted_files(&self) -> Vec<PathBuf> {
        self.state
            .accepted
            .iter()
            .map(|record| record.replacement.clone())
            .collect()
    }

    /// Resumes the first workspace root holding a record with at least one
    /// replacement still on disk. Stale or corrupt records are deleted.
    pub async fn load_from_disk(&mut self, roots: &[PathBuf]) -> bool {
        self.state = SessionState::default();

        for root in roots {
            let records = match load_session_record(root) {
                RecordLoad::Missing => continue,
                RecordLoad::Corrupt(reason) => {
                    conv_warn!(
                        "Discarding unreadable session record in {}: {}",
                        root.display(),
                        reason
                    );
                    let _ = remove_session_record(root);
                    continue;
                }
                RecordLoad::Loaded(records) => records,
            };

            let mut accepted = Vec::with_capacity(records.len());
            for record in records {
                if self.fs.exists(&record.replacement).await {
                    accepted.push(record);
                } else {
                    conv_debug!(
                        "Session record lists missing file {}",
                        record.replacement.display()
                    );
                }
            }

            if accepted.is_empty() {
                conv_info!("Removing stale session record in {}", root.display());
                let _ = remove_session_record(root);
                continue;
            }

            conv_info!(
                "Resumed conversion session in {} with {} file(s)",
                root.display(),
                accepted.len()
            );
            self.state = SessionState {
                active: true,
                accepted,
                workspace_root: Some(root.clone()),
            };
            return true;
        }

        false
    }

    /// Starts a session rooted at `root` unless one is already active.
    /// Returns whether a new session was started.
    pub fn begin_if_required(&mut self, root: &Path) -> Result<bool, SessionError> {
        if self.state.active {
            return Ok(false);
        }
        self.state = SessionState {
            active: true,
            accepted: Vec::new(),
            workspace_root: Some(root.to_path_buf()),
        };
        conv_info!("Started conversion session in {}", root.display());
        self.persist()?;
        Ok(true)
    }

    /// Swaps `source` for its converted counterpart and records it.
    ///
    /// A failed backup or write leaves the source file in place and the
    /// accepted list untouched.
    pub async fn accept(&mut self, source: &Path, converted: &str) -> Result<PathBuf, SessionError> {
        if !self.state.active {
            return Err(SessionError::Inactive);
        }

        let backup = self.languages.backup_path(source);
        let target = self.languages.target_path(source);
        let ours = self
            .state
            .accepted
            .iter()
            .any(|r| r.replacement == target && r.source == source);
        if self.fs.exists(&target).await && !ours {
            return Err(SessionError::TargetExists(target));
        }

        self.fs
            .rename(source, &backup)
            .await
            .map_err(|err| SessionError::Backup {
                path: source.to_path_buf(),
                source: err,
            })?;

        if let Err(err) = self.fs.write(&target, converted).await {
            conv_error!("Failed to write {}: {}", target.display(), err);
            if let Err(undo) = self.fs.rename(&backup, source).await {
                conv_error!(
                    "Could not move {} back after failed write: {}",
                    backup.display(),
                    undo
                );
            }
            return Err(SessionError::Write {
                path: target,
                source: err,
            });
        }

        if !self.state.accepted.iter().any(|r| r.replacement == target) {
            self.state.accepted.push(AcceptedRecord {
                replacement: target.clone(),
                source: source.to_path_buf(),
            });
        }
        conv_info!(
            "Accepted {} -> {}",
            source.display(),
            target.display()
        );
        self.persist()?;
        Ok(target)
    }

    /// Keeps every replacement and drops the backups.
    pub async fn commit(&mut self) -> Result<SessionSummary, SessionError> {
        if !self.state.active {
            return Err(SessionError::Inactive);
        }

        let mut summary = self.summary();
        for original in &summary.originals {
            let backup = self.languages.backup_path(original);
            match self.fs.remove_file(&backup).await {
                Ok(()) => conv_debug!("Removed backup {}", backup.display()),
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    conv_warn!("Could not remove backup {}: {}", backup.display(), err);
                    summary.cleanup_failures += 1;
                }
            }
        }

        self.reset();
        conv_info!("Committed session with {} file(s)", summary.files.len());
        Ok(summary)
    }

    /// Restores every original and deletes every replacement.
    ///
    /// The session ends even when some originals cannot be restored; those
    /// are reported through [`SessionError::RestoreIncomplete`].
    pub async fn reject(&mut self) -> Result<SessionSummary, SessionError> {
        if !self.state.active {
            return Err(SessionError::Inactive);
        }

        let mut summary = self.summary();
        let mut failed = Vec::new();
        for (replacement, original) in summary.files.iter().zip(&summary.originals) {
            match self.restore_original(replacement).await {
                Ok(restored) => {
                    if !restored {
                        conv_debug!("Nothing to restore for {}", replacement.display());
                    }
                }
                Err(err) => {
                    conv_error!("Could not restore original of {}: {}", replacement.display(), err);
                    failed.push(original.clone());
                }
            }
        }

        self.reset();
        summary.cleanup_failures = failed.len();
        if failed.is_empty() {
            conv_info!("Rejected session with {} file(s)", summary.files.len());
            Ok(summary)
        } else {
            Err(SessionError::RestoreIncomplete { failed })
        }
    }

    /// Inverse of accept for one replacement. Idempotent: returns `Ok(false)`
    /// when there is no backup left to restore.
    pub async fn restore_original(&self, replacement: &Path) -> Result<bool, FsError> {
        let source = self.original_of(replacement);
        let backup = self.languages.backup_path(&source);

        match self.fs.remove_file(replacement).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => conv_warn!("Could not delete {}: {}", replacement.display(), err),
        }

        if !self.fs.exists(&backup).await {
            return Ok(false);
        }
        self.fs.rename(&backup, &source).await?;
        Ok(true)
    }

    /// Mirrors the in-memory state to the workspace record: written while
    /// active, removed otherwise.
    pub fn persist(&self) -> Result<(), SessionError> {
        let Some(root) = self.state.workspace_root.as_deref() else {
            conv_debug!("Session has no workspace root; nothing persisted");
            return Ok(());
        };
        if self.state.active {
            save_session_record(root, &self.state.accepted)?;
        } else {
            remove_session_record(root)?;
        }
        Ok(())
    }

    /// Ends the session and erases the record. Always leaves the session inactive.
    pub fn reset(&mut self) {
        let root = self.state.workspace_root.take();
        self.state = SessionState::default();
        if let Some(root) = root {
            if let Err(err) = remove_session_record(&root) {
                conv_warn!("Session ended but its record could not be removed: {}", err);
            }
        }
    }

    /// The recorded source of `replacement`, keeping the extension's case as
    /// it was on disk.
    fn original_of(&self, replacement: &Path) -> PathBuf {
        self.state
            .accepted
            .iter()
            .find(|record| record.replacement == replacement)
            .map(|record| record.source.clone())
            .unwrap_or_else(|| self.languages.source_path(replacement))
    }

    fn summary(&self) -> SessionSummary {
        let files = self.accepted_files();
        let originals = self
            .state
            .accepted
            .iter()
            .map(|record| record.source.clone())
            .collect();
        SessionSummary {
            files,
            originals,
            cleanup_failures: 0,
        }
    }
}
