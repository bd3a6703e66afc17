use std::path::{Path, PathBuf};
use std::sync::Arc;

use batchconv_core::{CompletedJob, Job, JobId, JobQueue, LanguagePair};
use batchconv_logging::{conv_info, conv_warn};
use tokio::runtime::TryCurrentError;
use tokio::sync::Mutex;

use crate::{
    normalise_selection, EngineConfig, FileOps, Generator, MemorySink, SessionError,
    SessionManager, SessionState, SessionSummary, Sink, Vcs, VcsError, Worker,
};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("no completed conversion with id {0}")]
    UnknownJob(JobId),
    #[error("conversion {0} failed and cannot be accepted")]
    FailedJob(JobId),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("worker needs a tokio runtime: {0}")]
    Runtime(#[from] TryCurrentError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueSummary {
    pub enqueued: Vec<Job>,
    /// Files already queued or being converted.
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct CommitOutcome {
    pub summary: SessionSummary,
    pub message: String,
    /// Set when the session committed but version control did not.
    pub vcs_error: Option<VcsError>,
}

/// Composition root tying the queue, worker and session together.
pub struct BatchController {
    languages: LanguagePair,
    queue: Arc<JobQueue>,
    sink: Arc<MemorySink>,
    worker: Worker,
    session: Mutex<SessionManager>,
    vcs: Arc<dyn Vcs>,
}

impl BatchController {
    pub fn new(
        config: EngineConfig,
        generator: Arc<dyn Generator>,
        fs: Arc<dyn FileOps>,
        vcs: Arc<dyn Vcs>,
    ) -> Self {
        let languages = config.languages.clone();
        let queue = Arc::new(JobQueue::new(languages.clone()));
        let sink = Arc::new(MemorySink::new());
        let worker = Worker::new(
            config,
            Arc::clone(&queue),
            Arc::clone(&sink) as Arc<dyn Sink>,
            generator,
            Arc::clone(&fs),
        );
        let session = Mutex::new(SessionManager::new(fs, languages.clone()));

        Self {
            languages,
            queue,
            sink,
            worker,
            session,
            vcs,
        }
    }

    /// Resumes a persisted session under any of `roots` and starts the worker.
    /// Returns whether a session was resumed.
    pub async fn init(&self, roots: &[PathBuf]) -> Result<bool, BatchError> {
        let resumed = self.session.lock().await.load_from_disk(roots).await;
        self.worker.start()?;
        Ok(resumed)
    }

    pub fn dispose(&self) {
        self.worker.dispose();
    }

    pub fn languages(&self) -> &LanguagePair {
        &self.languages
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn sink(&self) -> &Arc<MemorySink> {
        &self.sink
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub async fn session_state(&self) -> SessionState {
        self.session.lock().await.state().clone()
    }

    /// Queues every source file in `selection`, starting a session at `root`
    /// if none is active. Relative paths resolve against `root`.
    pub async fn enqueue(
        &self,
        root: &Path,
        selection: &[PathBuf],
    ) -> Result<EnqueueSummary, BatchError> {
        self.session.lock().await.begin_if_required(root)?;

        let absolute: Vec<PathBuf> = selection.iter().map(|path| root.join(path)).collect();
        let mut summary = EnqueueSummary::default();
        for source in normalise_selection(&absolute, &self.languages) {
            if self.queue.contains_source(&source) || self.worker.is_running(&source) {
                summary.skipped.push(source);
                continue;
            }
            summary.enqueued.push(self.queue.enqueue(source));
        }

        conv_info!(
            "Queued {} file(s), skipped {} already pending",
            summary.enqueued.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    /// First successful conversion awaiting review.
    pub fn next_reviewable(&self) -> Option<CompletedJob> {
        self.worker
            .completed()
            .into_iter()
            .find(|entry| !entry.error)
    }

    /// Writes a completed conversion into the session, optionally with the
    /// reviewer's edits, and drops it from the review list.
    pub async fn accept(
        &self,
        job_id: JobId,
        edited: Option<String>,
    ) -> Result<PathBuf, BatchError> {
        let entry = self
            .worker
            .completed_job(job_id)
            .ok_or(BatchError::UnknownJob(job_id))?;
        if entry.error {
            return Err(BatchError::FailedJob(job_id));
        }

        let text = edited.unwrap_or(entry.text);
        // Sessions only start at enqueue, where the workspace root is known.
        let target = self
            .session
            .lock()
            .await
            .accept(&entry.job.source, &text)
            .await;

        match target {
            Ok(target) => {
                self.worker.remove_completed(job_id);
                Ok(target)
            }
            // The file landed but the record did not; keep the entry out of review.
            Err(SessionError::Persist(err)) => {
                self.worker.remove_completed(job_id);
                Err(SessionError::Persist(err).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Discards a completed conversion without touching the filesystem.
    pub fn cancel(&self, job_id: JobId) -> Result<CompletedJob, BatchError> {
        self.worker
            .remove_completed(job_id)
            .ok_or(BatchError::UnknownJob(job_id))
    }

    /// Drops queued jobs, abandons the running one, and clears the review list.
    pub fn cancel_pending(&self) {
        self.queue.clear();
        self.worker.abandon_current();
        self.worker.clear_completed();
    }

    /// Keeps every accepted replacement, then records them in version control.
    pub async fn commit(&self, message: Option<&str>) -> Result<CommitOutcome, BatchError> {
        let summary = self.session.lock().await.commit().await?;
        self.cancel_pending();

        let message = message.map(str::to_string).unwrap_or_else(|| {
            format!(
                "Convert {} files to {}",
                summary.files.len(),
                self.languages.display_name()
            )
        });

        let vcs_error = match self
            .vcs
            .commit_all(&summary.files, &summary.originals, &message)
            .await
        {
            Ok(()) => None,
            Err(err) => {
                conv_warn!("Session committed but {} commit failed: {}", self.vcs.name(), err);
                Some(err)
            }
        };

        Ok(CommitOutcome {
            summary,
            message,
            vcs_error,
        })
    }

    /// Restores every original and ends the session.
    pub async fn reject(&self) -> Result<SessionSummary, BatchError> {
        let result = self.session.lock().await.reject().await;
        self.cancel_pending();
        Ok(result?)
    }
}
