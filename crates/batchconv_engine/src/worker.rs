use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use batchconv_core::{
    CompletedJob, Extractor, Job, JobId, JobQueue, JobStatus, LastBlockExtractor, Observers,
    QueueEvent, Subscription,
};
use batchconv_logging::{conv_debug, conv_error, conv_info, conv_warn};
use futures_util::StreamExt;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{EngineConfig, FileOps, GenerationError, Generator, Sink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Busy { job: Job },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Started(JobId),
    Finished { job_id: JobId, error: bool },
    /// The job stopped being current before generation resolved; nothing was published.
    Abandoned(JobId),
    CompletedRemoved(JobId),
    CompletedCleared,
}

/// Drains the queue one job at a time.
///
/// Queue changes trigger a start attempt; an attempt while busy is a no-op.
/// After each job the worker re-attempts immediately, so a backlog drains
/// without external re-triggering. Cloning yields another handle to the same worker.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    queue: Arc<JobQueue>,
    sink: Arc<dyn Sink>,
    generator: Arc<dyn Generator>,
    fs: Arc<dyn FileOps>,
    extractor: LastBlockExtractor,
    config: EngineConfig,
    busy: AtomicBool,
    current: Mutex<Option<Job>>,
    completed: Mutex<Vec<CompletedJob>>,
    observers: Observers<WorkerEvent>,
    status_tx: watch::Sender<WorkerStatus>,
    shutdown: CancellationToken,
    queue_subscription: Mutex<Option<Subscription>>,
}

impl Worker {
    pub fn new(
        config: EngineConfig,
        queue: Arc<JobQueue>,
        sink: Arc<dyn Sink>,
        generator: Arc<dyn Generator>,
        fs: Arc<dyn FileOps>,
    ) -> Self {
        let (status_tx, _) = watch::channel(WorkerStatus::Idle);
        Self {
            inner: Arc::new(WorkerInner {
                queue,
                sink,
                generator,
                fs,
                extractor: config.extractor(),
                config,
                busy: AtomicBool::new(false),
                current: Mutex::new(None),
                completed: Mutex::new(Vec::new()),
                observers: Observers::new(),
                status_tx,
                shutdown: CancellationToken::new(),
                queue_subscription: Mutex::new(None),
            }),
        }
    }

    /// Subscribes to queue changes and drains anything already queued.
    ///
    /// Must be called from within a tokio runtime; jobs run on that runtime.
    pub fn start(&self) -> Result<(), TryCurrentError> {
        let handle = Handle::try_current()?;
        let weak = Arc::downgrade(&self.inner);
        let spawn_handle = handle.clone();
        let subscription = self.inner.queue.subscribe(move |_event: &QueueEvent| {
            if let Some(inner) = weak.upgrade() {
                spawn_handle.spawn(inner.maybe_start());
            }
        });
        *lock(&self.inner.queue_subscription) = Some(subscription);
        handle.spawn(Arc::clone(&self.inner).maybe_start());
        Ok(())
    }

    /// Stops reacting to the queue. A generation in flight still runs to completion.
    pub fn dispose(&self) {
        self.inner.shutdown.cancel();
        lock(&self.inner.queue_subscription).take();
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&WorkerEvent) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(callback)
    }

    pub fn watch_status(&self) -> watch::Receiver<WorkerStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn status(&self) -> WorkerStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<Job> {
        lock(&self.inner.current).clone()
    }

    pub fn is_running(&self, source: &Path) -> bool {
        lock(&self.inner.current)
            .as_ref()
            .is_some_and(|job| job.source == source)
    }

    /// Forgets the running job; its result will not be published when generation resolves.
    pub fn abandon_current(&self) -> Option<Job> {
        let job = lock(&self.inner.current).take();
        if let Some(job) = &job {
            conv_info!("Abandoning conversion of {}", job.source.display());
        }
        job
    }

    pub fn completed(&self) -> Vec<CompletedJob> {
        lock(&self.inner.completed).clone()
    }

    pub fn completed_job(&self, job_id: JobId) -> Option<CompletedJob> {
        lock(&self.inner.completed)
            .iter()
            .find(|entry| entry.job.id == job_id)
            .cloned()
    }

    /// Discards a completed entry and its published result.
    pub fn remove_completed(&self, job_id: JobId) -> Option<CompletedJob> {
        let removed = {
            let mut completed = lock(&self.inner.completed);
            let index = completed.iter().position(|entry| entry.job.id == job_id)?;
            completed.remove(index)
        };
        self.inner.sink.clear(&removed.result_key);
        self.inner
            .observers
            .notify(&WorkerEvent::CompletedRemoved(job_id));
        Some(removed)
    }

    pub fn clear_completed(&self) {
        let removed = std::mem::take(&mut *lock(&self.inner.completed));
        for entry in &removed {
            self.inner.sink.clear(&entry.result_key);
        }
        self.inner.observers.notify(&WorkerEvent::CompletedCleared);
    }

    /// Resolves once the worker is idle and the queue is empty.
    ///
    /// Never resolves if jobs are queued but the worker was not started.
    pub async fn wait_idle(&self) {
        let mut status = self.inner.status_tx.subscribe();
        loop {
            let _ = status.borrow_and_update();
            // Queue first: a dequeue is always preceded by taking the busy flag.
            if self.inner.queue.is_empty() && !self.inner.busy.load(Ordering::SeqCst) {
                return;
            }
            if status.changed().await.is_err() {
                return;
            }
        }
    }
}

impl WorkerInner {
    async fn maybe_start(self: Arc<Self>) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            if self
                .busy
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }

            let Some(mut job) = self.queue.dequeue() else {
                self.release();
                // An enqueue may have raced the release; its own attempt saw us busy.
                if self.queue.is_empty() {
                    return;
                }
                continue;
            };
            job.status = JobStatus::Running;
            *lock(&self.current) = Some(job.clone());
            self.status_tx
                .send_replace(WorkerStatus::Busy { job: job.clone() });
            self.observers.notify(&WorkerEvent::Started(job.id));

            let event = self.run(job).await;

            lock(&self.current).take();
            self.release();
            self.observers.notify(&event);
        }
    }

    fn release(&self) {
        self.busy.store(false, Ordering::SeqCst);
        self.status_tx.send_replace(WorkerStatus::Idle);
    }

    fn is_current(&self, job_id: JobId) -> bool {
        lock(&self.current)
            .as_ref()
            .is_some_and(|job| job.id == job_id)
    }

    async fn run(&self, mut job: Job) -> WorkerEvent {
        conv_info!("Converting {} (job {})", job.source.display(), job.id);

        let outcome = self.generate(&job).await;
        if !self.is_current(job.id) {
            conv_warn!(
                "Job {} for {} was abandoned; dropping its result",
                job.id,
                job.source.display()
            );
            self.sink.clear(&job.progress_key);
            return WorkerEvent::Abandoned(job.id);
        }

        let job_id = job.id;
        let entry = match outcome {
            Ok(raw) => {
                let text = self.extractor.extract(&raw);
                let result_key = self.config.languages.result_key(&job.source);
                self.sink.clear(&job.progress_key);
                self.sink.set(&result_key, text.clone());
                job.status = JobStatus::Done;
                conv_info!(
                    "Converted {} ({} chars generated, {} extracted)",
                    job.source.display(),
                    raw.len(),
                    text.len()
                );
                CompletedJob {
                    job,
                    result_key,
                    text,
                    error: false,
                }
            }
            Err(err) => {
                conv_error!("Error converting {}: {}", job.source.display(), err);
                self.sink.set(&job.progress_key, err.to_string());
                job.status = JobStatus::Error;
                CompletedJob {
                    result_key: job.progress_key.clone(),
                    job,
                    text: err.to_string(),
                    error: true,
                }
            }
        };

        let error = entry.error;
        lock(&self.completed).push(entry);
        WorkerEvent::Finished { job_id, error }
    }

    async fn generate(&self, job: &Job) -> Result<String, GenerationError> {
        let source = self
            .fs
            .read_to_string(&job.source)
            .await
            .map_err(|err| GenerationError::Source(err.to_string()))?;
        let request = self.generator.generate(&source);
        let mut stream = match self.config.chunk_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| GenerationError::Timeout(limit))??,
            None => request.await?,
        };

        let mut buffer = String::new();
        loop {
            let next = match self.config.chunk_timeout {
                Some(limit) => tokio::time::timeout(limit, stream.next())
                    .await
                    .map_err(|_| GenerationError::Timeout(limit))?,
                None => stream.next().await,
            };
            let Some(chunk) = next else {
                break;
            };
            buffer.push_str(&chunk?);
            if self.is_current(job.id) {
                self.sink.set(&job.progress_key, buffer.clone());
            }
        }
        conv_debug!("Stream for job {} ended after {} chars", job.id, buffer.len());

        if buffer.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(buffer)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
