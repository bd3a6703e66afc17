use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use batchconv_logging::conv_debug;

use crate::{Job, JobId, JobStatus, LanguagePair, Observers, Subscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Enqueued(JobId),
    Dequeued(JobId),
    Cleared,
}

/// FIFO of pending conversion jobs.
///
/// The queue does not deduplicate; callers check [`JobQueue::contains_source`]
/// and the worker's running job before enqueueing.
pub struct JobQueue {
    languages: LanguagePair,
    queued: Mutex<VecDeque<Job>>,
    next_id: AtomicU64,
    observers: Observers<QueueEvent>,
}

impl JobQueue {
    pub fn new(languages: LanguagePair) -> Self {
        Self {
            languages,
            queued: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            observers: Observers::new(),
        }
    }

    pub fn languages(&self) -> &LanguagePair {
        &self.languages
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn enqueue(&self, source: PathBuf) -> Job {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = Job::new(id, source, &self.languages);
        conv_debug!("queue: enqueued job {} for {}", id, job.source.display());
        self.lock().push_back(job.clone());
        self.observers.notify(&QueueEvent::Enqueued(id));
        job
    }

    /// Removes the earliest queued job. Only notifies when something was removed.
    pub fn dequeue(&self) -> Option<Job> {
        let job = {
            let mut queued = self.lock();
            let index = queued
                .iter()
                .position(|job| job.status == JobStatus::Queued)?;
            queued.remove(index)
        }?;
        self.observers.notify(&QueueEvent::Dequeued(job.id));
        Some(job)
    }

    pub fn peek(&self) -> Option<Job> {
        self.lock().front().cloned()
    }

    pub fn to_vec(&self) -> Vec<Job> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains_source(&self, source: &Path) -> bool {
        self.lock().iter().any(|job| job.source == source)
    }

    /// Drops every pending job.
    pub fn clear(&self) {
        let removed = {
            let mut queued = self.lock();
            let removed = queued.len();
            queued.clear();
            removed
        };
        if removed > 0 {
            self.observers.notify(&QueueEvent::Cleared);
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.queued.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
