use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use batchconv_core::{JobQueue, JobStatus, LanguagePair};
use batchconv_engine::{
    ChunkStream, EngineConfig, GenerationError, Generator, LocalFs, MemorySink, Sink, Worker,
    WorkerEvent, WorkerStatus,
};
use futures_util::stream::{self, StreamExt};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio::time::timeout;

static LOGGING: Once = Once::new();

fn init_logging() {
    LOGGING.call_once(batchconv_logging::initialize_for_tests);
}

const WAIT: Duration = Duration::from_secs(10);

/// Wraps the source in tags over three chunks; a source containing `FAIL`
/// streams one chunk and then errors.
struct Scripted;

#[async_trait::async_trait]
impl Generator for Scripted {
    async fn generate(&self, source: &str) -> Result<ChunkStream, GenerationError> {
        let body = source.trim().replace("class", "object");
        let chunks: Vec<Result<String, GenerationError>> = if source.contains("FAIL") {
            vec![
                Ok("partial".to_string()),
                Err(GenerationError::Backend("model crashed".to_string())),
            ]
        } else {
            vec![
                Ok("Thinking...\n<kotlin>".to_string()),
                Ok(body),
                Ok("</kotlin>".to_string()),
            ]
        };
        Ok(stream::iter(chunks).boxed())
    }
}

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    queue: Arc<JobQueue>,
    sink: Arc<MemorySink>,
    worker: Worker,
}

fn fixture(generator: Arc<dyn Generator>, config: EngineConfig) -> Fixture {
    init_logging();
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    let queue = Arc::new(JobQueue::new(config.languages.clone()));
    let sink = Arc::new(MemorySink::new());
    let worker = Worker::new(
        config,
        Arc::clone(&queue),
        Arc::clone(&sink) as Arc<dyn Sink>,
        generator,
        Arc::new(LocalFs),
    );
    Fixture {
        _temp: temp,
        root,
        queue,
        sink,
        worker,
    }
}

fn write_source(root: &Path, name: &str, text: &str) -> PathBuf {
    let path = root.join(name);
    fs::write(&path, text).unwrap();
    path
}

#[tokio::test]
async fn success_then_error_are_both_recorded_in_order() {
    let fx = fixture(Arc::new(Scripted), EngineConfig::default());
    let a = write_source(&fx.root, "A.java", "class A {}");
    let b = write_source(&fx.root, "B.java", "FAIL");

    fx.worker.start().unwrap();
    fx.queue.enqueue(a.clone());
    fx.queue.enqueue(b.clone());
    timeout(WAIT, fx.worker.wait_idle()).await.unwrap();

    let completed = fx.worker.completed();
    let flags: Vec<_> = completed.iter().map(|entry| entry.error).collect();
    assert_eq!(flags, vec![false, true]);
    assert!(fx.queue.is_empty());

    assert_eq!(completed[0].job.source, a);
    assert_eq!(completed[0].job.status, JobStatus::Done);
    assert_eq!(completed[0].text, "object A {}");
    assert_eq!(completed[1].job.status, JobStatus::Error);
    assert!(completed[1].text.contains("model crashed"));

    let languages = LanguagePair::default();
    assert_eq!(fx.sink.get(&languages.result_key(&a)), "object A {}");
    assert!(!fx.sink.contains(&languages.progress_key(&a)));
    assert!(!fx.sink.contains(&languages.result_key(&b)));
    assert_eq!(fx.worker.status(), WorkerStatus::Idle);
}

#[tokio::test]
async fn unreadable_source_becomes_an_error_entry() {
    let fx = fixture(Arc::new(Scripted), EngineConfig::default());
    fx.worker.start().unwrap();
    fx.queue.enqueue(fx.root.join("Missing.java"));
    timeout(WAIT, fx.worker.wait_idle()).await.unwrap();

    let completed = fx.worker.completed();
    assert_eq!(completed.len(), 1);
    assert!(completed[0].error);
    assert!(completed[0].text.starts_with("failed to read source"));
}

#[tokio::test]
async fn jobs_queued_before_start_are_drained() {
    let fx = fixture(Arc::new(Scripted), EngineConfig::default());
    for name in ["A.java", "B.java", "C.java"] {
        let path = write_source(&fx.root, name, "class X");
        fx.queue.enqueue(path);
    }

    fx.worker.start().unwrap();
    timeout(WAIT, fx.worker.wait_idle()).await.unwrap();

    let sources: Vec<_> = fx
        .worker
        .completed()
        .into_iter()
        .map(|entry| entry.job.source.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(sources, vec!["A.java", "B.java", "C.java"]);
}

/// Tracks how many generations overlap.
#[derive(Default)]
struct Counting {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Generator for Counting {
    async fn generate(&self, _source: &str) -> Result<ChunkStream, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let active = Arc::clone(&self.active);
        Ok(stream::once(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok("<kotlin>done</kotlin>".to_string())
        })
        .boxed())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_runs_two_jobs_at_once() {
    let generator = Arc::new(Counting::default());
    let fx = fixture(Arc::clone(&generator) as Arc<dyn Generator>, EngineConfig::default());

    let running = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&running);
    let _sub = fx.worker.subscribe(move |event| {
        if let WorkerEvent::Started(id) = event {
            seen.lock().unwrap().push(*id);
        }
    });
    fx.worker.start().unwrap();

    let mut producers = Vec::new();
    for batch in 0..4 {
        let queue = Arc::clone(&fx.queue);
        let root = fx.root.clone();
        producers.push(tokio::spawn(async move {
            for n in 0..5 {
                let path = write_source(&root, &format!("F{batch}_{n}.java"), "class F");
                queue.enqueue(path);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    timeout(WAIT, fx.worker.wait_idle()).await.unwrap();

    assert_eq!(generator.peak.load(Ordering::SeqCst), 1);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 20);
    assert_eq!(fx.worker.completed().len(), 20);
    assert_eq!(running.lock().unwrap().len(), 20);
}

#[tokio::test]
async fn progress_and_result_slots_never_coexist() {
    let fx = fixture(Arc::new(Scripted), EngineConfig::default());
    let a = write_source(&fx.root, "A.java", "class A");
    let languages = LanguagePair::default();
    let progress = languages.progress_key(&a);
    let result = languages.result_key(&a);

    let overlaps = Arc::new(AtomicUsize::new(0));
    let progress_updates = Arc::new(AtomicUsize::new(0));
    let sink = Arc::downgrade(&fx.sink);
    let (overlap_count, update_count) = (Arc::clone(&overlaps), Arc::clone(&progress_updates));
    let _sub = fx.sink.subscribe(move |key| {
        let Some(sink) = sink.upgrade() else {
            return;
        };
        if sink.contains(&progress) && sink.contains(&result) {
            overlap_count.fetch_add(1, Ordering::SeqCst);
        }
        if *key == progress && sink.contains(&progress) {
            update_count.fetch_add(1, Ordering::SeqCst);
        }
    });

    fx.worker.start().unwrap();
    fx.queue.enqueue(a);
    timeout(WAIT, fx.worker.wait_idle()).await.unwrap();

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(progress_updates.load(Ordering::SeqCst), 3);
}

/// Holds its single chunk back until released.
struct Gated {
    release: Arc<Notify>,
}

#[async_trait::async_trait]
impl Generator for Gated {
    async fn generate(&self, _source: &str) -> Result<ChunkStream, GenerationError> {
        let release = Arc::clone(&self.release);
        Ok(stream::once(async move {
            release.notified().await;
            Ok("<kotlin>late</kotlin>".to_string())
        })
        .boxed())
    }
}

#[tokio::test]
async fn abandoned_job_publishes_nothing() {
    let release = Arc::new(Notify::new());
    let fx = fixture(
        Arc::new(Gated {
            release: Arc::clone(&release),
        }),
        EngineConfig::default(),
    );
    let a = write_source(&fx.root, "A.java", "class A");

    let events = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    let _sub = fx
        .worker
        .subscribe(move |event| log.lock().unwrap().push(event.clone()));

    let mut status = fx.worker.watch_status();
    fx.worker.start().unwrap();
    let job = fx.queue.enqueue(a.clone());
    timeout(
        WAIT,
        status.wait_for(|status| matches!(status, WorkerStatus::Busy { .. })),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(fx.worker.is_running(&a));
    assert_eq!(fx.worker.abandon_current().map(|job| job.id), Some(job.id));
    release.notify_one();
    timeout(WAIT, fx.worker.wait_idle()).await.unwrap();

    let languages = LanguagePair::default();
    assert!(fx.worker.completed().is_empty());
    assert!(!fx.sink.contains(&languages.result_key(&a)));
    assert!(!fx.sink.contains(&languages.progress_key(&a)));
    assert_eq!(
        events.lock().unwrap().clone(),
        vec![WorkerEvent::Started(job.id), WorkerEvent::Abandoned(job.id)]
    );
}

#[tokio::test]
async fn stalled_stream_times_out_when_configured() {
    struct Stalls;

    #[async_trait::async_trait]
    impl Generator for Stalls {
        async fn generate(&self, _source: &str) -> Result<ChunkStream, GenerationError> {
            Ok(stream::iter([Ok("<kotlin>".to_string())])
                .chain(stream::pending())
                .boxed())
        }
    }

    let config = EngineConfig {
        chunk_timeout: Some(Duration::from_millis(50)),
        ..EngineConfig::default()
    };
    let fx = fixture(Arc::new(Stalls), config);
    let a = write_source(&fx.root, "A.java", "class A");
    let b = write_source(&fx.root, "B.java", "class B");

    fx.worker.start().unwrap();
    fx.queue.enqueue(a);
    fx.queue.enqueue(b);
    timeout(WAIT, fx.worker.wait_idle()).await.unwrap();

    let completed = fx.worker.completed();
    assert_eq!(completed.len(), 2);
    assert!(completed.iter().all(|entry| entry.error));
    assert!(completed[0].text.starts_with("no chunk received"));
}

#[tokio::test]
async fn unanswered_request_times_out_when_configured() {
    struct NeverAnswers;

    #[async_trait::async_trait]
    impl Generator for NeverAnswers {
        async fn generate(&self, _source: &str) -> Result<ChunkStream, GenerationError> {
            std::future::pending().await
        }
    }

    let config = EngineConfig {
        chunk_timeout: Some(Duration::from_millis(50)),
        ..EngineConfig::default()
    };
    let fx = fixture(Arc::new(NeverAnswers), config);
    let a = write_source(&fx.root, "A.java", "class A");

    fx.worker.start().unwrap();
    let job = fx.queue.enqueue(a);
    timeout(WAIT, fx.worker.wait_idle()).await.unwrap();

    let completed = fx.worker.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].job.id, job.id);
    assert!(completed[0].error);
    assert!(!fx.worker.is_busy());
}

#[tokio::test]
async fn removing_a_completed_entry_clears_its_result() {
    let fx = fixture(Arc::new(Scripted), EngineConfig::default());
    let a = write_source(&fx.root, "A.java", "class A");
    fx.worker.start().unwrap();
    let job = fx.queue.enqueue(a.clone());
    timeout(WAIT, fx.worker.wait_idle()).await.unwrap();

    let removed = fx.worker.remove_completed(job.id).unwrap();
    assert_eq!(removed.job.id, job.id);
    assert!(fx.worker.completed().is_empty());
    assert!(fx.sink.keys().is_empty());
    assert!(fx.worker.remove_completed(job.id).is_none());
}

#[tokio::test]
async fn disposed_worker_ignores_new_jobs() {
    let fx = fixture(Arc::new(Scripted), EngineConfig::default());
    fx.worker.start().unwrap();
    timeout(WAIT, fx.worker.wait_idle()).await.unwrap();
    fx.worker.dispose();

    let a = write_source(&fx.root, "A.java", "class A");
    fx.queue.enqueue(a);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(fx.queue.len(), 1);
    assert!(fx.worker.completed().is_empty());
}
