//! Batch conversion core: job model, queue, observers and code extraction.
//!
//! Nothing in here touches the filesystem or the network.
mod extract;
mod job;
mod observe;
mod paths;
mod queue;

pub use extract::{Extractor, LastBlockExtractor};
pub use job::{AcceptedRecord, CompletedJob, Job, JobId, JobStatus};
pub use observe::{Observers, Subscription};
pub use paths::{ConfigError, KeyKind, LanguagePair, SinkKey};
pub use queue::{JobQueue, QueueEvent};
