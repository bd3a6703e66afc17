//! Batch conversion engine: streaming worker, review session and IO.
mod batch;
mod fsops;
mod generate;
mod persist;
mod selection;
mod session;
mod sink;
mod types;
mod vcs;
mod worker;

pub use batch::{BatchController, BatchError, CommitOutcome, EnqueueSummary};
pub use fsops::{FileOps, FsError, FsOp, LocalFs};
pub use generate::{
    ChunkStream, GenerationSettings, Generator, OllamaGenerator, OpenAiGenerator, PromptTemplate,
};
pub use persist::{
    ensure_dir, load_session_record, remove_session_record, save_session_record,
    AtomicFileWriter, PersistError, RecordLoad, SESSION_FILENAME,
};
pub use selection::normalise_selection;
pub use session::{SessionError, SessionManager, SessionState, SessionSummary};
pub use sink::{MemorySink, Sink};
pub use types::{EngineConfig, GenerationError};
pub use vcs::{detect_vcs, GitCli, NoVcs, Vcs, VcsError};
pub use worker::{Worker, WorkerEvent, WorkerStatus};
