use std::time::Duration;

use batchconv_core::{LanguagePair, LastBlockExtractor};

/// Everything the worker and session need besides their collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub languages: LanguagePair,
    /// Legacy marker the extractor falls back to when no block is found.
    pub start_marker: Option<String>,
    /// Maximum wait for the response to start and between two streamed
    /// chunks. `None` waits forever.
    pub chunk_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn new(languages: LanguagePair) -> Self {
        Self {
            languages,
            ..Self::default()
        }
    }

    pub fn extractor(&self) -> LastBlockExtractor {
        let extractor = LastBlockExtractor::new(self.languages.tag());
        match &self.start_marker {
            Some(marker) => extractor.with_start_marker(marker.clone()),
            None => extractor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("http status {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed stream: {0}")]
    Protocol(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("backend returned no text")]
    EmptyResponse,
    #[error("no chunk received within {0:?}")]
    Timeout(Duration),
    #[error("failed to read source: {0}")]
    Source(String),
}
