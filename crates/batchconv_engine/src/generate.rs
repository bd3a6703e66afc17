use std::collections::VecDeque;
use std::time::Duration;

use batchconv_core::LanguagePair;
use batchconv_logging::{conv_debug, conv_info};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

use crate::GenerationError;

/// Ordered, finite stream of generated text chunks.
pub type ChunkStream = BoxStream<'static, Result<String, GenerationError>>;

/// The text-generation capability: full source text in, chunk stream out.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, source: &str) -> Result<ChunkStream, GenerationError>;
}

const DEFAULT_TEMPLATE: &str = "Translate the following source file into idiomatic {target}. \
Reply with the complete translated file wrapped in <{tag}></{tag}> tags.\n\n{source}";

/// Prompt text with a `{source}` placeholder; `{target}` and `{tag}` are
/// filled from the language pair up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: &str, languages: &LanguagePair) -> Self {
        let template = template
            .replace("{target}", &languages.display_name())
            .replace("{tag}", languages.tag());
        Self { template }
    }

    pub fn for_languages(languages: &LanguagePair) -> Self {
        Self::new(DEFAULT_TEMPLATE, languages)
    }

    pub fn render(&self, source: &str) -> String {
        self.template.replace("{source}", source)
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    pub prompt: PromptTemplate,
}

impl GenerationSettings {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, prompt: PromptTemplate) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            prompt,
        }
    }

    fn endpoint(&self, path: &str) -> Result<reqwest::Url, GenerationError> {
        let base = self.base_url.trim_end_matches('/');
        reqwest::Url::parse(&format!("{base}/{path}"))
            .map_err(|err| GenerationError::InvalidEndpoint(format!("{base}: {err}")))
    }

    fn build_client(&self) -> Result<reqwest::Client, GenerationError> {
        // No overall request timeout: a generation may legitimately stream for minutes.
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|err| GenerationError::Network(err.to_string()))
    }
}

/// Streams from an Ollama server (`POST /api/generate`, NDJSON response).
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    settings: GenerationSettings,
}

impl OllamaGenerator {
    pub fn new(settings: GenerationSettings) -> Self {
        Self { settings }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

fn parse_ollama_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Skip;
    }
    match serde_json::from_str::<OllamaLine>(line) {
        Ok(OllamaLine {
            error: Some(message),
            ..
        }) => LineOutcome::Fail(GenerationError::Backend(message)),
        Ok(parsed) if !parsed.response.is_empty() => LineOutcome::Chunk(parsed.response),
        Ok(parsed) if parsed.done => LineOutcome::Done,
        Ok(_) => LineOutcome::Skip,
        Err(err) => LineOutcome::Fail(GenerationError::Protocol(err.to_string())),
    }
}

#[async_trait::async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, source: &str) -> Result<ChunkStream, GenerationError> {
        let url = self.settings.endpoint("api/generate")?;
        let body = json!({
            "model": self.settings.model,
            "prompt": self.settings.prompt.render(source),
            "stream": true,
            "options": { "temperature": 0 },
        });
        conv_info!("Generating with ollama model {}", self.settings.model);
        let response = send_json(&self.settings, url, &body).await?;
        Ok(line_stream(response, parse_ollama_line))
    }
}

/// Streams from an OpenAI-compatible chat completions endpoint (server-sent events).
///
/// Works for any provider exposing the same API, given the matching `base_url`.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    settings: GenerationSettings,
}

impl OpenAiGenerator {
    pub fn new(settings: GenerationSettings) -> Self {
        Self { settings }
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    error: Option<ChatErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatErrorBody {
    message: String,
}

fn parse_sse_line(line: &str) -> LineOutcome {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments, `event:` and `id:` lines carry no text.
        return LineOutcome::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return LineOutcome::Done;
    }
    match serde_json::from_str::<ChatChunk>(data) {
        Ok(ChatChunk {
            error: Some(error), ..
        }) => LineOutcome::Fail(GenerationError::Backend(error.message)),
        Ok(chunk) => match chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
        {
            Some(content) if !content.is_empty() => LineOutcome::Chunk(content),
            _ => LineOutcome::Skip,
        },
        Err(err) => LineOutcome::Fail(GenerationError::Protocol(err.to_string())),
    }
}

#[async_trait::async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, source: &str) -> Result<ChunkStream, GenerationError> {
        let url = self.settings.endpoint("chat/completions")?;
        let body = json!({
            "model": self.settings.model,
            "messages": [{ "role": "user", "content": self.settings.prompt.render(source) }],
            "stream": true,
        });
        conv_info!("Generating with chat model {}", self.settings.model);
        let response = send_json(&self.settings, url, &body).await?;
        Ok(line_stream(response, parse_sse_line))
    }
}

async fn send_json(
    settings: &GenerationSettings,
    url: reqwest::Url,
    body: &serde_json::Value,
) -> Result<reqwest::Response, GenerationError> {
    let client = settings.build_client()?;
    let payload =
        serde_json::to_vec(body).map_err(|err| GenerationError::Protocol(err.to_string()))?;

    let mut request = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(payload);
    if let Some(key) = settings.api_key.as_deref().filter(|key| !key.is_empty()) {
        request = request.header(AUTHORIZATION, format!("Bearer {key}"));
    }

    let response = request.send().await.map_err(map_reqwest_error)?;
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(GenerationError::HttpStatus {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

enum LineOutcome {
    Chunk(String),
    Skip,
    Done,
    Fail(GenerationError),
}

/// Splits a byte stream into lines, tolerating lines split across network chunks.
#[derive(Debug, Default)]
struct LineDecoder {
    buffer: BytesMut,
}

impl LineDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split_to(self.buffer.len());
        Some(String::from_utf8_lossy(&rest[..]).into_owned())
    }
}

struct LineState {
    bytes: BoxStream<'static, Result<Bytes, GenerationError>>,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

fn line_stream(response: reqwest::Response, parse: fn(&str) -> LineOutcome) -> ChunkStream {
    let state = LineState {
        bytes: response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed(),
        decoder: LineDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                match parse(&line) {
                    LineOutcome::Chunk(text) => return Some((Ok(text), state)),
                    LineOutcome::Skip => continue,
                    LineOutcome::Done => {
                        conv_debug!("Generation stream reported completion");
                        return None;
                    }
                    LineOutcome::Fail(err) => {
                        state.finished = true;
                        state.pending.clear();
                        return Some((Err(err), state));
                    }
                }
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.decoder.push(&chunk);
                    state.pending.extend(lines);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    let rest = state.decoder.finish();
                    state.pending.extend(rest);
                }
            }
        }
    })
    .boxed()
}

fn map_reqwest_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        return GenerationError::Network(format!("timeout: {err}"));
    }
    GenerationError::Network(err.to_string())
}
