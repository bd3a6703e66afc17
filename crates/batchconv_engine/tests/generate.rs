use batchconv_core::LanguagePair;
use batchconv_engine::{
    ChunkStream, GenerationError, GenerationSettings, Generator, OllamaGenerator,
    OpenAiGenerator, PromptTemplate,
};
use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer) -> GenerationSettings {
    GenerationSettings::new(
        server.uri(),
        "coder",
        PromptTemplate::new("To {target}: {source}", &LanguagePair::default()),
    )
}

async fn collect(stream: ChunkStream) -> Vec<Result<String, GenerationError>> {
    stream.collect().await
}

#[tokio::test]
async fn ollama_streams_response_fields_in_order() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"response\":\"<kotlin>\",\"done\":false}\n",
        "{\"response\":\"class A\",\"done\":false}\n",
        "{\"response\":\"</kotlin>\",\"done\":false}\n",
        "{\"response\":\"\",\"done\":true}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "coder",
            "prompt": "To Kotlin: class A {}",
            "stream": true,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .expect(1)
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(settings(&server));
    let chunks = collect(generator.generate("class A {}").await.unwrap()).await;
    assert_eq!(
        chunks,
        vec![
            Ok("<kotlin>".to_string()),
            Ok("class A".to_string()),
            Ok("</kotlin>".to_string()),
        ]
    );
}

#[tokio::test]
async fn ollama_error_line_fails_the_stream() {
    let server = MockServer::start().await;
    let body = "{\"response\":\"cla\",\"done\":false}\n{\"error\":\"out of memory\"}\n";
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(settings(&server));
    let chunks = collect(generator.generate("class A {}").await.unwrap()).await;
    assert_eq!(
        chunks,
        vec![
            Ok("cla".to_string()),
            Err(GenerationError::Backend("out of memory".to_string())),
        ]
    );
}

#[tokio::test]
async fn openai_reads_sse_deltas_until_done() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"object \"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({ "model": "coder", "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = settings(&server);
    settings.base_url = format!("{}/v1/", server.uri());
    settings.api_key = Some("secret".to_string());
    let generator = OpenAiGenerator::new(settings);

    let chunks = collect(generator.generate("class A").await.unwrap()).await;
    assert_eq!(
        chunks,
        vec![Ok("object ".to_string()), Ok("A".to_string())]
    );
}

#[tokio::test]
async fn http_error_status_is_reported_before_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model 'coder' not found"))
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(settings(&server));
    let err = generator.generate("class A").await.err().unwrap();
    assert_eq!(
        err,
        GenerationError::HttpStatus {
            status: 404,
            message: "model 'coder' not found".to_string(),
        }
    );
}

#[tokio::test]
async fn unparsable_base_url_is_rejected() {
    let settings = GenerationSettings::new(
        "not a url",
        "coder",
        PromptTemplate::for_languages(&LanguagePair::default()),
    );
    let err = OllamaGenerator::new(settings)
        .generate("class A")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, GenerationError::InvalidEndpoint(_)));
}
