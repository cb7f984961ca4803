//! End-to-end tests for the SurveyChat relay.
//!
//! These drive the gateway router with the real Responses API provider
//! pointed at an in-process stub upstream, covering the whole path from an
//! inbound survey request to the upstream call and back.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{Request, StatusCode, header};
use axum::routing::post;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use surveychat_config::AppConfig;
use surveychat_gateway::{GatewayState, build_router};
use surveychat_providers::OpenAiResponsesProvider;
use tower::ServiceExt;

// ── Stub upstream ────────────────────────────────────────────────────────

/// Fake Responses + Files API. Records what it receives.
struct Upstream {
    completion_status: StatusCode,
    completion_body: Value,
    completions: Mutex<Vec<Value>>,
    uploads: Mutex<Vec<(String, usize)>>,
}

impl Upstream {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            completion_status: StatusCode::OK,
            completion_body: json!({
                "id": "resp_e2e",
                "output": [{
                    "type": "message",
                    "role": "assistant",
                    "content": [{"type": "output_text", "text": text, "annotations": []}]
                }]
            }),
            completions: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        })
    }

    fn failing(status: StatusCode, body: Value) -> Arc<Self> {
        Arc::new(Self {
            completion_status: status,
            completion_body: body,
            completions: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        })
    }
}

async fn responses(State(upstream): State<Arc<Upstream>>, body: String) -> (StatusCode, String) {
    let request: Value = serde_json::from_str(&body).unwrap();
    upstream.completions.lock().unwrap().push(request);
    (
        upstream.completion_status,
        upstream.completion_body.to_string(),
    )
}

async fn files(State(upstream): State<Arc<Upstream>>, mut multipart: Multipart) -> String {
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or_default().to_string();
            let len = field.bytes().await.unwrap().len();
            upstream.uploads.lock().unwrap().push((name, len));
        }
    }
    json!({"id": "file-e2e", "object": "file", "purpose": "user_data"}).to_string()
}

async fn spawn_upstream(upstream: Arc<Upstream>) -> String {
    let app = Router::new()
        .route("/v1/responses", post(responses))
        .route("/v1/files", post(files))
        .with_state(upstream);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1")
}

async fn gateway(upstream: Arc<Upstream>) -> Router {
    let mut config = AppConfig::default();
    config.api_key = Some("sk-e2e".into());
    config.api_base_url = spawn_upstream(upstream).await;

    let provider = Arc::new(OpenAiResponsesProvider::from_config(&config).unwrap());
    build_router(Arc::new(GatewayState::new(
        &config,
        provider.clone(),
        provider,
    )))
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ORIGIN, "https://survey.qualtrics.com")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn pdf_request(filename: &str, bytes: &[u8], topic: &str) -> Request<Body> {
    let boundary = "e2e-boundary";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"topic\"\r\n\r\n{topic}\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/pdf\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/pdf-start")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ── E2E: Survey chat ─────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_chat_with_survey_context() {
    let upstream = Upstream::replying("Thanks! Tell me more about your lunch.");
    let app = gateway(upstream.clone()).await;

    let response = app
        .oneshot(json_request(
            "/api/chat",
            json!({
                "conversation": [{"role": "user", "content": "I skipped breakfast."}],
                "embeddedData": {"age": "29", "topic": "meals"}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body = read_json(response).await;
    assert_eq!(body["reply"], "Thanks! Tell me more about your lunch.");
    assert_eq!(body["conversation"][1]["role"], "assistant");

    let completions = upstream.completions.lock().unwrap();
    assert_eq!(completions.len(), 1);
    let sent = &completions[0];
    assert_eq!(sent["model"], "gpt-4o-mini");
    assert_eq!(sent["input"][0]["role"], "system");
    assert!(
        sent["input"][0]["content"][1]["text"]
            .as_str()
            .unwrap()
            .starts_with("Earlier answers: ")
    );
    assert_eq!(sent["input"][1]["content"][0]["type"], "input_text");
    assert_eq!(sent["input"][1]["content"][0]["text"], "I skipped breakfast.");
}

// ── E2E: Document upload, then follow-up ─────────────────────────────────

#[tokio::test]
async fn e2e_pdf_start_then_follow_up() {
    let upstream = Upstream::replying("Your menu is balanced. Ask me anything.");
    let app = gateway(upstream.clone()).await;

    // Upload and opening turn.
    let started = app
        .clone()
        .oneshot(pdf_request("menu.pdf", b"%PDF-1.7 weekly menu", "nutrition"))
        .await
        .unwrap();
    assert_eq!(started.status(), StatusCode::OK);
    let started = read_json(started).await;
    assert_eq!(started["file_id"], "file-e2e");
    assert_eq!(started["reply"], "Your menu is balanced. Ask me anything.");
    assert_eq!(
        upstream.uploads.lock().unwrap().as_slice(),
        &[("menu.pdf".to_string(), 20)]
    );

    // Follow-up carrying the history the caller got back.
    let mut conversation = started["conversation"].as_array().unwrap().clone();
    conversation.push(json!({"role": "user", "content": "Is Tuesday too salty?"}));
    let followed = app
        .oneshot(json_request(
            "/api/pdf-turn",
            json!({"file_id": started["file_id"], "conversation": conversation}),
        ))
        .await
        .unwrap();
    assert_eq!(followed.status(), StatusCode::OK);
    let followed = read_json(followed).await;
    assert_eq!(
        followed["conversation"].as_array().unwrap().len(),
        conversation.len() + 1
    );

    let completions = upstream.completions.lock().unwrap();
    assert_eq!(completions.len(), 2);

    // Opening turn: system, then the synthesized user block carrying the file.
    let opening = completions[0]["input"].as_array().unwrap();
    assert_eq!(opening.len(), 2);
    assert_eq!(opening[1]["content"][1]["type"], "input_file");
    assert_eq!(opening[1]["content"][1]["file_id"], "file-e2e");

    // Follow-up: the file rides on the latest user turn only.
    let follow_up = completions[1]["input"].as_array().unwrap();
    let last = follow_up.last().unwrap();
    assert_eq!(last["content"][0]["text"], "Is Tuesday too salty?");
    assert_eq!(last["content"][1]["file_id"], "file-e2e");
    let file_parts = follow_up
        .iter()
        .flat_map(|block| block["content"].as_array().unwrap())
        .filter(|part| part["type"] == "input_file")
        .count();
    assert_eq!(file_parts, 1);
    let assistant = follow_up
        .iter()
        .find(|block| block["role"] == "assistant")
        .unwrap();
    assert_eq!(assistant["content"][0]["type"], "output_text");
}

// ── E2E: Upstream failures ───────────────────────────────────────────────

#[tokio::test]
async fn e2e_upstream_error_forwarded() {
    let upstream = Upstream::failing(
        StatusCode::UNAUTHORIZED,
        json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}),
    );
    let app = gateway(upstream).await;

    let response = app
        .oneshot(json_request(
            "/api/chat",
            json!({"conversation": [{"role": "user", "content": "hello"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["vary"], "Origin");
    let body = read_json(response).await;
    assert!(body["error"].is_string());
    assert!(
        body["body"]
            .as_str()
            .unwrap()
            .contains("Incorrect API key provided")
    );
}

#[tokio::test]
async fn e2e_pdf_turn_requires_file_id() {
    let upstream = Upstream::replying("unused");
    let app = gateway(upstream.clone()).await;

    let response = app
        .oneshot(json_request(
            "/api/pdf-turn",
            json!({"conversation": [{"role": "user", "content": "What about page 2?"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"], "Missing file_id");
    assert!(upstream.completions.lock().unwrap().is_empty());
}

// ── E2E: Configuration ───────────────────────────────────────────────────

#[test]
fn e2e_config_defaults_and_roundtrip() {
    let config = AppConfig::default();

    assert_eq!(config.default_model, "gpt-4o-mini");
    assert_eq!(config.request_timeout_secs, 60);
    assert!(config.gateway.port > 0);
    assert!(config.cors.allow_all);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, AppConfig::default_toml()).unwrap();
    let reparsed = AppConfig::load_from(&path).expect("default TOML should load back");

    assert_eq!(reparsed.default_model, config.default_model);
    assert_eq!(reparsed.gateway.port, config.gateway.port);
    assert_eq!(
        reparsed.prompts.opening_prompt,
        config.prompts.opening_prompt
    );
}
