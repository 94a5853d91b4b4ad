//! End-to-end tests of the HTTP surface with deterministic fake
//! providers: auth and webhook boundaries, the ask path, and multipart
//! ingestion.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use policyqa::{
    ChunkStore, Pipeline, PipelineConfig, VectorIndex,
    chunking::ChunkingConfig,
    embedding::EmbeddingProvider,
    error::Result,
    generate::AnswerGenerator,
    ingestion,
    prompt::Prompt,
    server::{self, AppState},
    webhook::WebhookState,
};
use serde_json::{Value, json};
use sha2::Sha256;
use tower::util::ServiceExt;

const VERIFY_TOKEN: &str = "verify-tok";
const APP_SECRET: &str = "app-secret";
const REPLY: &str = "You are entitled to 12 casual leave days per year.";

/// One dimension per keyword; texts sharing no keywords are orthogonal.
struct KeywordEmbedder;

const KEYWORDS: &[&str] = &["casual", "leave", "days", "notice", "period"];

impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                KEYWORDS
                    .iter()
                    .map(|k| lower.matches(k).count() as f32)
                    .collect()
            })
            .collect())
    }
}

struct FakeGenerator {
    calls: Arc<AtomicUsize>,
}

impl AnswerGenerator for FakeGenerator {
    async fn complete(&self, _prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(REPLY.to_string())
    }
}

struct TestContext {
    _tmp: tempfile::TempDir,
    state: Arc<AppState<KeywordEmbedder, FakeGenerator>>,
    generator_calls: Arc<AtomicUsize>,
}

impl TestContext {
    fn app(&self) -> Router {
        server::router(self.state.clone())
    }
}

async fn context(
    seed: bool,
    api_key: Option<&str>,
    webhook: bool,
) -> TestContext {
    let tmp = tempfile::tempdir().unwrap();
    let store =
        Arc::new(ChunkStore::open(&tmp.path().join("chunks.redb")).unwrap());

    if seed {
        let files = vec![
            (
                "leave_policy.txt".to_string(),
                b"Casual Leave: 12 days per year for all employees.".to_vec(),
            ),
            (
                "notice_policy.txt".to_string(),
                b"Notice Period: 60 days for senior roles.".to_vec(),
            ),
        ];
        let report = ingestion::ingest_batch(
            &store,
            &KeywordEmbedder,
            &ChunkingConfig::default(),
            &files,
        )
        .await;
        assert!(report.errors.is_empty());
    }

    let generator_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::new(
        VectorIndex::new(store.clone()),
        KeywordEmbedder,
        FakeGenerator {
            calls: generator_calls.clone(),
        },
        PipelineConfig {
            model_name: "fake-model".to_string(),
            ..PipelineConfig::default()
        },
    );

    let state = Arc::new(AppState {
        pipeline,
        store,
        chunking: ChunkingConfig::default(),
        api_key: api_key.map(str::to_string),
        webhook: webhook.then(|| WebhookState {
            verify_token: VERIFY_TOKEN.to_string(),
            app_secret: APP_SECRET.to_string(),
            sender: None,
        }),
    });

    TestContext {
        _tmp: tmp,
        state,
        generator_calls,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn ask_request(question: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/ask")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder
        .body(Body::from(
            json!({"question": question}).to_string(),
        ))
        .unwrap()
}

fn sign(body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(APP_SECRET.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn webhook_post(body: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-hub-signature-256", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn inbound_payload(text: &str) -> String {
    json!({
        "entry": [{
            "changes": [{
                "value": {
                    "messages": [
                        {"from": "15551234567", "text": {"body": text}}
                    ]
                }
            }]
        }]
    })
    .to_string()
}

#[tokio::test]
async fn healthz_ok() {
    let ctx = context(false, None, false).await;
    let response = ctx
        .app()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn ask_returns_grounded_answer() {
    let ctx = context(true, None, false).await;
    let response = ctx
        .app()
        .oneshot(ask_request("How many casual leave days do I get?", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert!(body["answer"].as_str().unwrap().contains("12"));
    let citations = body["citations"].as_array().unwrap();
    assert!(!citations.is_empty() && citations.len() <= 5);
    assert_eq!(citations[0]["doc_id"], "leave_policy.txt");
    assert_eq!(body["metadata"]["model"], "fake-model");
}

#[tokio::test]
async fn ask_refuses_when_nothing_matches() {
    let ctx = context(true, None, false).await;
    let response = ctx
        .app()
        .oneshot(ask_request("What is the office wifi password?", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(
        body["answer"],
        "I don't have that in policy, contact HR."
    );
    assert_eq!(body["policy_matches"], json!([]));
    assert_eq!(body["citations"], json!([]));
    assert_eq!(ctx.generator_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ask_on_empty_index_is_server_error() {
    let ctx = context(false, None, false).await;
    let response = ctx
        .app()
        .oneshot(ask_request("How many casual leave days?", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "retrieval backend unavailable");
}

#[tokio::test]
async fn configured_api_key_gates_ask() {
    let ctx = context(true, Some("secret"), false).await;

    let missing = ctx
        .app()
        .oneshot(ask_request("casual leave days", None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = ctx
        .app()
        .oneshot(ask_request("casual leave days", Some("nope")))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    // The pipeline never ran for the rejected requests.
    assert_eq!(ctx.generator_calls.load(Ordering::SeqCst), 0);

    let correct = ctx
        .app()
        .oneshot(ask_request("casual leave days", Some("secret")))
        .await
        .unwrap();
    assert_eq!(correct.status(), StatusCode::OK);
}

#[tokio::test]
async fn unconfigured_api_key_skips_the_check() {
    let ctx = context(true, None, false).await;
    let response = ctx
        .app()
        .oneshot(ask_request("casual leave days", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_ask_body_is_client_error() {
    let ctx = context(true, None, false).await;
    let request = Request::builder()
        .method("POST")
        .uri("/ask")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"not_a_question": true}"#))
        .unwrap();

    let response = ctx.app().oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn multipart_ingest_isolates_bad_files() {
    let ctx = context(false, None, false).await;
    let boundary = "policyqa-test-boundary";

    let mut body = String::new();
    for (name, content) in [
        ("leave_policy.txt", "Casual Leave: 12 days per year."),
        ("salary.pdf", "%PDF-1.4 not a text file"),
        ("exit_policy.txt", "Notice period is 60 days."),
    ] {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; \
             name=\"files\"; filename=\"{name}\"\r\nContent-Type: \
             text/plain\r\n\r\n{content}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));

    let request = Request::builder()
        .method("POST")
        .uri("/ingest")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = ctx.app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["upserted"], 2);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("salary.pdf:"));

    // The good files are now queryable.
    let docs = ctx
        .app()
        .oneshot(Request::get("/docs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let docs = body_json(docs).await;
    let ids: Vec<&str> = docs["docs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["doc_id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"leave_policy.txt"));
    assert!(ids.contains(&"exit_policy.txt"));
    assert!(!ids.contains(&"salary.pdf"));
}

#[tokio::test]
async fn docs_lookup() {
    let ctx = context(true, None, false).await;

    let found = ctx
        .app()
        .oneshot(
            Request::get("/docs/leave_policy.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(found.status(), StatusCode::OK);
    assert_eq!(body_json(found).await["doc_id"], "leave_policy.txt");

    let missing = ctx
        .app()
        .oneshot(
            Request::get("/docs/unknown.txt").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn feedback_is_acknowledged() {
    let ctx = context(false, None, false).await;
    let request = Request::builder()
        .method("POST")
        .uri("/feedback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"answer_id": "a1", "helpful": true}).to_string(),
        ))
        .unwrap();

    let response = ctx.app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn webhook_subscription_echoes_challenge() {
    let ctx = context(false, None, true).await;
    let response = ctx
        .app()
        .oneshot(
            Request::get(format!(
                "/webhook?mode=subscribe&challenge=1234&verify_token={VERIFY_TOKEN}"
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"1234");
}

#[tokio::test]
async fn webhook_subscription_rejects_wrong_token() {
    let ctx = context(false, None, true).await;
    let response = ctx
        .app()
        .oneshot(
            Request::get(
                "/webhook?mode=subscribe&challenge=1234&verify_token=wrong",
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_rejects_tampered_signature_before_parsing() {
    let ctx = context(true, None, true).await;

    // Well-formed payload, signature computed over different bytes.
    let payload = inbound_payload("How many casual leave days?");
    let tampered = sign(b"different body");

    let response = ctx
        .app()
        .oneshot(webhook_post(&payload, &tampered))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(ctx.generator_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn webhook_parses_only_after_verification() {
    let ctx = context(true, None, true).await;

    let garbage = "this is not json";
    let response = ctx
        .app()
        .oneshot(webhook_post(garbage, &sign(garbage.as_bytes())))
        .await
        .unwrap();

    // Verified, then rejected at the parse step.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_relays_verified_messages_through_the_pipeline() {
    let ctx = context(true, None, true).await;

    let payload = inbound_payload("How many casual leave days do I get?");
    let response = ctx
        .app()
        .oneshot(webhook_post(&payload, &sign(payload.as_bytes())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "processed"}));
    assert_eq!(ctx.generator_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unconfigured_webhook_rejects_traffic() {
    let ctx = context(false, None, false).await;
    let response = ctx
        .app()
        .oneshot(
            Request::get("/webhook?mode=subscribe&challenge=1&verify_token=x")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
