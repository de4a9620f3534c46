//! Tests for the fresh portrait path against an in-process mock of the
//! chat-completions endpoint.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use commentlens::config::{AiConfig, AppConfig};
use commentlens::error::Error;
use commentlens::models::OrderMode;
use commentlens::pipeline;
use commentlens::repository::RunStore;

/// Scripted replies for the mock provider.
struct MockLlm {
    /// Assistant message contents to serve, in order; `None` → HTTP 500.
    replies: Vec<Option<String>>,
    /// Request bodies received.
    requests: Vec<Value>,
}

type Shared = Arc<Mutex<MockLlm>>;

async fn chat_completions(State(state): State<Shared>, Json(body): Json<Value>) -> axum::response::Response {
    let mut state = state.lock().unwrap();
    state.requests.push(body);

    let reply = if state.replies.is_empty() {
        None
    } else {
        state.replies.remove(0)
    };

    match reply {
        Some(content) => Json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
        .into_response(),
        None => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "provider exploded",
        )
            .into_response(),
    }
}

/// Start the mock provider and return a config wired to it plus the state.
async fn setup(replies: Vec<Option<String>>) -> (AppConfig, Shared, tempfile::TempDir) {
    let shared: Shared = Arc::new(Mutex::new(MockLlm {
        replies,
        requests: Vec::new(),
    }));
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(shared.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        data_dir: dir.path().to_path_buf(),
        ai: AiConfig {
            api_key: Some("test-key".to_string()),
            api_url: Some(format!("http://{addr}/v1/chat/completions")),
            model: Some("test-model".to_string()),
            prompt_dir: dir.path().join("no-prompts"),
            ..AiConfig::default()
        },
        ..AppConfig::default()
    };
    (config, shared, dir)
}

/// Seed a cleaned run with two comments, returning the run id.
fn seed_cleaned_run(config: &AppConfig) -> i64 {
    let mut store = RunStore::open(&config.database_path()).unwrap();
    let run_id = store
        .insert_collection_run("vid-1", "https://youtu.be/vid-1", OrderMode::Relevance, 50)
        .unwrap();
    let items = vec![
        json!({
            "id": "t-1",
            "snippet": {
                "totalReplyCount": 0,
                "topLevelComment": {
                    "id": "c-1",
                    "snippet": {"authorDisplayName": "a", "likeCount": 2, "textDisplay": "love it"}
                }
            }
        }),
        json!({
            "id": "t-2",
            "snippet": {
                "totalReplyCount": 1,
                "topLevelComment": {
                    "id": "c-2",
                    "snippet": {"authorDisplayName": "b", "likeCount": 0, "textDisplay": "meh"}
                }
            }
        }),
    ];
    store.insert_raw_threads(run_id, "vid-1", &items).unwrap();
    drop(store);
    pipeline::clean_run(config, run_id).unwrap();
    run_id
}

#[tokio::test]
async fn fresh_portrait_is_generated_and_persisted() {
    let reply = r#"{"topics": ["music"], "sentiment": {"positive": 0.5, "neutral": 0.5, "negative": 0.0}, "languages": {"english": 1.0}, "tags": ["fans"], "summary": "Enthusiastic listeners."}"#;
    let (config, shared, _dir) = setup(vec![Some(reply.to_string())]).await;
    let run_id = seed_cleaned_run(&config);

    let result = pipeline::generate_portrait(&config, run_id, false).await.unwrap();
    assert!(!result.cached);
    assert!(result.parse_ok);
    assert_eq!(result.video_id.as_deref(), Some("vid-1"));
    assert_eq!(result.portrait.as_ref().unwrap()["topics"][0], "music");
    assert_eq!(result.provider, "deepseek");
    assert_eq!(result.model, "test-model");

    // The request carried the run's comments and the system prompt.
    let state = shared.lock().unwrap();
    assert_eq!(state.requests.len(), 1);
    let request = &state.requests[0];
    assert_eq!(request["model"], "test-model");
    assert_eq!(request["messages"][0]["role"], "system");
    let user_content = request["messages"][1]["content"].as_str().unwrap();
    let input: Value = serde_json::from_str(user_content).unwrap();
    assert_eq!(input["video_id"], "vid-1");
    assert_eq!(input["comments"].as_array().unwrap().len(), 2);
    assert_eq!(input["comments"][0]["comment_id"], "c-1");
    drop(state);

    let store = RunStore::open(&config.database_path()).unwrap();
    let record = store.get_ai_portrait(run_id).unwrap().unwrap();
    assert!(record.parse_ok);
    assert_eq!(record.portrait_raw.as_deref(), Some(reply));
}

#[tokio::test]
async fn second_call_is_cached_with_one_llm_call_total() {
    let reply = r#"{"summary": "ok"}"#;
    let (config, shared, _dir) = setup(vec![Some(reply.to_string())]).await;
    let run_id = seed_cleaned_run(&config);

    let first = pipeline::generate_portrait(&config, run_id, false).await.unwrap();
    let second = pipeline::generate_portrait(&config, run_id, false).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.portrait, second.portrait);
    assert_eq!(first.portrait_raw, second.portrait_raw);
    // Exactly one call reached the provider.
    assert_eq!(shared.lock().unwrap().requests.len(), 1);
}

#[tokio::test]
async fn overwrite_replaces_even_with_parse_failure() {
    let (config, shared, _dir) = setup(vec![
        Some(r#"{"summary": "first"}"#.to_string()),
        Some("I would rather write prose than JSON.".to_string()),
    ])
    .await;
    let run_id = seed_cleaned_run(&config);

    let first = pipeline::generate_portrait(&config, run_id, false).await.unwrap();
    assert!(first.parse_ok);

    // Forced regeneration issues a new call and persists the failed parse.
    let second = pipeline::generate_portrait(&config, run_id, true).await.unwrap();
    assert!(!second.cached);
    assert!(!second.parse_ok);
    assert!(second.portrait.is_none());
    assert_eq!(
        second.portrait_raw.as_deref(),
        Some("I would rather write prose than JSON.")
    );
    let error = second.error.unwrap();
    assert!(!error.is_empty());
    assert_eq!(shared.lock().unwrap().requests.len(), 2);

    let store = RunStore::open(&config.database_path()).unwrap();
    let record = store.get_ai_portrait(run_id).unwrap().unwrap();
    assert!(!record.parse_ok);
    assert!(record.portrait_json.is_none());
}

#[tokio::test]
async fn fenced_reply_still_parses() {
    let reply = "```json\n{\"summary\": \"fenced\"}\n```";
    let (config, _shared, _dir) = setup(vec![Some(reply.to_string())]).await;
    let run_id = seed_cleaned_run(&config);

    let result = pipeline::generate_portrait(&config, run_id, false).await.unwrap();
    assert!(result.parse_ok);
    assert_eq!(result.portrait.unwrap()["summary"], "fenced");
    // The raw reply is preserved verbatim, fence included.
    assert_eq!(result.portrait_raw.as_deref(), Some(reply));
}

#[tokio::test]
async fn provider_failure_preserves_cached_portrait() {
    let (config, _shared, _dir) = setup(vec![
        Some(r#"{"summary": "good"}"#.to_string()),
        None, // second call: HTTP 500
    ])
    .await;
    let run_id = seed_cleaned_run(&config);

    pipeline::generate_portrait(&config, run_id, false).await.unwrap();

    let err = pipeline::generate_portrait(&config, run_id, true)
        .await
        .unwrap_err();
    match err {
        Error::Upstream(msg) => assert!(msg.contains("500"), "unexpected message: {msg}"),
        other => panic!("expected Upstream, got {other:?}"),
    }

    // The failed regeneration did not touch the stored row.
    let store = RunStore::open(&config.database_path()).unwrap();
    let record = store.get_ai_portrait(run_id).unwrap().unwrap();
    assert!(record.parse_ok);
    assert_eq!(record.portrait_raw.as_deref(), Some(r#"{"summary": "good"}"#));
}
