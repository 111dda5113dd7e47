//! Shared fixtures: an in-process mock Gradio app and relay helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use sparkchat::proxy::{ProxyState, build_router};

pub const PROXY_PATH: &str = "/.netlify/functions/gradio-proxy";
pub const API_PREFIX: &str = "/gradio_api";

/// Everything the mock Gradio app has seen.
#[derive(Default)]
pub struct MockGradioState {
    pub config_hits: Mutex<usize>,
    /// `(endpoint, positional data)` per queued call.
    pub calls: Mutex<Vec<(String, Vec<Value>)>>,
    /// `(file name, size)` per uploaded file.
    pub uploads: Mutex<Vec<(String, usize)>>,
    pending: Mutex<HashMap<String, (String, Vec<Value>)>>,
}

/// Start a Gradio 5 style app (API under `/gradio_api`) on an ephemeral port.
pub async fn start_mock_gradio() -> (String, Arc<MockGradioState>) {
    let state = Arc::new(MockGradioState::default());

    let app = Router::new()
        .route("/config", get(mock_config))
        .route("/gradio_api/info", get(mock_info))
        .route("/gradio_api/upload", post(mock_upload))
        .route("/gradio_api/call/{endpoint}", post(mock_queue))
        .route("/gradio_api/call/{endpoint}/{event_id}", get(mock_result))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/"), state)
}

/// A base URL nothing listens on.
pub fn unreachable_gradio_url() -> String {
    "http://127.0.0.1:1".to_string()
}

pub fn relay(gradio_url: Option<&str>) -> Router {
    build_router(ProxyState::new(gradio_url, 16 * 1024 * 1024), PROXY_PATH, true)
}

/// Serve the relay on an ephemeral port and return its full URL.
pub async fn start_relay(gradio_url: Option<&str>) -> String {
    let router = relay(gradio_url);
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}{PROXY_PATH}")
}

// ── Mock handlers ─────────────────────────────────────────────────────────────

async fn mock_config(State(state): State<Arc<MockGradioState>>) -> Json<Value> {
    *state.config_hits.lock().await += 1;
    Json(json!({ "version": "5.0.0", "api_prefix": API_PREFIX, "components": [] }))
}

async fn mock_info() -> Json<Value> {
    fn param(name: &str) -> Value {
        json!({ "label": name, "parameter_name": name, "parameter_has_default": false, "type": {} })
    }
    Json(json!({
        "named_endpoints": {
            "/ask_graph": { "parameters": [param("user_input"), param("chat_history")], "returns": [] },
            "/clear_conversation": { "parameters": [], "returns": [] },
            "/set_bot": { "parameters": [param("bot_name")], "returns": [] },
            "/process_video": { "parameters": [param("video_file")], "returns": [] }
        },
        "unnamed_endpoints": {}
    }))
}

async fn mock_upload(
    State(state): State<Arc<MockGradioState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut paths = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() != Some("files") {
            continue;
        }
        let name = field.file_name().unwrap_or("blob").to_string();
        let bytes = field.bytes().await.unwrap();
        state.uploads.lock().await.push((name.clone(), bytes.len()));
        paths.push(format!("/tmp/gradio/0001/{name}"));
    }
    Json(paths)
}

async fn mock_queue(
    State(state): State<Arc<MockGradioState>>,
    Path(endpoint): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let data = body["data"].as_array().cloned().unwrap_or_default();
    let mut calls = state.calls.lock().await;
    calls.push((endpoint.clone(), data.clone()));
    let event_id = format!("evt-{}", calls.len());
    state.pending.lock().await.insert(event_id.clone(), (endpoint, data));
    Json(json!({ "event_id": event_id }))
}

async fn mock_result(
    State(state): State<Arc<MockGradioState>>,
    Path((endpoint, event_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let Some((queued_endpoint, data)) = state.pending.lock().await.remove(&event_id) else {
        return (StatusCode::NOT_FOUND, "unknown event").into_response();
    };
    assert_eq!(queued_endpoint, endpoint);

    let event = match endpoint.as_str() {
        "ask_graph" => {
            let question = data[0].as_str().unwrap_or_default().to_string();
            let mut history = data[1].as_array().cloned().unwrap_or_default();
            history.push(json!({ "role": "user", "content": question }));
            history.push(json!({ "role": "assistant", "content": format!("echo: {question}") }));
            complete(json!(["", history]))
        }
        "clear_conversation" => complete(json!(["", []])),
        "set_bot" => match data[0].as_str() {
            Some("broken") => "event: error\ndata: null\n\n".to_string(),
            Some(name) => complete(json!([format!("Bot set to {name}"), []])),
            None => "event: error\ndata: \"bot_name is required\"\n\n".to_string(),
        },
        "process_video" => {
            let name = data[0]["orig_name"].as_str().unwrap_or_default();
            complete(json!([format!("Processed {name}")]))
        }
        _ => "event: error\ndata: null\n\n".to_string(),
    };

    let body = format!("event: generating\ndata: null\n\n{event}");
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

fn complete(output: Value) -> String {
    format!("event: complete\ndata: {output}\n\n")
}
