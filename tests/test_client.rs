//! End-to-end: `ChatService` → relay on a real socket → mock Gradio app.

mod common;

use std::io::Write;

use serde_json::json;
use sparkchat::client::{
    ASK_FAILED, CLEAR_FAILED, ChatBackend, ChatService, Reply, SET_BOT_FAILED, UPLOAD_FAILED,
};
use sparkchat::protocol::ChatTurn;

use common::*;

async fn service() -> (ChatService, std::sync::Arc<MockGradioState>) {
    let (gradio_url, mock) = start_mock_gradio().await;
    let relay_url = start_relay(Some(gradio_url.as_str())).await;
    (ChatService::new(relay_url), mock)
}

#[tokio::test]
async fn ask_graph_round_trip_extends_history() {
    let (svc, _mock) = service().await;

    let Reply { text, history, .. } = svc.ask_graph("what is cuda", &[]).await;
    assert_eq!(text, "");
    assert_eq!(
        history,
        vec![ChatTurn::user("what is cuda"), ChatTurn::assistant("echo: what is cuda")]
    );

    let Reply { history, .. } = svc.ask_graph("and rocm?", &history).await;
    assert_eq!(history.len(), 4);
    assert_eq!(history[3], ChatTurn::assistant("echo: and rocm?"));
}

#[tokio::test]
async fn clear_conversation_twice() {
    let (svc, mock) = service().await;
    for _ in 0..2 {
        assert_eq!(svc.clear_conversation().await, Reply::new("", vec![]));
    }
    assert_eq!(mock.calls.lock().await.len(), 2);
}

#[tokio::test]
async fn set_bot_returns_remote_text() {
    let (svc, _mock) = service().await;
    let Reply { text, history, .. } = svc.set_bot("gpu_expert").await;
    assert_eq!(text, "Bot set to gpu_expert");
    assert!(history.is_empty());
}

#[tokio::test]
async fn set_bot_remote_error_is_sentinel() {
    let (svc, _mock) = service().await;
    assert_eq!(svc.set_bot("broken").await, Reply::failure(SET_BOT_FAILED));
}

#[tokio::test]
async fn empty_bot_name_is_sentinel() {
    let (svc, mock) = service().await;
    assert_eq!(svc.set_bot("").await, Reply::failure(SET_BOT_FAILED));
    assert!(mock.calls.lock().await.is_empty());
}

#[tokio::test]
async fn process_video_uploads_file() {
    let (svc, mock) = service().await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lecture.mp4");
    std::fs::File::create(&path).unwrap().write_all(b"fake video bytes").unwrap();

    let Reply { text, history, .. } = svc.process_video(&path).await;
    assert_eq!(text, "Processed lecture.mp4");
    assert!(history.is_empty());
    assert_eq!(*mock.uploads.lock().await, vec![("lecture.mp4".to_string(), 16)]);
}

#[tokio::test]
async fn unconfigured_relay_yields_sentinels() {
    let svc = ChatService::new(start_relay(None).await);
    assert_eq!(svc.ask_graph("hi", &[]).await, Reply::failure(ASK_FAILED));
    assert_eq!(svc.clear_conversation().await, Reply::failure(CLEAR_FAILED));
}

#[tokio::test]
async fn unreachable_gradio_yields_sentinels() {
    let gradio_url = unreachable_gradio_url();
    let relay_url = start_relay(Some(gradio_url.as_str())).await;
    let svc = ChatService::new(relay_url);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, b"abc").unwrap();

    assert_eq!(svc.ask_graph("hi", &[]).await, Reply::failure(ASK_FAILED));
    assert_eq!(svc.set_bot("gpu_expert").await, Reply::failure(SET_BOT_FAILED));
    assert_eq!(svc.process_video(&path).await, Reply::failure(UPLOAD_FAILED));
}

#[tokio::test]
async fn wrong_route_yields_sentinel() {
    let (gradio_url, _mock) = start_mock_gradio().await;
    let relay_url = start_relay(Some(gradio_url.as_str())).await;
    let svc = ChatService::new(relay_url.replace("gradio-proxy", "missing"));
    assert_eq!(svc.ask_graph("hi", &[]).await, Reply::failure(ASK_FAILED));
}

#[tokio::test]
async fn rich_history_survives_both_hops() {
    let (svc, mock) = service().await;
    let system: ChatTurn = serde_json::from_value(json!({"role": "system", "content": "be brief"})).unwrap();
    let tool: ChatTurn = serde_json::from_value(json!({
        "role": "assistant",
        "content": "looked it up",
        "metadata": {"title": "tool"}
    }))
    .unwrap();

    let reply = svc.ask_graph("and then?", &[system.clone(), tool.clone()]).await;
    assert!(!reply.failed);
    assert_eq!(reply.history[..2].to_vec(), vec![system.clone(), tool.clone()]);
    assert_eq!(reply.history[3], ChatTurn::assistant("echo: and then?"));

    let calls = mock.calls.lock().await;
    assert_eq!(calls[0].1[1], json!([system.to_json(), tool.to_json()]));
}
