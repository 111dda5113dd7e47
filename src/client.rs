//! Client request service: the front-end's only way to reach the relay.
//!
//! Every operation performs one POST and returns a [`Reply`]. Failures never
//! reach the caller as errors: they are logged and turned into a fixed
//! sentinel reply with an empty history and `failed` set. Nothing is retried.

use std::path::Path;

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::{Action, ChatTurn, ProxyRequest, ProxyResponse};

/// Display text and updated history as returned by the remote server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub history: Vec<ChatTurn>,
    /// Set only on sentinel replies; a remote answer never sets it, whatever
    /// its text.
    pub failed: bool,
}

impl Reply {
    pub fn new(text: impl Into<String>, history: Vec<ChatTurn>) -> Self {
        Self { text: text.into(), history, failed: false }
    }

    /// Sentinel reply for a failed operation.
    pub fn failure(text: &str) -> Self {
        Self { text: text.to_string(), history: Vec::new(), failed: true }
    }
}

pub const ASK_FAILED: &str = "Error: Server failed to respond.";
pub const CLEAR_FAILED: &str = "Error clearing conversation.";
pub const SET_BOT_FAILED: &str = "Error switching agent.";
pub const UPLOAD_FAILED: &str = "Error processing video.";

/// Internal failure causes. Only ever logged.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("relay answered HTTP {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("invalid response format from server: {0}")]
    Malformed(String),
    #[error("cannot read {path}: {source}")]
    File { path: String, source: std::io::Error },
}

/// What the chat front-end needs from a backend.
///
/// Implemented by [`ChatService`]; tests drive the console with a fake.
#[allow(async_fn_in_trait)]
pub trait ChatBackend {
    async fn ask_graph(&self, user_input: &str, history: &[ChatTurn]) -> Reply;
    async fn clear_conversation(&self) -> Reply;
    async fn set_bot(&self, bot_name: &str) -> Reply;
    async fn process_video(&self, path: &Path) -> Reply;
}

/// HTTP implementation of [`ChatBackend`] that talks to the relay.
///
/// Cheap to clone; `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct ChatService {
    http: Client,
    proxy_url: String,
}

impl ChatService {
    pub fn new(proxy_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), proxy_url)
    }

    pub fn with_client(http: Client, proxy_url: impl Into<String>) -> Self {
        Self { http, proxy_url: proxy_url.into() }
    }

    pub fn proxy_url(&self) -> &str {
        &self.proxy_url
    }

    async fn post_json(&self, request: &ProxyRequest) -> Result<Reply, ClientError> {
        debug!(action = %request.action, url = %self.proxy_url, "posting to relay");
        let response = self.http.post(&self.proxy_url).json(request).send().await?;
        read_reply(response).await
    }

    async fn post_video(&self, path: &Path) -> Result<Reply, ClientError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::File {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        debug!(%file_name, size = bytes.len(), url = %self.proxy_url, "uploading video to relay");
        let form = Form::new()
            .text("action", Action::ProcessVideo.as_str())
            .part("file", Part::bytes(bytes).file_name(file_name));
        let response = self.http.post(&self.proxy_url).multipart(form).send().await?;
        read_reply(response).await
    }
}

impl ChatBackend for ChatService {
    async fn ask_graph(&self, user_input: &str, history: &[ChatTurn]) -> Reply {
        let request = ProxyRequest::ask_graph(user_input, history);
        self.post_json(&request).await.unwrap_or_else(|e| {
            warn!("ask_graph failed: {e}");
            Reply::failure(ASK_FAILED)
        })
    }

    async fn clear_conversation(&self) -> Reply {
        self.post_json(&ProxyRequest::clear_conversation()).await.unwrap_or_else(|e| {
            warn!("clear_conversation failed: {e}");
            Reply::failure(CLEAR_FAILED)
        })
    }

    async fn set_bot(&self, bot_name: &str) -> Reply {
        self.post_json(&ProxyRequest::set_bot(bot_name)).await.unwrap_or_else(|e| {
            warn!(%bot_name, "set_bot failed: {e}");
            Reply::failure(SET_BOT_FAILED)
        })
    }

    async fn process_video(&self, path: &Path) -> Reply {
        self.post_video(path).await.unwrap_or_else(|e| {
            warn!(path = %path.display(), "process_video failed: {e}");
            Reply::failure(UPLOAD_FAILED)
        })
    }
}

async fn read_reply(response: reqwest::Response) -> Result<Reply, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status { status, body });
    }
    let envelope: ProxyResponse = response
        .json()
        .await
        .map_err(|e| ClientError::Malformed(format!("body is not a JSON envelope: {e}")))?;
    decode_reply(envelope)
}

/// Unwrap `{data: [text, history]}`.
///
/// `data` must be an array. A string first element is the display text,
/// `null` or absent becomes `""`, anything else is rendered as JSON. The
/// second element, when present and not `null`, must be a list of turn
/// objects; their roles, content and extra fields are kept as received.
pub fn decode_reply(envelope: ProxyResponse) -> Result<Reply, ClientError> {
    let items = match envelope.data {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ClientError::Malformed(format!("`data` is not an array: {other}")));
        }
        None => {
            let detail = envelope.error.unwrap_or_else(|| "missing `data`".to_string());
            return Err(ClientError::Malformed(detail));
        }
    };

    let mut items = items.into_iter();
    let text = match items.next() {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    };
    let history = match items.next() {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value::<Vec<ChatTurn>>(value)
            .map_err(|e| ClientError::Malformed(format!("history is not a turn list: {e}")))?,
    };
    Ok(Reply::new(text, history))
}
