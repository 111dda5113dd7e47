//! The relay handler: validate the inbound action, then forward it.
//!
//! Order of checks per request: method (router fallback), configured remote
//! URL, body decoding, action validation, then the remote call. Client-input
//! problems answer 4xx with a one-line message; every downstream failure
//! collapses into the same 502.

use axum::{
    Json,
    extract::{FromRequest, Multipart, Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::gradio::{GradioClient, GradioError};
use crate::protocol::{Action, ProxyRequest, ProxyResponse, UnknownAction};

use super::ProxyState;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Every non-200 outcome of the relay route.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("GRADIO_API_URL is not configured")]
    NotConfigured,
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("bot_name parameter missing")]
    MissingBotName,
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("no file uploaded")]
    NoFile,
    #[error("Gradio call failed: {0}")]
    Upstream(#[from] GradioError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidBody(_)
            | ProxyError::MissingBotName
            | ProxyError::UnknownAction(_)
            | ProxyError::NoFile => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message placed in the `{"error": ...}` body. Fixed per variant so
    /// callers never see internal detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            ProxyError::NotConfigured => "GRADIO_API_URL is not configured",
            ProxyError::InvalidBody(_) => "Invalid request body",
            ProxyError::MissingBotName => "bot_name parameter missing",
            ProxyError::UnknownAction(_) => "Unknown action",
            ProxyError::NoFile => "No file uploaded",
            ProxyError::Upstream(_) => "Failed to reach Gradio server",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(ProxyResponse::error(self.public_message()))).into_response()
    }
}

// ── Validated calls ───────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Call {
    AskGraph { user_input: String, chat_history: Value },
    ClearConversation,
    SetBot { bot_name: String },
    ProcessVideo { file_name: String, bytes: Vec<u8> },
}

impl Call {
    fn action(&self) -> Action {
        match self {
            Call::AskGraph { .. } => Action::AskGraph,
            Call::ClearConversation => Action::ClearConversation,
            Call::SetBot { .. } => Action::SetBot,
            Call::ProcessVideo { .. } => Action::ProcessVideo,
        }
    }

    fn from_json(request: ProxyRequest) -> Result<Self, ProxyError> {
        match request.parsed_action() {
            Ok(Action::AskGraph) => Ok(Call::AskGraph {
                user_input: request.user_input.unwrap_or_default(),
                chat_history: request.chat_history.unwrap_or_else(|| Value::Array(Vec::new())),
            }),
            Ok(Action::ClearConversation) => Ok(Call::ClearConversation),
            Ok(Action::SetBot) => request
                .bot_name
                .filter(|name| !name.is_empty())
                .map(|bot_name| Call::SetBot { bot_name })
                .ok_or(ProxyError::MissingBotName),
            Ok(Action::ProcessVideo) => Err(ProxyError::NoFile),
            Err(UnknownAction(name)) => Err(ProxyError::UnknownAction(name)),
        }
    }

    async fn execute(self, client: &GradioClient) -> Result<Vec<Value>, GradioError> {
        let endpoint = self.action().endpoint();
        let args = match self {
            Call::AskGraph { user_input, chat_history } => {
                kwargs(json!({ "user_input": user_input, "chat_history": chat_history }))
            }
            Call::ClearConversation => Map::new(),
            Call::SetBot { bot_name } => kwargs(json!({ "bot_name": bot_name })),
            Call::ProcessVideo { file_name, bytes } => {
                let file = client.upload(&file_name, bytes).await?;
                kwargs(json!({ "video_file": file }))
            }
        };
        client.predict(endpoint, args).await
    }
}

fn kwargs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// POST {path}
pub(super) async fn gradio_proxy(State(state): State<ProxyState>, request: Request) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("relay", %request_id);

    match relay(&state, request).instrument(span).await {
        Ok(data) => (StatusCode::OK, Json(ProxyResponse::data(data))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Any other method on {path}.
pub(super) async fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "POST")], "Method Not Allowed").into_response()
}

async fn relay(state: &ProxyState, request: Request) -> Result<Vec<Value>, ProxyError> {
    let Some(gradio_url) = state.gradio_url.clone() else {
        error!("GRADIO_API_URL is not configured");
        return Err(ProxyError::NotConfigured);
    };

    let call = read_call(state, request).await.inspect_err(|e| {
        debug!("rejected relay request: {e}");
    })?;
    let action = call.action();
    debug!(%action, "relaying to Gradio");

    match forward(state, &gradio_url, call).await {
        Ok(data) => {
            info!(%action, outputs = data.len(), "relay complete");
            Ok(data)
        }
        Err(e) => {
            warn!(%action, %gradio_url, "error calling Gradio API: {e}");
            Err(ProxyError::Upstream(e))
        }
    }
}

/// Fresh connection per request; nothing is cached between calls.
async fn forward(state: &ProxyState, gradio_url: &str, call: Call) -> Result<Vec<Value>, GradioError> {
    let client = GradioClient::connect(&state.http, gradio_url).await?;
    call.execute(&client).await
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
}

async fn read_call(state: &ProxyState, request: Request) -> Result<Call, ProxyError> {
    if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| ProxyError::InvalidBody(e.body_text()))?;
        return read_upload(multipart).await;
    }

    let bytes = axum::body::to_bytes(request.into_body(), state.max_body_bytes)
        .await
        .map_err(|e| ProxyError::InvalidBody(e.to_string()))?;
    // An empty body reads as `{}` and fails later as an unknown action.
    let parsed: ProxyRequest = if bytes.iter().all(u8::is_ascii_whitespace) {
        ProxyRequest::default()
    } else {
        serde_json::from_slice(&bytes).map_err(|e| ProxyError::InvalidBody(e.to_string()))?
    };
    Call::from_json(parsed)
}

async fn read_upload(mut multipart: Multipart) -> Result<Call, ProxyError> {
    let mut action = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProxyError::InvalidBody(e.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("action") => {
                let text = field.text().await.map_err(|e| ProxyError::InvalidBody(e.body_text()))?;
                action = Some(text.trim().to_string());
            }
            Some("file") => {
                let file_name = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or("upload")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| ProxyError::InvalidBody(e.body_text()))?;
                file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let action = action.unwrap_or_else(|| Action::ProcessVideo.as_str().to_string());
    match action.parse::<Action>() {
        Ok(Action::ProcessVideo) => {
            let (file_name, bytes) = file.ok_or(ProxyError::NoFile)?;
            Ok(Call::ProcessVideo { file_name, bytes })
        }
        _ => Err(ProxyError::UnknownAction(action)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(v: Value) -> ProxyRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn ask_graph_defaults_missing_fields() {
        let call = Call::from_json(request(json!({"action": "ask_graph"}))).unwrap();
        assert_eq!(call, Call::AskGraph { user_input: String::new(), chat_history: json!([]) });

        let call = Call::from_json(request(json!({"action": "ask_graph", "chat_history": null}))).unwrap();
        assert_eq!(call, Call::AskGraph { user_input: String::new(), chat_history: json!([]) });
    }

    #[test]
    fn ask_graph_history_is_opaque() {
        let history = json!([
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": {"path": "/tmp/a.png"}},
            {"role": "assistant", "content": "hello", "metadata": {"title": "tool"}}
        ]);
        let call = Call::from_json(request(json!({
            "action": "ask_graph",
            "user_input": "what is cuda",
            "chat_history": history
        })))
        .unwrap();
        assert_eq!(call, Call::AskGraph { user_input: "what is cuda".into(), chat_history: history });
    }

    #[test]
    fn set_bot_requires_non_empty_name() {
        for body in [
            json!({"action": "set_bot"}),
            json!({"action": "set_bot", "bot_name": ""}),
            json!({"action": "set_bot", "user_input": "x", "chat_history": []}),
        ] {
            assert!(matches!(Call::from_json(request(body)), Err(ProxyError::MissingBotName)));
        }
        assert_eq!(
            Call::from_json(request(json!({"action": "set_bot", "bot_name": "gpu_expert"}))).unwrap(),
            Call::SetBot { bot_name: "gpu_expert".into() }
        );
    }

    #[test]
    fn unknown_and_missing_actions() {
        assert!(matches!(
            Call::from_json(request(json!({"action": "reboot"}))),
            Err(ProxyError::UnknownAction(ref a)) if a == "reboot"
        ));
        assert!(matches!(Call::from_json(request(json!({}))), Err(ProxyError::UnknownAction(_))));
    }

    #[test]
    fn process_video_over_json_has_no_file() {
        let r = Call::from_json(request(json!({"action": "process_video"})));
        assert!(matches!(r, Err(ProxyError::NoFile)));
    }

    #[test]
    fn error_statuses_and_messages() {
        let cases = [
            (ProxyError::NotConfigured, 500, "GRADIO_API_URL is not configured"),
            (ProxyError::InvalidBody("eof".into()), 400, "Invalid request body"),
            (ProxyError::MissingBotName, 400, "bot_name parameter missing"),
            (ProxyError::UnknownAction("x".into()), 400, "Unknown action"),
            (ProxyError::NoFile, 400, "No file uploaded"),
            (
                ProxyError::Upstream(GradioError::Protocol("eof".into())),
                502,
                "Failed to reach Gradio server",
            ),
        ];
        for (err, status, message) in cases {
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(err.public_message(), message);
        }
    }

    #[test]
    fn multipart_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(!is_multipart(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=xyz".parse().unwrap(),
        );
        assert!(is_multipart(&headers));
    }
}
