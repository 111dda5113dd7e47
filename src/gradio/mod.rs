//! Client for the subset of the Gradio HTTP API the relay needs.
//!
//! A [`GradioClient`] is built by [`GradioClient::connect`], which reads the
//! app config (for the API prefix) and the API info (for each named
//! endpoint's parameter order). [`GradioClient::predict`] then performs the
//! two-step call protocol: queue the call, read the result event stream.
//! [`GradioClient::upload`] stores a file on the server and returns the
//! `FileData` reference to pass as an argument.
//!
//! All Gradio wire types are private to this module.

mod sse;

use std::collections::HashMap;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, trace};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GradioError {
    #[error("invalid Gradio URL '{0}'")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}: {body}")]
    Status { status: StatusCode, url: String, body: String },
    #[error("no named endpoint '{0}' on the Gradio app")]
    UnknownEndpoint(String),
    #[error("{0}")]
    Parameter(String),
    #[error("Gradio app reported an error: {0}")]
    Remote(String),
    #[error("unexpected Gradio response: {0}")]
    Protocol(String),
}

// ── Client ────────────────────────────────────────────────────────────────────

/// A connection to one Gradio app.
///
/// Holds a clone of the caller's `reqwest::Client` (an `Arc` internally), so
/// building one per request reuses pooled sockets.
#[derive(Debug, Clone)]
pub struct GradioClient {
    http: Client,
    root: String,
    api_prefix: String,
    endpoints: HashMap<String, EndpointInfo>,
}

impl GradioClient {
    /// Read the app config and API description from `base_url`.
    pub async fn connect(http: &Client, base_url: &str) -> Result<Self, GradioError> {
        let root = normalize_root(base_url)?;

        let config_url = format!("{root}/config");
        let config: AppConfig = get_json(http, &config_url).await?;
        let api_prefix = normalize_prefix(config.api_prefix.as_deref().unwrap_or(""));

        let info_url = format!("{root}{api_prefix}/info");
        let info: ApiInfo = get_json(http, &info_url).await?;

        debug!(
            %root,
            %api_prefix,
            endpoints = info.named_endpoints.len(),
            "connected to Gradio app"
        );

        Ok(Self { http: http.clone(), root, api_prefix, endpoints: info.named_endpoints })
    }

    /// Call a named endpoint with keyword arguments and return its output
    /// array untouched.
    pub async fn predict(
        &self,
        endpoint: &str,
        args: Map<String, Value>,
    ) -> Result<Vec<Value>, GradioError> {
        let key = endpoint_key(endpoint);
        let info = self
            .endpoints
            .get(&key)
            .ok_or_else(|| GradioError::UnknownEndpoint(key.clone()))?;
        let data = info.positional(&key, args)?;

        let call_url = format!("{}{}/call{key}", self.root, self.api_prefix);
        debug!(endpoint = %key, args = data.len(), "queueing Gradio call");
        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(payload = %serde_json::Value::Array(data.clone()), "Gradio call payload");
        }

        let response = self.http.post(&call_url).json(&json!({ "data": data })).send().await?;
        let queued: QueuedCall = check_status(response, &call_url).await?.json().await?;

        let result_url = format!("{call_url}/{}", queued.event_id);
        let response = self.http.get(&result_url).send().await?;
        let body = check_status(response, &result_url).await?.text().await?;
        trace!(endpoint = %key, %body, "Gradio event stream");

        let output = sse::take_result(&body)?;
        debug!(endpoint = %key, outputs = output.len(), "Gradio call complete");
        Ok(output)
    }

    /// Upload one file and return the `FileData` object that refers to it.
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<Value, GradioError> {
        let size = bytes.len();
        let url = format!("{}{}/upload", self.root, self.api_prefix);
        let form = Form::new().part("files", Part::bytes(bytes).file_name(file_name.to_string()));

        debug!(%file_name, size, "uploading file to Gradio app");
        let response = self.http.post(&url).multipart(form).send().await?;
        let paths: Vec<String> = check_status(response, &url).await?.json().await?;
        let path = paths
            .into_iter()
            .next()
            .ok_or_else(|| GradioError::Protocol("upload returned no file path".into()))?;

        Ok(file_data(&path, file_name, size))
    }
}

/// `FileData` reference as Gradio's own clients build it for an uploaded file.
pub fn file_data(path: &str, orig_name: &str, size: usize) -> Value {
    json!({
        "path": path,
        "orig_name": orig_name,
        "size": size,
        "meta": { "_type": "gradio.FileData" }
    })
}

fn normalize_root(base_url: &str) -> Result<String, GradioError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|_| GradioError::InvalidUrl(base_url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(GradioError::InvalidUrl(base_url.to_string()));
    }
    Ok(trimmed.to_string())
}

fn normalize_prefix(prefix: &str) -> String {
    let p = prefix.trim().trim_matches('/');
    if p.is_empty() { String::new() } else { format!("/{p}") }
}

fn endpoint_key(endpoint: &str) -> String {
    format!("/{}", endpoint.trim_start_matches('/'))
}

async fn get_json<T: serde::de::DeserializeOwned>(
    http: &Client,
    url: &str,
) -> Result<T, GradioError> {
    let response = http.get(url).send().await?;
    Ok(check_status(response, url).await?.json::<T>().await?)
}

/// Return the response if successful, or a status error carrying the body.
async fn check_status(
    response: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, GradioError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    Err(GradioError::Status { status, url: url.to_string(), body })
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AppConfig {
    #[serde(default)]
    api_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiInfo {
    #[serde(default)]
    named_endpoints: HashMap<String, EndpointInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct EndpointInfo {
    #[serde(default)]
    parameters: Vec<ParameterInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct ParameterInfo {
    #[serde(default)]
    parameter_name: Option<String>,
    #[serde(default)]
    parameter_has_default: bool,
    #[serde(default)]
    parameter_default: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct QueuedCall {
    event_id: String,
}

impl EndpointInfo {
    /// Order keyword arguments by the endpoint's declared parameters.
    /// A missing argument takes the parameter default, or `null`.
    fn positional(&self, endpoint: &str, mut args: Map<String, Value>) -> Result<Vec<Value>, GradioError> {
        let mut data = Vec::with_capacity(self.parameters.len());
        for param in &self.parameters {
            let supplied = param.parameter_name.as_deref().and_then(|name| args.remove(name));
            let value = match supplied {
                Some(v) => v,
                None if param.parameter_has_default => {
                    param.parameter_default.clone().unwrap_or(Value::Null)
                }
                None => Value::Null,
            };
            data.push(value);
        }
        if let Some(extra) = args.keys().next() {
            return Err(GradioError::Parameter(format!(
                "endpoint {endpoint} has no parameter named '{extra}'"
            )));
        }
        Ok(data)
    }
}
