//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! an explicit `-f` path), then applies `GRADIO_API_URL`,
//! `SPARKCHAT_LOG_LEVEL`, `SPARKCHAT_BIND`, `PORT` and `SPARKCHAT_PROXY_URL`
//! env overrides.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Relay server configuration (`[proxy]`).
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Socket address the relay listens on.
    pub bind: String,
    /// URL path of the single relay route.
    pub path: String,
    /// Attach permissive CORS headers.
    pub cors: bool,
    /// Upper bound for request bodies, uploads included.
    pub max_body_bytes: usize,
}

/// One entry of the persona selector.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentOption {
    /// Name sent to the remote `set_bot` endpoint.
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

/// Chat console configuration (`[chat]`).
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Persona selected (and sent) when the console starts.
    pub default_agent: Option<String>,
    pub agents: Vec<AgentOption>,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Log to this file instead of stderr (already expanded, no `~`).
    pub log_file: Option<PathBuf>,
    pub proxy: ProxyConfig,
    /// Base URL of the remote Gradio server. `None` makes every relay
    /// request fail with a configuration error.
    pub gradio_api_url: Option<String>,
    /// Relay URL the console client posts to.
    pub client_proxy_url: String,
    pub chat: ChatConfig,
}

/// Env-var overrides, collected once so tests can pass them directly.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub gradio_api_url: Option<String>,
    pub log_level: Option<String>,
    pub bind: Option<String>,
    pub port: Option<String>,
    pub proxy_url: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            gradio_api_url: env::var("GRADIO_API_URL").ok(),
            log_level: env::var("SPARKCHAT_LOG_LEVEL").ok(),
            bind: env::var("SPARKCHAT_BIND").ok(),
            port: env::var("PORT").ok(),
            proxy_url: env::var("SPARKCHAT_PROXY_URL").ok(),
        }
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    app: RawApp,
    #[serde(default)]
    proxy: RawProxy,
    #[serde(default)]
    gradio: RawGradio,
    #[serde(default)]
    client: RawClient,
    #[serde(default)]
    chat: RawChat,
}

#[derive(Deserialize)]
struct RawApp {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

impl Default for RawApp {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_file: None }
    }
}

#[derive(Deserialize)]
struct RawProxy {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_proxy_path")]
    path: String,
    #[serde(default = "default_true")]
    cors: bool,
    #[serde(default = "default_max_body_bytes")]
    max_body_bytes: usize,
}

impl Default for RawProxy {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            path: default_proxy_path(),
            cors: true,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawGradio {
    #[serde(default)]
    api_url: Option<String>,
}

#[derive(Deserialize)]
struct RawClient {
    #[serde(default = "default_client_proxy_url")]
    proxy_url: String,
}

impl Default for RawClient {
    fn default() -> Self {
        Self { proxy_url: default_client_proxy_url() }
    }
}

#[derive(Deserialize, Default)]
struct RawChat {
    #[serde(default)]
    default_agent: Option<String>,
    #[serde(default)]
    agents: Vec<AgentOption>,
}

fn default_log_level() -> String { "info".to_string() }
fn default_bind() -> String { "127.0.0.1:3000".to_string() }
fn default_proxy_path() -> String { "/.netlify/functions/gradio-proxy".to_string() }
fn default_max_body_bytes() -> usize { 200 * 1024 * 1024 }
fn default_client_proxy_url() -> String {
    format!("http://{}{}", default_bind(), default_proxy_path())
}
fn default_true() -> bool { true }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `config_path`, or `config/default.toml`, then apply
/// env-var overrides.
///
/// If no path is given and the default file does not exist, built-in
/// defaults are used. An explicit path that cannot be read is an error.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = Overrides::from_env();
    match config_path {
        Some(p) => load_from(Path::new(p), &overrides),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                load_from(default_path, &overrides)
            } else {
                resolve(RawConfig::default(), &overrides)
            }
        }
    }
}

/// Internal loader: accepts an explicit path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;
    resolve(parsed, overrides)
}

fn resolve(raw: RawConfig, overrides: &Overrides) -> Result<Config, AppError> {
    let log_level = overrides.log_level.clone().unwrap_or(raw.app.log_level);

    let bind = match (&overrides.bind, &overrides.port) {
        (Some(bind), _) => bind.clone(),
        (None, Some(port)) => {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("PORT is not a valid port: '{port}'")))?;
            format!("0.0.0.0:{port}")
        }
        (None, None) => raw.proxy.bind,
    };

    if !raw.proxy.path.starts_with('/') {
        return Err(AppError::Config(format!(
            "proxy.path must start with '/': '{}'",
            raw.proxy.path
        )));
    }

    let gradio_api_url = overrides
        .gradio_api_url
        .clone()
        .or(raw.gradio.api_url)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    let default_agent = raw.chat.default_agent.filter(|a| !a.trim().is_empty());

    Ok(Config {
        log_level,
        log_file: raw.app.log_file.as_deref().map(expand_home),
        proxy: ProxyConfig {
            bind,
            path: raw.proxy.path,
            cors: raw.proxy.cors,
            max_body_bytes: raw.proxy.max_body_bytes,
        },
        gradio_api_url,
        client_proxy_url: overrides.proxy_url.clone().unwrap_or(raw.client.proxy_url),
        chat: ChatConfig { default_agent, agents: raw.chat.agents },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
