//! Application-wide error types.
//!
//! Layer-specific errors ([`crate::gradio::GradioError`],
//! [`crate::client::ClientError`], the proxy's HTTP outcomes) live next to
//! their code. `AppError` covers what can stop the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
