//! sparkchat: chat console and Gradio relay.
//!
//! `proxy` receives chat actions over HTTP and forwards them to a remote
//! Gradio app through `gradio`. `client` is the front-end's view of the
//! relay and `console` is the terminal front-end built on it.

pub mod client;
pub mod config;
pub mod error;
pub mod gradio;
pub mod logger;
pub mod protocol;

#[cfg(feature = "console")]
pub mod console;
#[cfg(feature = "proxy")]
pub mod proxy;
