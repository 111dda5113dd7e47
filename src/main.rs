//! sparkchat entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI arguments
//!   3. Load config
//!   4. Resolve effective log level (CLI `-v` flags > env > config)
//!   5. Init logger once
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Run the relay (`serve`) or the console (`chat`) until shutdown

use tokio_util::sync::CancellationToken;
use tracing::info;

use sparkchat::{config, error, logger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serve,
    Chat,
}

struct CliArgs {
    mode: Mode,
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), error::AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    info!(
        mode = ?args.mode,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    match args.mode {
        Mode::Serve => serve(&config, shutdown).await,
        Mode::Chat => chat(&config, shutdown).await,
    }
}

#[cfg(feature = "proxy")]
async fn serve(config: &config::Config, shutdown: CancellationToken) -> Result<(), error::AppError> {
    sparkchat::proxy::serve(config, shutdown).await
}

#[cfg(not(feature = "proxy"))]
async fn serve(_config: &config::Config, _shutdown: CancellationToken) -> Result<(), error::AppError> {
    Err(error::AppError::Config("built without the `proxy` feature".into()))
}

#[cfg(feature = "console")]
async fn chat(config: &config::Config, shutdown: CancellationToken) -> Result<(), error::AppError> {
    sparkchat::console::run(config, shutdown).await
}

#[cfg(not(feature = "console"))]
async fn chat(_config: &config::Config, _shutdown: CancellationToken) -> Result<(), error::AppError> {
    Err(error::AppError::Config("built without the `console` feature".into()))
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut mode = Mode::Serve;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: sparkchat [serve|chat] [OPTIONS]");
                println!();
                println!("Commands:");
                println!("  serve                      Run the Gradio relay (default)");
                println!("  chat                       Run the terminal chat console");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "serve" => mode = Mode::Serve,
            "chat" => mode = Mode::Chat,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            other => {
                eprintln!("error: unexpected argument '{other}' (see --help)");
                std::process::exit(1);
            }
        }
    }

    //   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { mode, log_level, config_path }
}
