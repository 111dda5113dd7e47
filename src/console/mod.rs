//! Terminal chat front-end: reads lines from stdin, forwards them through a
//! [`ChatBackend`], prints the transcript to stdout.
//!
//! Plain text is a question; lines starting with `/` are commands:
//!
//! ```text
//! /agents            list personas (selected one marked)
//! /agent <name>      switch persona
//! /upload <path>     send a video for processing
//! /files             list uploaded files
//! /clear             reset the conversation
//! /help, /quit
//! ```
//!
//! Input is handled one line at a time. Runs until `/quit`, stdin EOF or the
//! `shutdown` token is cancelled (Ctrl-C).

pub mod transcript;

use std::io::Write;
use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ChatBackend, ChatService};
use crate::config::{AgentOption, ChatConfig, Config};
use crate::error::AppError;
use crate::protocol::{ChatTurn, Role};

use transcript::{MessageKind, Transcript, render};

/// Whether the read loop keeps going after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Console<B> {
    backend: B,
    agents: Vec<AgentOption>,
    default_agent: Option<String>,
    selected_agent: Option<String>,
    transcript: Transcript,
    history: Vec<ChatTurn>,
    uploaded_files: Vec<String>,
    /// Raised while a request is outstanding; stays up if the request is
    /// abandoned at shutdown.
    loading: bool,
}

impl<B: ChatBackend> Console<B> {
    pub fn new(backend: B, chat: &ChatConfig) -> Self {
        Self {
            backend,
            agents: chat.agents.clone(),
            default_agent: chat.default_agent.clone(),
            selected_agent: None,
            transcript: Transcript::default(),
            history: Vec::new(),
            uploaded_files: Vec::new(),
            loading: false,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn selected_agent(&self) -> Option<&str> {
        self.selected_agent.as_deref()
    }

    pub fn uploaded_files(&self) -> &[String] {
        &self.uploaded_files
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Send the configured default persona, if any.
    pub async fn start(&mut self, out: &mut impl Write) -> std::io::Result<()> {
        if let Some(agent) = self.default_agent.clone() {
            self.select_agent(&agent, out).await?;
        }
        Ok(())
    }

    /// Process one input line.
    pub async fn handle_line(&mut self, line: &str, out: &mut impl Write) -> std::io::Result<Flow> {
        let input = line.trim();
        if input.is_empty() {
            return Ok(Flow::Continue);
        }
        let Some(command) = input.strip_prefix('/') else {
            self.ask(input, out).await?;
            return Ok(Flow::Continue);
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        debug!(command = name, "console command");

        match name {
            "quit" | "exit" => return Ok(Flow::Quit),
            "help" => print_help(out)?,
            "clear" => self.clear(out).await?,
            "agents" => self.list_agents(out)?,
            "agent" if arg.is_empty() => match self.selected_label() {
                Some(label) => writeln!(out, "current agent: {label}")?,
                None => writeln!(out, "no agent selected; /agents lists the options")?,
            },
            "agent" => self.select_agent(arg, out).await?,
            "upload" if arg.is_empty() => writeln!(out, "usage: /upload <path>")?,
            "upload" => self.upload(Path::new(arg), out).await?,
            "files" => self.list_files(out)?,
            other => writeln!(out, "unknown command /{other}; type /help")?,
        }
        Ok(Flow::Continue)
    }

    async fn ask(&mut self, text: &str, out: &mut impl Write) -> std::io::Result<()> {
        let assistant = self.assistant_name();
        let bubble = render(self.transcript.push(MessageKind::Outgoing, text), &assistant);
        writeln!(out, "{bubble}")?;
        writeln!(out, "  …")?;
        out.flush()?;

        self.loading = true;
        let reply = self.backend.ask_graph(text, &self.history).await;
        self.loading = false;

        let shown = if reply.failed {
            reply.text
        } else {
            let shown = latest_answer(&reply.text, &reply.history);
            self.history = reply.history;
            shown
        };
        let bubble = render(self.transcript.push(MessageKind::Incoming, shown), &assistant);
        writeln!(out, "{bubble}")
    }

    async fn clear(&mut self, out: &mut impl Write) -> std::io::Result<()> {
        self.loading = true;
        let reply = self.backend.clear_conversation().await;
        self.loading = false;

        if reply.failed {
            let assistant = self.assistant_name();
            let bubble = render(self.transcript.push(MessageKind::Incoming, reply.text), &assistant);
            return writeln!(out, "{bubble}");
        }

        self.transcript.clear();
        self.history = reply.history;
        info!(history_len = self.history.len(), "conversation cleared");
        writeln!(out, "── conversation cleared ──")?;
        if !reply.text.is_empty() {
            writeln!(out, "{}", reply.text)?;
        }
        Ok(())
    }

    async fn select_agent(&mut self, wanted: &str, out: &mut impl Write) -> std::io::Result<()> {
        let value = if self.agents.is_empty() {
            wanted.to_string()
        } else {
            match find_agent(&self.agents, wanted) {
                Some(agent) => agent.value.clone(),
                None => {
                    return writeln!(out, "unknown agent '{wanted}'; /agents lists the options");
                }
            }
        };

        self.loading = true;
        let reply = self.backend.set_bot(&value).await;
        self.loading = false;

        if reply.failed {
            return writeln!(out, "{}", reply.text);
        }
        self.selected_agent = Some(value);
        let label = self.selected_label().unwrap_or_default();
        info!(agent = %label, "agent selected");
        if reply.text.is_empty() {
            writeln!(out, "switched to {label}")
        } else {
            writeln!(out, "{}", reply.text)
        }
    }

    async fn upload(&mut self, path: &Path, out: &mut impl Write) -> std::io::Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        writeln!(out, "uploading {file_name} …")?;
        out.flush()?;

        self.loading = true;
        let reply = self.backend.process_video(path).await;
        self.loading = false;

        let assistant = self.assistant_name();
        if !reply.failed {
            self.uploaded_files.push(file_name.clone());
        }
        let text = if reply.text.is_empty() { format!("{file_name} processed") } else { reply.text };
        let bubble = render(self.transcript.push(MessageKind::Incoming, text), &assistant);
        writeln!(out, "{bubble}")
    }

    fn list_agents(&self, out: &mut impl Write) -> std::io::Result<()> {
        if self.agents.is_empty() {
            return writeln!(out, "no agents configured; /agent <name> sends the name as is");
        }
        for agent in &self.agents {
            let marker = if self.selected_agent.as_deref() == Some(agent.value.as_str()) { "*" } else { " " };
            if agent.description.is_empty() {
                writeln!(out, "{marker} {} ({})", agent.label, agent.value)?;
            } else {
                writeln!(out, "{marker} {} ({}): {}", agent.label, agent.value, agent.description)?;
            }
        }
        Ok(())
    }

    fn list_files(&self, out: &mut impl Write) -> std::io::Result<()> {
        if self.uploaded_files.is_empty() {
            return writeln!(out, "no files uploaded");
        }
        for name in &self.uploaded_files {
            writeln!(out, "  {name}")?;
        }
        Ok(())
    }

    fn selected_label(&self) -> Option<String> {
        let value = self.selected_agent.as_deref()?;
        Some(
            self.agents
                .iter()
                .find(|a| a.value == value)
                .map(|a| a.label.clone())
                .unwrap_or_else(|| value.to_string()),
        )
    }

    fn assistant_name(&self) -> String {
        self.selected_label().unwrap_or_else(|| "assistant".to_string())
    }
}

/// Match by value, or by label ignoring case.
fn find_agent<'a>(agents: &'a [AgentOption], wanted: &str) -> Option<&'a AgentOption> {
    agents
        .iter()
        .find(|a| a.value == wanted)
        .or_else(|| agents.iter().find(|a| a.label.eq_ignore_ascii_case(wanted)))
}

/// The text to show for an `ask_graph` reply: the newest assistant turn when
/// the history ends with one, otherwise the display text.
fn latest_answer(display: &str, history: &[ChatTurn]) -> String {
    match history.last() {
        Some(turn) if turn.is(Role::Assistant) => turn.text(),
        _ => display.to_string(),
    }
}

fn print_help(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "  <text>            ask a question")?;
    writeln!(out, "  /agents           list agents")?;
    writeln!(out, "  /agent <name>     switch agent")?;
    writeln!(out, "  /upload <path>    process a video")?;
    writeln!(out, "  /files            list uploaded files")?;
    writeln!(out, "  /clear            clear the conversation")?;
    writeln!(out, "  /quit             exit")
}

// ── run ──────────────────────────────────────────────────────────────────────

pub async fn run(config: &Config, shutdown: CancellationToken) -> Result<(), AppError> {
    let service = ChatService::new(config.client_proxy_url.clone());
    info!(proxy_url = %service.proxy_url(), "console started");

    let mut console = Console::new(service, &config.chat);
    let mut out = std::io::stdout();

    writeln!(out, "─────────────────────────────────")?;
    writeln!(out, " sparkchat  (/help, Ctrl-C to quit)")?;
    writeln!(out, "─────────────────────────────────")?;

    let started = tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        r = console.start(&mut out) => { r?; true }
    };
    if !started {
        info!("console shutting down");
        return Ok(());
    }

    read_loop(&mut console, BufReader::new(tokio::io::stdin()), &mut out, &shutdown).await
}

/// Feed `input` line by line into `console` until `/quit`, EOF or
/// cancellation. An outstanding request is abandoned on cancellation.
async fn read_loop<B, R>(
    console: &mut Console<B>,
    input: R,
    out: &mut impl Write,
    shutdown: &CancellationToken,
) -> Result<(), AppError>
where
    B: ChatBackend,
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        write!(out, "> ")?;
        out.flush()?;

        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            line = lines.next_line() => Some(line),
        };
        let input = match line {
            None => break,
            Some(Err(e)) => {
                warn!("console read error: {e}");
                return Ok(());
            }
            Some(Ok(None)) => {
                info!("console stdin closed");
                return Ok(());
            }
            Some(Ok(Some(input))) => input,
        };

        let flow = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            r = console.handle_line(&input, &mut *out) => Some(r?),
        };
        match flow {
            None => break,
            Some(Flow::Quit) => return Ok(()),
            Some(Flow::Continue) => {}
        }
    }

    writeln!(out)?;
    info!("console shutting down");
    Ok(())
}
