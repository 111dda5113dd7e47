//! Local transcript of chat bubbles shown in the console.
//!
//! Display-only: the history sent to the remote server is kept separately
//! by the console and replaced wholesale on every reply.

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Typed by the user.
    Outgoing,
    /// Received from the remote server (or a local failure bubble).
    Incoming,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub text: String,
    pub kind: MessageKind,
    pub at: DateTime<Local>,
}

#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn push(&mut self, kind: MessageKind, text: impl Into<String>) -> &Message {
        self.messages.push(Message { text: text.into(), kind, at: Local::now() });
        &self.messages[self.messages.len() - 1]
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Render one bubble. Continuation lines are indented under the first.
pub fn render(message: &Message, assistant_name: &str) -> String {
    let who = match message.kind {
        MessageKind::Outgoing => "you",
        MessageKind::Incoming => assistant_name,
    };
    let prefix = format!("[{}] {who} › ", message.at.format("%H:%M"));
    let indent = " ".repeat(prefix.chars().count());

    let mut lines = message.text.lines();
    let mut rendered = format!("{prefix}{}", lines.next().unwrap_or(""));
    for line in lines {
        rendered.push('\n');
        rendered.push_str(&indent);
        rendered.push_str(line);
    }
    rendered
}
