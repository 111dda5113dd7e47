//! Wire types shared by the client service and the relay.
//!
//! The relay accepts one envelope shape for every JSON action and answers
//! with either `{"data": [...]}` or `{"error": "..."}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Roles the console looks for in a history. The wire field stays a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of the transcript as the remote server stores it.
///
/// The history is owned by the remote server. Any role string, any JSON
/// `content` (text or a file reference) and any extra fields such as
/// `metadata` are kept as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role: role.as_str().to_string(), content: Value::String(content.into()), extra: Map::new() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role.as_str()
    }

    /// `content` as display text; non-string content is rendered as JSON.
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = self.extra.clone();
        map.insert("role".to_string(), Value::String(self.role.clone()));
        map.insert("content".to_string(), self.content.clone());
        Value::Object(map)
    }
}

/// Actions the relay knows how to forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    AskGraph,
    ClearConversation,
    SetBot,
    /// Multipart only.
    ProcessVideo,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::AskGraph => "ask_graph",
            Action::ClearConversation => "clear_conversation",
            Action::SetBot => "set_bot",
            Action::ProcessVideo => "process_video",
        }
    }

    /// Named endpoint on the remote Gradio server.
    pub fn endpoint(self) -> &'static str {
        match self {
            Action::AskGraph => "/ask_graph",
            Action::ClearConversation => "/clear_conversation",
            Action::SetBot => "/set_bot",
            Action::ProcessVideo => "/process_video",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ask_graph" => Ok(Action::AskGraph),
            "clear_conversation" => Ok(Action::ClearConversation),
            "set_bot" => Ok(Action::SetBot),
            "process_video" => Ok(Action::ProcessVideo),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// JSON request envelope posted to the relay.
///
/// `action` stays a plain string on the wire so an unknown or missing action
/// is a dispatch decision rather than a decode failure. `chat_history` is
/// carried as raw JSON and forwarded untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_history: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_name: Option<String>,
}

impl ProxyRequest {
    pub fn ask_graph(user_input: impl Into<String>, chat_history: &[ChatTurn]) -> Self {
        Self {
            action: Action::AskGraph.as_str().to_string(),
            user_input: Some(user_input.into()),
            chat_history: Some(Value::Array(chat_history.iter().map(ChatTurn::to_json).collect())),
            ..Default::default()
        }
    }

    pub fn clear_conversation() -> Self {
        Self { action: Action::ClearConversation.as_str().to_string(), ..Default::default() }
    }

    pub fn set_bot(bot_name: impl Into<String>) -> Self {
        Self {
            action: Action::SetBot.as_str().to_string(),
            bot_name: Some(bot_name.into()),
            ..Default::default()
        }
    }

    pub fn parsed_action(&self) -> Result<Action, UnknownAction> {
        self.action.parse()
    }
}

/// Response envelope. Exactly one of the fields is set by the relay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProxyResponse {
    pub fn data(data: Vec<Value>) -> Self {
        Self { data: Some(Value::Array(data)), error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { data: None, error: Some(message.into()) }
    }
}
