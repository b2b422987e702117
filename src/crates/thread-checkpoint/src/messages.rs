//! Conversation message formatting and de-duplication
//!
//! Checkpoint state embeds the cumulative message list under the `messages`
//! channel. Each entry is a JSON object in one of the shapes the execution
//! engine emits:
//!
//! ```text
//! {"type": "human", "content": "hi"}                         plain
//! {"role": "assistant", "content": [{"type": "text", ...}]}  role-tagged parts
//! {"lc": 1, "type": "constructor",
//!  "id": [.., "AIMessage"], "kwargs": {"content": ..}}       serialized class
//! ```
//!
//! [`format_messages`] normalises all of them into [`FormattedMessage`] and drops
//! human messages that repeat an earlier one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Maximum length of a thread preview, in characters
pub const PREVIEW_CHARS: usize = 100;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
    System,
    Tool,
    Unknown,
}

impl Role {
    /// Parse a `type` or `role` tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "human" | "user" | "HumanMessage" | "HumanMessageChunk" => Some(Role::Human),
            "ai" | "assistant" | "AIMessage" | "AIMessageChunk" => Some(Role::Ai),
            "system" | "SystemMessage" => Some(Role::System),
            "tool" | "ToolMessage" => Some(Role::Tool),
            _ => None,
        }
    }

    /// Message class name reported as the formatted `type`
    pub fn class_name(self) -> &'static str {
        match self {
            Role::Human => "HumanMessage",
            Role::Ai => "AIMessage",
            Role::System => "SystemMessage",
            Role::Tool => "ToolMessage",
            Role::Unknown => "Message",
        }
    }
}

/// A message as returned by the query layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub role: Role,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl FormattedMessage {
    fn new(role: Role, content: String) -> Self {
        Self {
            kind: role.class_name().to_string(),
            content,
            role,
            extra: Map::new(),
        }
    }
}

const EXTRA_FIELDS: [&str; 4] = ["additional_kwargs", "tool_call_id", "id", "name"];

/// Normalise one raw message
pub fn format_message(raw: &Value) -> FormattedMessage {
    let Some(object) = raw.as_object() else {
        return FormattedMessage::new(Role::Unknown, raw.to_string());
    };

    // Serialized message classes carry their fields under `kwargs`
    if object.get("type").and_then(Value::as_str) == Some("constructor") {
        if let Some(kwargs) = object.get("kwargs").and_then(Value::as_object) {
            let class = object
                .get("id")
                .and_then(Value::as_array)
                .and_then(|path| path.last())
                .and_then(Value::as_str);
            return format_fields(kwargs, class.and_then(Role::from_tag));
        }
    }

    format_fields(object, None)
}

fn format_fields(fields: &Map<String, Value>, class_role: Option<Role>) -> FormattedMessage {
    let role = class_role
        .or_else(|| {
            fields
                .get("type")
                .and_then(Value::as_str)
                .and_then(Role::from_tag)
        })
        .or_else(|| {
            fields
                .get("role")
                .and_then(Value::as_str)
                .and_then(Role::from_tag)
        })
        .unwrap_or(Role::Unknown);

    let mut message = FormattedMessage::new(role, content_text(fields.get("content")));
    for key in EXTRA_FIELDS {
        if let Some(value) = fields.get(key).filter(|value| !value.is_null()) {
            message.extra.insert(key.to_string(), value.clone());
        }
    }
    message
}

/// Text of a `content` field; text parts of a list are joined with newlines
fn content_text(content: Option<&Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.as_str()),
                Value::Object(part) => part.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}

/// Drop human messages whose text is contained in an earlier kept human message
///
/// Cumulative state growth makes the engine re-emit earlier user turns; this
/// removes those repeats. It is an approximation: a short message that happens
/// to be a substring of a longer earlier one (`"ok"` after `"ok, go ahead"`) is
/// dropped too.
pub fn dedup_human_messages(messages: Vec<FormattedMessage>) -> Vec<FormattedMessage> {
    let mut seen: Vec<String> = Vec::new();
    let mut dropped = 0usize;
    let mut kept = Vec::with_capacity(messages.len());

    for message in messages {
        if message.role == Role::Human && !message.content.is_empty() {
            if seen.iter().any(|earlier| earlier.contains(message.content.as_str())) {
                dropped += 1;
                continue;
            }
            seen.push(message.content.clone());
        }
        kept.push(message);
    }

    if dropped > 0 {
        debug!(dropped, kept = kept.len(), "Dropped repeated human messages");
    }
    kept
}

/// Normalise and de-duplicate a raw message list
pub fn format_messages(raw: &[Value]) -> Vec<FormattedMessage> {
    dedup_human_messages(raw.iter().map(format_message).collect())
}

/// Preview of a conversation: the first human message, else the first message
/// with any content, truncated to [`PREVIEW_CHARS`]. Empty without messages.
pub fn first_message_preview(raw: &[Value]) -> String {
    let formatted: Vec<FormattedMessage> = raw.iter().map(format_message).collect();
    let pick = formatted
        .iter()
        .find(|message| message.role == Role::Human && !message.content.is_empty())
        .or_else(|| formatted.iter().find(|message| !message.content.is_empty()));

    pick.map(|message| message.content.chars().take(PREVIEW_CHARS).collect())
        .unwrap_or_default()
}
