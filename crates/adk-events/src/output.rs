use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{decode_payload, Event, PayloadError};

/// The `data` payload of an `agent.output_batch` event. Each element of
/// `messages` is an independently JSON-encoded sub-message; `ts` is the
/// batch emission time in millis, finer-grained than the event's `time`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputBatch {
    pub session_id: String,
    #[serde(default)]
    pub stream: String,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub ts: i64,
}

impl OutputBatch {
    pub fn from_event(event: &Event) -> Result<Self, PayloadError> {
        decode_payload(&event.data)
    }

    pub fn stream_kind(&self) -> StreamKind {
        StreamKind::parse(&self.stream)
    }

    pub fn decode(&self) -> Vec<SubMessage> {
        decode_messages(&self.messages)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    System,
    Assistant,
    Plan,
    ToolUse,
    ToolResult,
    Other,
}

impl StreamKind {
    pub fn parse(input: &str) -> Self {
        match input.trim() {
            "system" => StreamKind::System,
            "assistant" => StreamKind::Assistant,
            "plan" => StreamKind::Plan,
            "tool_use" => StreamKind::ToolUse,
            "tool_result" => StreamKind::ToolResult,
            _ => StreamKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::System => "system",
            StreamKind::Assistant => "assistant",
            StreamKind::Plan => "plan",
            StreamKind::ToolUse => "tool_use",
            StreamKind::ToolResult => "tool_result",
            StreamKind::Other => "other",
        }
    }
}

/// Lifecycle status of a tool call. `completed` and `error` are terminal.
/// The upstream agent protocol also reports `in_progress` and `failed`;
/// those map onto the same three states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    #[serde(alias = "in_progress")]
    Pending,
    Completed,
    #[serde(alias = "failed")]
    Error,
}

impl ToolStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolStatus::Completed | ToolStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Pending => "pending",
            ToolStatus::Completed => "completed",
            ToolStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<u64>,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanEntry {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanMessage {
    #[serde(default)]
    pub entries: Vec<PlanEntry>,
}

/// A tool-call create or update. The two share one shape; the `type`
/// discriminator on the wire decides which variant the decoder emits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallMessage {
    pub id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemMessage {
    #[serde(default)]
    pub subtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubMessage {
    Agent(AgentMessage),
    Plan(PlanMessage),
    ToolCall(ToolCallMessage),
    ToolCallUpdate(ToolCallMessage),
    System(SystemMessage),
    /// Anything that failed to parse or carried an unknown discriminator.
    /// The original string is kept so the caller can still display it.
    Raw(String),
}

/// Decode one raw sub-message. Never fails: malformed or unrecognized input
/// degrades to [`SubMessage::Raw`].
pub fn decode_message(raw: &str) -> SubMessage {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            debug!("submessage_parse_fallback: {err}");
            return SubMessage::Raw(raw.to_string());
        }
    };
    let message_type = value.get("type").and_then(Value::as_str).unwrap_or_default();
    let decoded = match message_type {
        "agent_message" => serde_json::from_value(value).map(SubMessage::Agent),
        "plan" => serde_json::from_value(value).map(SubMessage::Plan),
        "tool_call" => serde_json::from_value(value).map(SubMessage::ToolCall),
        "tool_call_update" => serde_json::from_value(value).map(SubMessage::ToolCallUpdate),
        "system" => serde_json::from_value(value).map(SubMessage::System),
        other => {
            debug!("submessage_unknown_type: {other}");
            return SubMessage::Raw(raw.to_string());
        }
    };
    match decoded {
        Ok(message) => message,
        Err(err) => {
            debug!("submessage_shape_fallback: {err}");
            SubMessage::Raw(raw.to_string())
        }
    }
}

/// Decode every element of a batch independently. One malformed element
/// never aborts the rest.
pub fn decode_messages(raw: &[String]) -> Vec<SubMessage> {
    raw.iter().map(|message| decode_message(message)).collect()
}
