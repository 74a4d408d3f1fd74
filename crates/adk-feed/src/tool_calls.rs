use adk_events::{ToolCallMessage, ToolStatus};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Bare tool-category names the upstream agent protocol sends when it has
/// no human-readable title yet. An update carrying one of these must not
/// clobber a real title learned earlier.
const GENERIC_TITLES: &[&str] = &[
    "tool",
    "read",
    "edit",
    "delete",
    "move",
    "search",
    "execute",
    "think",
    "fetch",
    "switch_mode",
    "other",
];

/// Coalesced projection of one tool call, built from a `tool_call` create
/// and any number of `tool_call_update` messages sharing its id. Never
/// deleted for the lifetime of the conversation view.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolCallState {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub status: ToolStatus,
    /// Always an object; an update with an empty or absent input never
    /// erases a previously-known one.
    pub raw_input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ToolCallState {
    pub fn from_message(message: &ToolCallMessage) -> Self {
        Self {
            id: message.id.clone(),
            kind: message.kind.clone(),
            title: message.title.clone(),
            status: message.status,
            raw_input: message
                .raw_input
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default())),
            raw_output: message.raw_output.clone(),
            content: message.content.clone(),
        }
    }
}

fn is_generic_title(title: &str) -> bool {
    GENERIC_TITLES
        .iter()
        .any(|generic| title.eq_ignore_ascii_case(generic))
}

fn is_nonempty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|map| !map.is_empty())
}

/// Fold an incoming create/update into the existing state. Idempotent:
/// folding the same message twice produces the same state as once.
pub fn fold(existing: Option<&ToolCallState>, incoming: &ToolCallMessage) -> ToolCallState {
    let Some(existing) = existing else {
        return ToolCallState::from_message(incoming);
    };
    let mut folded = existing.clone();

    // Terminal status wins and never regresses back to pending.
    if incoming.status.is_terminal() {
        folded.status = incoming.status;
    }
    if !incoming.title.is_empty() && !is_generic_title(&incoming.title) {
        folded.title = incoming.title.clone();
    }
    if !incoming.kind.is_empty() {
        folded.kind = incoming.kind.clone();
    }
    if let Some(raw_input) = &incoming.raw_input {
        if is_nonempty_object(raw_input) {
            folded.raw_input = raw_input.clone();
        }
    }
    if let Some(raw_output) = &incoming.raw_output {
        folded.raw_output = Some(raw_output.clone());
    }
    if let Some(content) = &incoming.content {
        folded.content = Some(content.clone());
    }
    folded
}

/// Owns every tool-call projection for one subscription. Exposed to the
/// projector as read-only snapshots.
#[derive(Debug, Default)]
pub struct ToolCallLedger {
    calls: HashMap<String, ToolCallState>,
}

impl ToolCallLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, message: &ToolCallMessage) {
        let folded = fold(self.calls.get(&message.id), message);
        self.calls.insert(message.id.clone(), folded);
    }

    pub fn get(&self, id: &str) -> Option<&ToolCallState> {
        self.calls.get(id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}
