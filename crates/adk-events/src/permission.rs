use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One option the user can pick when answering a permission request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionOption {
    pub kind: String,
    pub name: String,
    pub option_id: String,
}

/// Summary of the tool call a permission request is about. Enough to render
/// the prompt; the full call state lives with the tool-call reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRef {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub raw_input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Terminal decision for a request: the user picked an option, or cancelled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PermissionOutcome {
    Selected { selected: SelectedOption },
    Cancelled { cancelled: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectedOption {
    pub option_id: String,
}

impl PermissionOutcome {
    pub fn selected(option_id: impl Into<String>) -> Self {
        Self::Selected {
            selected: SelectedOption {
                option_id: option_id.into(),
            },
        }
    }

    pub fn cancelled() -> Self {
        Self::Cancelled { cancelled: true }
    }

    pub fn selected_option_id(&self) -> Option<&str> {
        match self {
            Self::Selected { selected } => Some(&selected.option_id),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Composite correlation key. Request ids are only unique per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PermissionKey {
    pub request_id: String,
    pub session_id: String,
}

impl PermissionKey {
    pub fn new(request_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// `data` payload of a `permission.requested` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionRequested {
    pub session_id: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub tool_call: ToolCallRef,
    #[serde(default)]
    pub options: Vec<PermissionOption>,
}

impl PermissionRequested {
    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.request_id.clone(), self.session_id.clone())
    }
}

/// `data` payload of a `permission.responded` event. Local responses become
/// one of these once they round-trip through the bus, indistinguishable
/// from a response made anywhere else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionResponded {
    pub request_id: String,
    pub session_id: String,
    pub outcome: PermissionOutcome,
}

impl PermissionResponded {
    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.request_id.clone(), self.session_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_serializes_to_untagged_shapes() {
        let selected = PermissionOutcome::selected("allow");
        assert_eq!(
            serde_json::to_value(&selected).unwrap(),
            json!({"selected": {"option_id": "allow"}})
        );

        let cancelled = PermissionOutcome::cancelled();
        assert_eq!(
            serde_json::to_value(&cancelled).unwrap(),
            json!({"cancelled": true})
        );
    }

    #[test]
    fn outcome_deserializes_both_shapes() {
        let selected: PermissionOutcome =
            serde_json::from_value(json!({"selected": {"option_id": "opt_1"}})).unwrap();
        assert_eq!(selected.selected_option_id(), Some("opt_1"));

        let cancelled: PermissionOutcome =
            serde_json::from_value(json!({"cancelled": true})).unwrap();
        assert_eq!(cancelled, PermissionOutcome::cancelled());
    }

    #[test]
    fn requested_payload_decodes_with_options() {
        let payload: PermissionRequested = serde_json::from_value(json!({
            "session_id": "sess-1",
            "request_id": "req-1",
            "tool_call_id": "tc-1",
            "tool_call": {
                "title": "Run bash command",
                "kind": "execute",
                "raw_input": {"command": "ls -la"},
            },
            "options": [
                {"kind": "allow_once", "name": "Allow Once", "option_id": "opt_1"},
                {"kind": "deny", "name": "Deny", "option_id": "opt_2"},
            ],
        }))
        .unwrap();
        assert_eq!(payload.key(), PermissionKey::new("req-1", "sess-1"));
        assert_eq!(payload.options.len(), 2);
        assert_eq!(payload.tool_call.title, "Run bash command");
    }
}
