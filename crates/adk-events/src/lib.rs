use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod output;
pub mod pattern;
pub mod permission;
pub mod wire;

pub use output::{
    decode_message, decode_messages, AgentMessage, OutputBatch, PlanEntry, PlanMessage,
    StreamKind, SubMessage, SystemMessage, ToolCallMessage, ToolStatus,
};
pub use pattern::KindPattern;
pub use permission::{
    PermissionKey, PermissionOption, PermissionOutcome, PermissionRequested,
    PermissionResponded, ToolCallRef,
};
pub use wire::{ClientFrame, FrameError, ServerFrame};

/// Dot-namespaced event kinds the bus carries. The engine only interprets
/// the `agent.output_batch` and `permission.*` payloads; everything else is
/// passed through opaque and only named here for subscription filters.
pub mod kind {
    pub const TASK_CREATED: &str = "task.created";
    pub const TASK_STATUS_CHANGED: &str = "task.status_changed";
    pub const TASK_ASSIGNED: &str = "task.assigned";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_ARCHIVED: &str = "task.archived";

    pub const AGENT_STARTED: &str = "agent.started";
    pub const AGENT_STOPPED: &str = "agent.stopped";
    pub const AGENT_OUTPUT_BATCH: &str = "agent.output_batch";
    pub const AGENT_ERROR: &str = "agent.error";
    pub const AGENT_SESSION_STARTED: &str = "agent.session_started";
    pub const AGENT_SESSION_EXITED: &str = "agent.session_exited";

    pub const PERMISSION_REQUESTED: &str = "permission.requested";
    pub const PERMISSION_RESPONDED: &str = "permission.responded";

    pub const ARTIFACT_CREATED: &str = "artifact.created";
}

/// One immutable record on the bus. `cursor` is globally unique and strictly
/// increasing in emission order; it is the sole ordering key across replay
/// and live delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub cursor: u64,
    pub kind: String,
    pub time: DateTime<Utc>,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("payload decode failed: {0}")]
pub struct PayloadError(pub String);

/// Decode an event's opaque `data` into a known payload shape.
pub fn decode_payload<T: DeserializeOwned>(data: &Value) -> Result<T, PayloadError> {
    serde_json::from_value(data.clone()).map_err(|err| PayloadError(err.to_string()))
}

impl Event {
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        decode_payload(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_round_trip_keeps_optional_fields() {
        let event = Event {
            cursor: 42,
            kind: kind::TASK_CREATED.to_string(),
            time: "2026-03-01T10:00:00Z".parse().unwrap(),
            agent_id: "agent-1".to_string(),
            session_id: Some("sess-1".to_string()),
            task_id: None,
            data: json!({"task_id": "t-1", "title": "demo"}),
        };
        let encoded = serde_json::to_string(&event).unwrap();
        assert!(!encoded.contains("task_id\":null"));
        let decoded: Event = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn decode_payload_reports_shape_mismatch() {
        #[derive(Deserialize, Debug)]
        struct Expect {
            #[allow(dead_code)]
            cursor: u64,
        }
        let err = decode_payload::<Expect>(&json!({"cursor": "nope"})).unwrap_err();
        assert!(err.0.contains("invalid type"));
    }
}
