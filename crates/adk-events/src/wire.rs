use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Event;

/// Server error code for a rejected auth token. Distinct from transport
/// failures: the caller must not retry it.
pub const ERROR_CODE_UNAUTHORIZED: &str = "unauthorized";

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

/// Frames the bus pushes over the live subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Subscription acknowledged; `last_cursor` is the bus head at ack time.
    Subscribed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_cursor: Option<u64>,
    },
    Event {
        event: Event,
    },
    /// Historical delivery for the requested starting cursor is finished;
    /// everything after this frame is live.
    ReplayComplete,
    Error {
        code: String,
        message: String,
    },
    Ping,
    /// Frame types this client does not know. Kept so a newer server never
    /// kills the stream; the connection drops them with a diagnostic.
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        if text.len() > DEFAULT_MAX_FRAME_BYTES {
            return Err(FrameError::OversizedFrame {
                size: text.len(),
                max: DEFAULT_MAX_FRAME_BYTES,
            });
        }
        serde_json::from_str(text).map_err(|err| FrameError::Decode(err.to_string()))
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, ServerFrame::Error { code, .. } if code == ERROR_CODE_UNAUTHORIZED)
    }
}

/// Frames the client sends upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        client_id: String,
        /// Comma-joinable kind patterns; empty means every kind.
        #[serde(default)]
        kinds: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },
    Pong,
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(|err| FrameError::Encode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_frames_decode_by_type_tag() {
        let subscribed = ServerFrame::decode(r#"{"type":"subscribed","last_cursor":17}"#).unwrap();
        assert_eq!(
            subscribed,
            ServerFrame::Subscribed {
                last_cursor: Some(17)
            }
        );

        let event = ServerFrame::decode(
            r#"{"type":"event","event":{"cursor":3,"kind":"task.created","time":"2026-03-01T10:00:00Z","agent_id":"a1","data":{}}}"#,
        )
        .unwrap();
        match event {
            ServerFrame::Event { event } => {
                assert_eq!(event.cursor, 3);
                assert_eq!(event.kind, "task.created");
            }
            other => panic!("expected event frame, got {other:?}"),
        }

        assert_eq!(
            ServerFrame::decode(r#"{"type":"replay_complete"}"#).unwrap(),
            ServerFrame::ReplayComplete
        );
        assert_eq!(ServerFrame::decode(r#"{"type":"ping"}"#).unwrap(), ServerFrame::Ping);
    }

    #[test]
    fn unknown_frame_type_decodes_to_fallback() {
        let frame = ServerFrame::decode(r#"{"type":"stats","connections":4}"#).unwrap();
        assert_eq!(frame, ServerFrame::Unknown);
    }

    #[test]
    fn malformed_frame_is_a_decode_error() {
        assert!(matches!(
            ServerFrame::decode("not json"),
            Err(FrameError::Decode(_))
        ));
    }

    #[test]
    fn auth_error_is_distinguished_from_stream_errors() {
        let auth = ServerFrame::Error {
            code: ERROR_CODE_UNAUTHORIZED.to_string(),
            message: "bad token".to_string(),
        };
        let stream = ServerFrame::Error {
            code: "overloaded".to_string(),
            message: "slow down".to_string(),
        };
        assert!(auth.is_auth_error());
        assert!(!stream.is_auth_error());
    }

    #[test]
    fn subscribe_frame_omits_absent_filters() {
        let frame = ClientFrame::Subscribe {
            client_id: "c1".to_string(),
            kinds: vec!["task.*".to_string()],
            since: None,
            agent_id: None,
            task_id: Some("t-9".to_string()),
        };
        let encoded = frame.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], json!("subscribe"));
        assert_eq!(value["task_id"], json!("t-9"));
        assert!(value.get("since").is_none());
        assert!(value.get("agent_id").is_none());
    }
}
