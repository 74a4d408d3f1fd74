use adk_events::pattern::join_patterns;
use adk_events::KindPattern;
use thiserror::Error;
use url::Url;

pub mod api;
pub mod live;

pub use api::{BusApi, EmitReceipt, ReplayFilters, ReplayPage};
pub use live::{reconnect_delay, ConnectLimits, FeedConnection, FeedHandle, FeedNotice};

#[derive(Debug, Error)]
pub enum ClientError {
    /// Token rejected. Fail fast; never enters the backoff loop.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("bus rejected request ({code}): {message}")]
    Bus { code: String, message: String },
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

/// One logical subscription to the bus. Immutable for the life of a
/// connection; changing filters means closing and reopening.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// WebSocket endpoint of the bus, e.g. `ws://host:port/subscribe`.
    pub url: Url,
    pub token: String,
    pub kinds: Vec<KindPattern>,
    /// Starting cursor; when set the server replays history at or after it
    /// before (or interleaved with) live delivery.
    pub since: Option<u64>,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
}

impl Subscription {
    pub fn new(url: Url, token: impl Into<String>) -> Self {
        Self {
            url,
            token: token.into(),
            kinds: Vec::new(),
            since: None,
            agent_id: None,
            task_id: None,
        }
    }

    /// The endpoint with subscription parameters encoded as query pairs.
    pub fn socket_url(&self) -> Url {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", &self.token);
            if !self.kinds.is_empty() {
                query.append_pair("kinds", &join_patterns(&self.kinds));
            }
            if let Some(since) = self.since {
                query.append_pair("since", &since.to_string());
            }
            if let Some(agent_id) = &self.agent_id {
                query.append_pair("agent_id", agent_id);
            }
            if let Some(task_id) = &self.task_id {
                query.append_pair("task_id", task_id);
            }
        }
        url
    }
}
