use adk_events::pattern::join_patterns;
use adk_events::{Event, KindPattern, PermissionOutcome};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::ClientError;

/// Kind/agent/task filters for a replay request. Mirrors the live
/// subscription filters so a backfill sees the same slice of the bus.
#[derive(Debug, Clone, Default)]
pub struct ReplayFilters {
    pub kinds: Vec<KindPattern>,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
}

/// One page of historical events. A full page (`events.len() == limit`)
/// means more data may exist past `next_cursor`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayPage {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub next_cursor: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmitReceipt {
    pub cursor: u64,
}

#[derive(Debug, Serialize)]
struct EmitRequest<'a> {
    kind: &'a str,
    data: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct RespondRequest<'a> {
    request_id: &'a str,
    session_id: &'a str,
    outcome: &'a PermissionOutcome,
}

/// The request/response half of the bus contract: replay, emit, and
/// permission responses. No retry policy of its own.
#[derive(Debug, Clone)]
pub struct BusApi {
    base: Url,
    token: String,
    http: reqwest::Client,
}

impl BusApi {
    pub fn new(base: Url, token: impl Into<String>) -> Self {
        Self {
            base,
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|err| ClientError::Transport(err.to_string()))
    }

    /// Fetch up to `limit` events at or after `cursor`, ascending.
    pub async fn fetch_since(
        &self,
        cursor: u64,
        filters: &ReplayFilters,
        limit: usize,
    ) -> Result<ReplayPage, ClientError> {
        let mut url = self.endpoint("events")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("cursor", &cursor.to_string());
            query.append_pair("limit", &limit.to_string());
            if !filters.kinds.is_empty() {
                query.append_pair("kinds", &join_patterns(&filters.kinds));
            }
            if let Some(agent_id) = &filters.agent_id {
                query.append_pair("agent_id", agent_id);
            }
            if let Some(task_id) = &filters.task_id {
                query.append_pair("task_id", task_id);
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = check_status(response).await?;
        let page: ReplayPage = response.json().await?;
        debug!(
            "replay_page: cursor={cursor} events={} next={:?}",
            page.events.len(),
            page.next_cursor
        );
        Ok(page)
    }

    /// Page through history from `cursor` until a short page. The page
    /// `limit` bounds each request, not the total.
    pub async fn fetch_all(
        &self,
        cursor: u64,
        filters: &ReplayFilters,
        limit: usize,
    ) -> Result<Vec<Event>, ClientError> {
        let mut events = Vec::new();
        let mut next = cursor;
        loop {
            let page = self.fetch_since(next, filters, limit).await?;
            let full = page.events.len() >= limit && limit > 0;
            events.extend(page.events);
            match page.next_cursor {
                // the cursor must advance or the loop would spin in place
                Some(cursor) if full && cursor > next => next = cursor,
                _ => break,
            }
        }
        Ok(events)
    }

    /// Publish an event; the bus assigns and returns its cursor.
    pub async fn emit(
        &self,
        kind: &str,
        data: &Value,
        task_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<u64, ClientError> {
        let url = self.endpoint("events")?;
        let body = EmitRequest {
            kind,
            data,
            task_id,
            session_id,
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let receipt: EmitReceipt = response.json().await?;
        Ok(receipt.cursor)
    }

    /// Answer a permission request. The decision comes back to every
    /// subscriber (this client included) as a `permission.responded` event.
    pub async fn respond_permission(
        &self,
        request_id: &str,
        session_id: &str,
        outcome: &PermissionOutcome,
    ) -> Result<u64, ClientError> {
        let url = self.endpoint("permissions/respond")?;
        let body = RespondRequest {
            request_id,
            session_id,
            outcome,
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let receipt: EmitReceipt = response.json().await?;
        Ok(receipt.cursor)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ClientError::Unauthorized(body));
    }
    Err(ClientError::Bus {
        code: status.as_u16().to_string(),
        message: body,
    })
}
