use adk_events::{
    kind, Event, OutputBatch, PermissionKey, PermissionOutcome, PermissionRequested,
    PermissionResponded, SubMessage,
};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::merge::EventMerger;
use crate::permissions::PermissionLedger;
use crate::project::{project, DisplayRecord};
use crate::tool_calls::ToolCallLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    /// Retrying stopped (auth rejection or attempts exhausted). Accumulated
    /// records stay intact.
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Box<dyn FnMut(&[DisplayRecord]) + Send>;

/// Owns every piece of derived state for one subscription: the merger, both
/// ledgers, and the projected records. One store per subscription; nothing
/// is shared across feeds, so colliding tool-call or request ids in other
/// subscriptions cannot leak in.
///
/// Consumers get change notifications through explicit `subscribe` /
/// `notify` rather than any process-wide registry; the store is passed by
/// handle to whoever needs it.
pub struct FeedStore {
    merger: EventMerger,
    tools: ToolCallLedger,
    permissions: PermissionLedger,
    local_outcomes: HashMap<PermissionKey, PermissionOutcome>,
    records: Vec<DisplayRecord>,
    status: ConnectionStatus,
    last_error: Option<String>,
    live_replay_done: bool,
    backfill_done: bool,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedStore {
    pub fn new() -> Self {
        Self {
            merger: EventMerger::new(),
            tools: ToolCallLedger::new(),
            permissions: PermissionLedger::new(),
            local_outcomes: HashMap::new(),
            records: Vec::new(),
            status: ConnectionStatus::Disconnected,
            last_error: None,
            live_replay_done: false,
            backfill_done: false,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn records(&self) -> &[DisplayRecord] {
        &self.records
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn head_cursor(&self) -> Option<u64> {
        self.merger.head_cursor()
    }

    pub fn tool_call(&self, id: &str) -> Option<&crate::tool_calls::ToolCallState> {
        self.tools.get(id)
    }

    pub fn permission(&self, key: &PermissionKey) -> Option<&crate::permissions::PermissionRecord> {
        self.permissions.snapshot(key)
    }

    /// Fully loaded means both completion signals have fired: the live
    /// stream reported `replay_complete` and the owner finished its HTTP
    /// backfill. The two paths are independent and neither gates the
    /// other's event delivery.
    pub fn is_loaded(&self) -> bool {
        self.live_replay_done && self.backfill_done
    }

    // --- input from the replay path ---

    pub fn ingest_backfill(&mut self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        self.merger.extend_replay(events);
        self.rebuild();
        self.notify();
    }

    pub fn backfill_done(&mut self) {
        self.backfill_done = true;
        self.notify();
    }

    // --- input from the live path, in arrival order ---

    pub fn apply_live_event(&mut self, event: Event) {
        self.merger.push_live(event);
        self.rebuild();
        self.notify();
    }

    pub fn mark_replay_complete(&mut self) {
        self.live_replay_done = true;
        self.notify();
    }

    pub fn mark_connected(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.notify();
    }

    pub fn mark_disconnected(&mut self, fatal: bool, reason: Option<String>) {
        self.status = if fatal {
            ConnectionStatus::Fatal
        } else {
            ConnectionStatus::Disconnected
        };
        if let Some(reason) = reason {
            self.last_error = Some(reason);
        }
        self.notify();
    }

    pub fn note_stream_error(&mut self, code: &str, message: &str) {
        self.last_error = Some(format!("{code}: {message}"));
        self.notify();
    }

    // --- local user actions ---

    /// Record an optimistic permission decision. It survives rebuilds and
    /// is overridden by the authoritative `permission.responded` event once
    /// that round-trips through the feed.
    pub fn respond_locally(&mut self, key: PermissionKey, outcome: PermissionOutcome) {
        self.permissions.set_local(&key, outcome.clone());
        self.local_outcomes.insert(key, outcome);
        self.records = project(self.merger.merged(), &self.tools, &self.permissions);
        self.notify();
    }

    // --- listeners ---

    pub fn subscribe(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn notify(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let mut listeners = std::mem::take(&mut self.listeners);
        for (_, listener) in listeners.iter_mut() {
            listener(&self.records);
        }
        self.listeners = listeners;
    }

    /// Rebuild the ledgers and projection from the merged view. Both
    /// reconcilers must see events in merger output order, not raw
    /// per-transport receipt order, so a replay page landing late means
    /// refolding from scratch.
    fn rebuild(&mut self) {
        self.tools.clear();
        self.permissions.clear();
        for event in self.merger.merged() {
            match event.kind.as_str() {
                kind::AGENT_OUTPUT_BATCH => match OutputBatch::from_event(event) {
                    Ok(batch) => {
                        for message in batch.decode() {
                            if let SubMessage::ToolCall(m) | SubMessage::ToolCallUpdate(m) = message
                            {
                                self.tools.observe(&m);
                            }
                        }
                    }
                    Err(err) => {
                        warn!("feed_batch_decode_error: cursor={} {err}", event.cursor);
                    }
                },
                kind::PERMISSION_REQUESTED => match event.payload::<PermissionRequested>() {
                    Ok(payload) => self.permissions.observe_requested(&payload),
                    Err(err) => {
                        warn!("feed_permission_decode_error: cursor={} {err}", event.cursor);
                    }
                },
                kind::PERMISSION_RESPONDED => match event.payload::<PermissionResponded>() {
                    Ok(payload) => {
                        self.permissions.observe_responded(&payload.key(), payload.outcome);
                    }
                    Err(err) => {
                        debug!("feed_response_decode_error: cursor={} {err}", event.cursor);
                    }
                },
                _ => {}
            }
        }
        for (key, outcome) in &self.local_outcomes {
            self.permissions.set_local(key, outcome.clone());
        }
        self.records = project(self.merger.merged(), &self.tools, &self.permissions);
    }
}
