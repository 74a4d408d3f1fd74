use adk_events::{
    PermissionKey, PermissionOption, PermissionOutcome, PermissionRequested, ToolCallRef,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// One permission request and its (eventual) resolution. The outcome is a
/// two-source value: `local` is the optimistic decision shown before the
/// bus echoes it back, `confirmed` is the authoritative one carried by a
/// `permission.responded` event. Confirmed always wins once present.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PermissionRecord {
    pub key: PermissionKey,
    pub tool_call: ToolCallRef,
    pub options: Vec<PermissionOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<PermissionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<PermissionOutcome>,
}

impl PermissionRecord {
    pub fn outcome(&self) -> Option<&PermissionOutcome> {
        self.confirmed.as_ref().or(self.local.as_ref())
    }

    /// Resolved means the bus confirmed a terminal outcome; a local-only
    /// decision still counts as pending for correlation purposes.
    pub fn is_resolved(&self) -> bool {
        self.confirmed.is_some()
    }
}

/// Correlates `permission.requested` with its later `permission.responded`
/// by composite key. Requests are first-write-wins; responses apply exactly
/// once. Locally-made and remote decisions are indistinguishable once they
/// arrive through the feed.
#[derive(Debug, Default)]
pub struct PermissionLedger {
    records: HashMap<PermissionKey, PermissionRecord>,
}

impl PermissionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// No-op when the key already exists; the summary fields are immutable.
    pub fn observe_requested(&mut self, payload: &PermissionRequested) {
        let key = payload.key();
        if self.records.contains_key(&key) {
            debug!("permission_duplicate_request: {}", key.request_id);
            return;
        }
        self.records.insert(
            key.clone(),
            PermissionRecord {
                key,
                tool_call: payload.tool_call.clone(),
                options: payload.options.clone(),
                confirmed: None,
                local: None,
            },
        );
    }

    /// Applies only to a known, unresolved request. Responses to requests
    /// this client never observed, and duplicate responses, are dropped.
    pub fn observe_responded(&mut self, key: &PermissionKey, outcome: PermissionOutcome) {
        match self.records.get_mut(key) {
            Some(record) if record.confirmed.is_none() => {
                record.confirmed = Some(outcome);
            }
            Some(_) => {
                debug!("permission_duplicate_response: {}", key.request_id);
            }
            None => {
                debug!("permission_orphan_response: {}", key.request_id);
            }
        }
    }

    /// Record an optimistic local decision, shown until the authoritative
    /// event round-trips. Ignored when already confirmed.
    pub fn set_local(&mut self, key: &PermissionKey, outcome: PermissionOutcome) {
        if let Some(record) = self.records.get_mut(key) {
            if record.confirmed.is_none() {
                record.local = Some(outcome);
            }
        }
    }

    pub fn snapshot(&self, key: &PermissionKey) -> Option<&PermissionRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requested(request_id: &str) -> PermissionRequested {
        PermissionRequested {
            session_id: "sess-1".to_string(),
            request_id: request_id.to_string(),
            tool_call_id: Some("tc-1".to_string()),
            tool_call: ToolCallRef {
                title: "Run bash command".to_string(),
                kind: "execute".to_string(),
                raw_input: json!({"command": "ls"}),
                tool_call_id: Some("tc-1".to_string()),
            },
            options: vec![PermissionOption {
                kind: "allow_once".to_string(),
                name: "Allow Once".to_string(),
                option_id: "allow".to_string(),
            }],
        }
    }

    fn key(request_id: &str) -> PermissionKey {
        PermissionKey::new(request_id, "sess-1")
    }

    #[test]
    fn request_then_response_resolves_once() {
        let mut ledger = PermissionLedger::new();
        ledger.observe_requested(&requested("r1"));
        assert!(!ledger.snapshot(&key("r1")).unwrap().is_resolved());

        ledger.observe_responded(&key("r1"), PermissionOutcome::selected("allow"));
        let record = ledger.snapshot(&key("r1")).unwrap();
        assert!(record.is_resolved());
        assert_eq!(record.outcome().unwrap().selected_option_id(), Some("allow"));
    }

    #[test]
    fn duplicate_response_leaves_outcome_unchanged() {
        let mut ledger = PermissionLedger::new();
        ledger.observe_requested(&requested("r1"));
        ledger.observe_responded(&key("r1"), PermissionOutcome::selected("allow"));
        ledger.observe_responded(&key("r1"), PermissionOutcome::cancelled());
        assert_eq!(
            ledger
                .snapshot(&key("r1"))
                .unwrap()
                .outcome()
                .unwrap()
                .selected_option_id(),
            Some("allow")
        );
    }

    #[test]
    fn orphan_response_is_dropped() {
        let mut ledger = PermissionLedger::new();
        ledger.observe_responded(&key("ghost"), PermissionOutcome::cancelled());
        assert!(ledger.is_empty());
    }

    #[test]
    fn duplicate_request_keeps_first_summary() {
        let mut ledger = PermissionLedger::new();
        ledger.observe_requested(&requested("r1"));
        let mut second = requested("r1");
        second.tool_call.title = "Different title".to_string();
        ledger.observe_requested(&second);
        assert_eq!(
            ledger.snapshot(&key("r1")).unwrap().tool_call.title,
            "Run bash command"
        );
    }

    #[test]
    fn confirmed_overrides_local_once_it_arrives() {
        let mut ledger = PermissionLedger::new();
        ledger.observe_requested(&requested("r1"));

        ledger.set_local(&key("r1"), PermissionOutcome::selected("allow"));
        let record = ledger.snapshot(&key("r1")).unwrap();
        assert!(!record.is_resolved());
        assert_eq!(record.outcome().unwrap().selected_option_id(), Some("allow"));

        // the round-trip lands with a different decision; it wins
        ledger.observe_responded(&key("r1"), PermissionOutcome::cancelled());
        let record = ledger.snapshot(&key("r1")).unwrap();
        assert_eq!(record.outcome(), Some(&PermissionOutcome::cancelled()));

        // a late local write after confirmation is ignored
        ledger.set_local(&key("r1"), PermissionOutcome::selected("allow"));
        assert_eq!(
            ledger.snapshot(&key("r1")).unwrap().outcome(),
            Some(&PermissionOutcome::cancelled())
        );
    }
}
