use adk_events::{kind, Event, PermissionKey, PermissionOutcome, ToolStatus};
use adk_feed::{ConnectionStatus, DisplayRecord, FeedStore};
use serde_json::{json, Value};

fn event(cursor: u64, kind: &str, data: Value) -> Event {
    Event {
        cursor,
        kind: kind.to_string(),
        time: "2026-03-01T10:00:00Z".parse().expect("valid timestamp"),
        agent_id: "agent-1".to_string(),
        session_id: Some("sess-1".to_string()),
        task_id: Some("task-1".to_string()),
        data,
    }
}

fn batch(cursor: u64, stream: &str, messages: Vec<&str>) -> Event {
    event(
        cursor,
        kind::AGENT_OUTPUT_BATCH,
        json!({
            "session_id": "sess-1",
            "stream": stream,
            "messages": messages,
            "ts": 1_772_000_000_000i64 + cursor as i64,
        }),
    )
}

fn permission_requested(cursor: u64, request_id: &str) -> Event {
    event(
        cursor,
        kind::PERMISSION_REQUESTED,
        json!({
            "request_id": request_id,
            "session_id": "sess-1",
            "tool_call_id": "tc-1",
            "tool_call": {"title": "Run bash command", "kind": "execute", "raw_input": {"command": "ls"}},
            "options": [
                {"kind": "allow_once", "name": "Allow Once", "option_id": "allow"},
                {"kind": "deny", "name": "Deny", "option_id": "deny"},
            ],
        }),
    )
}

fn permission_responded(cursor: u64, request_id: &str, outcome: Value) -> Event {
    event(
        cursor,
        kind::PERMISSION_RESPONDED,
        json!({
            "request_id": request_id,
            "session_id": "sess-1",
            "outcome": outcome,
        }),
    )
}

/// A whole conversation delivered across both transports, with the replay
/// page arriving after live delivery already started and one event
/// duplicated across the two.
#[test]
fn interleaved_transports_converge_to_one_ordered_view() {
    let mut store = FeedStore::new();

    // live starts mid-conversation
    store.apply_live_event(batch(
        6,
        "tool_use",
        vec![r#"{"type":"tool_call_update","id":"tc-1","status":"completed","raw_output":{"exit":0}}"#],
    ));
    store.apply_live_event(batch(
        7,
        "assistant",
        vec![r#"{"type":"agent_message","text":"All done."}"#],
    ));

    // the backfill lands late and overlaps cursor 6
    store.ingest_backfill(vec![
        batch(
            2,
            "assistant",
            vec![
                r#"{"type":"agent_message","chunk":0,"text":"Let me "}"#,
                r#"{"type":"agent_message","chunk":1,"text":"check that."}"#,
            ],
        ),
        batch(
            4,
            "tool_use",
            vec![
                r#"{"type":"tool_call","id":"tc-1","kind":"execute","title":"List files","status":"pending","raw_input":{"command":"ls"}}"#,
            ],
        ),
        batch(
            6,
            "tool_use",
            vec![r#"{"type":"tool_call_update","id":"tc-1","status":"completed","raw_output":{"exit":0}}"#],
        ),
    ]);
    store.backfill_done();
    store.mark_replay_complete();

    assert!(store.is_loaded());
    assert_eq!(store.head_cursor(), Some(7));

    let records = store.records();
    assert_eq!(records.len(), 3);

    let cursors: Vec<u64> = records.iter().map(DisplayRecord::cursor).collect();
    assert_eq!(cursors, vec![2, 4, 7]);

    match &records[0] {
        DisplayRecord::Text { text, .. } => assert_eq!(text, "Let me check that."),
        other => panic!("expected text record, got {other:?}"),
    }
    match &records[1] {
        DisplayRecord::ToolCall { call, .. } => {
            assert_eq!(call.title, "List files");
            assert_eq!(call.status, ToolStatus::Completed);
            assert_eq!(call.raw_output, Some(json!({"exit": 0})));
        }
        other => panic!("expected tool call record, got {other:?}"),
    }
    match &records[2] {
        DisplayRecord::Text { text, .. } => assert_eq!(text, "All done."),
        other => panic!("expected text record, got {other:?}"),
    }
}

#[test]
fn redelivered_events_change_nothing() {
    let mut store = FeedStore::new();
    let create = batch(
        3,
        "tool_use",
        vec![
            r#"{"type":"tool_call","id":"tc-1","kind":"execute","title":"List files","status":"pending"}"#,
        ],
    );
    store.apply_live_event(create.clone());
    let first = store.records().to_vec();

    // the same cursor shows up again on the other transport
    store.ingest_backfill(vec![create]);
    assert_eq!(store.records(), first.as_slice());
}

#[test]
fn permission_round_trip_with_optimistic_local_decision() {
    let mut store = FeedStore::new();
    store.apply_live_event(permission_requested(1, "req-1"));

    let key = PermissionKey::new("req-1", "sess-1");
    let pending = store.permission(&key).expect("request observed");
    assert!(!pending.is_resolved());
    assert!(pending.outcome().is_none());

    // the user clicks allow; the UI shows it before the bus echoes it
    store.respond_locally(key.clone(), PermissionOutcome::selected("allow"));
    let optimistic = store.permission(&key).expect("record kept");
    assert!(!optimistic.is_resolved());
    assert_eq!(
        optimistic.outcome().and_then(PermissionOutcome::selected_option_id),
        Some("allow")
    );

    // the authoritative echo arrives and confirms it
    store.apply_live_event(permission_responded(
        2,
        "req-1",
        json!({"selected": {"option_id": "allow"}}),
    ));
    let confirmed = store.permission(&key).expect("record kept");
    assert!(confirmed.is_resolved());
    assert_eq!(
        confirmed.outcome().and_then(PermissionOutcome::selected_option_id),
        Some("allow")
    );

    // a duplicate response later in the stream is a no-op
    store.apply_live_event(permission_responded(9, "req-1", json!({"cancelled": true})));
    let still = store.permission(&key).expect("record kept");
    assert_eq!(
        still.outcome().and_then(PermissionOutcome::selected_option_id),
        Some("allow")
    );

    assert_eq!(store.records().len(), 1);
    match &store.records()[0] {
        DisplayRecord::Permission { cursor, record } => {
            assert_eq!(*cursor, 1);
            assert!(record.is_resolved());
        }
        other => panic!("expected permission record, got {other:?}"),
    }
}

#[test]
fn malformed_payloads_never_poison_the_feed() {
    let mut store = FeedStore::new();
    // output_batch whose data is not a batch at all
    store.apply_live_event(event(1, kind::AGENT_OUTPUT_BATCH, json!({"bogus": true})));
    // a batch with one good and one broken element
    store.apply_live_event(batch(
        2,
        "assistant",
        vec![r#"{"type":"agent_message","text":"still here"}"#, "{{{"],
    ));

    let records = store.records();
    assert_eq!(records.len(), 2);
    assert!(matches!(&records[0], DisplayRecord::Text { text, .. } if text == "still here"));
    assert!(matches!(&records[1], DisplayRecord::Raw { text, .. } if text == "{{{"));
    assert_eq!(store.status(), ConnectionStatus::Disconnected);
}
