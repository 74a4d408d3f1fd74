use adk_events::{
    kind, Event, OutputBatch, PermissionRequested, PlanEntry, SubMessage,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::permissions::{PermissionLedger, PermissionRecord};
use crate::tool_calls::{ToolCallLedger, ToolCallState};

/// One renderable unit of the conversation. `cursor` is the anchoring
/// event's cursor; records keep their anchor even as later events refine
/// their content in place.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayRecord {
    /// A contiguous run of assistant chunks from one output batch,
    /// concatenated in array order.
    Text {
        cursor: u64,
        session_id: String,
        ts: i64,
        text: String,
    },
    /// The agent's plan for one session. A later plan batch replaces the
    /// entries; it does not append or re-anchor.
    Plan {
        cursor: u64,
        session_id: String,
        entries: Vec<PlanEntry>,
    },
    /// A tool call, rendered once at its first appearance and refined in
    /// place by later updates.
    ToolCall { cursor: u64, call: ToolCallState },
    Permission {
        cursor: u64,
        record: PermissionRecord,
    },
    System {
        cursor: u64,
        session_id: String,
        subtype: String,
        commands: Vec<String>,
    },
    /// A sub-message that failed to decode; shown verbatim.
    Raw {
        cursor: u64,
        session_id: String,
        text: String,
    },
}

impl DisplayRecord {
    pub fn cursor(&self) -> u64 {
        match self {
            DisplayRecord::Text { cursor, .. }
            | DisplayRecord::Plan { cursor, .. }
            | DisplayRecord::ToolCall { cursor, .. }
            | DisplayRecord::Permission { cursor, .. }
            | DisplayRecord::System { cursor, .. }
            | DisplayRecord::Raw { cursor, .. } => *cursor,
        }
    }
}

/// Project the merged event sequence into display records. Pure over its
/// inputs: callers re-run it whenever the merged view or either ledger
/// changes, which is what keeps anchored records refined in place.
pub fn project(
    events: &[Event],
    tools: &ToolCallLedger,
    permissions: &PermissionLedger,
) -> Vec<DisplayRecord> {
    let mut records: Vec<DisplayRecord> = Vec::new();
    let mut rendered_tools: HashSet<String> = HashSet::new();
    let mut plan_slots: HashMap<String, usize> = HashMap::new();

    for event in events {
        match event.kind.as_str() {
            kind::AGENT_OUTPUT_BATCH => {
                let batch = match OutputBatch::from_event(event) {
                    Ok(batch) => batch,
                    Err(err) => {
                        warn!("project_batch_decode_error: cursor={} {err}", event.cursor);
                        continue;
                    }
                };
                project_batch(event, &batch, tools, &mut records, &mut rendered_tools, &mut plan_slots);
            }
            kind::PERMISSION_REQUESTED => {
                let payload = match event.payload::<PermissionRequested>() {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!("project_permission_decode_error: cursor={} {err}", event.cursor);
                        continue;
                    }
                };
                let record = permissions
                    .snapshot(&payload.key())
                    .cloned()
                    .unwrap_or_else(|| PermissionRecord {
                        key: payload.key(),
                        tool_call: payload.tool_call.clone(),
                        options: payload.options.clone(),
                        confirmed: None,
                        local: None,
                    });
                records.push(DisplayRecord::Permission {
                    cursor: event.cursor,
                    record,
                });
            }
            // responses feed the correlator; they render nothing themselves
            _ => {}
        }
    }
    records
}

fn project_batch(
    event: &Event,
    batch: &OutputBatch,
    tools: &ToolCallLedger,
    records: &mut Vec<DisplayRecord>,
    rendered_tools: &mut HashSet<String>,
    plan_slots: &mut HashMap<String, usize>,
) {
    let mut run = String::new();
    for message in batch.decode() {
        match message {
            SubMessage::Agent(agent) => {
                run.push_str(&agent.text);
            }
            other => {
                flush_run(&mut run, event, batch, records);
                match other {
                    SubMessage::Plan(plan) => {
                        match plan_slots.get(&batch.session_id) {
                            Some(&slot) => {
                                if let DisplayRecord::Plan { entries, .. } = &mut records[slot] {
                                    *entries = plan.entries;
                                }
                            }
                            None => {
                                plan_slots.insert(batch.session_id.clone(), records.len());
                                records.push(DisplayRecord::Plan {
                                    cursor: event.cursor,
                                    session_id: batch.session_id.clone(),
                                    entries: plan.entries,
                                });
                            }
                        }
                    }
                    SubMessage::ToolCall(message) | SubMessage::ToolCallUpdate(message) => {
                        if rendered_tools.insert(message.id.clone()) {
                            let call = tools
                                .get(&message.id)
                                .cloned()
                                .unwrap_or_else(|| ToolCallState::from_message(&message));
                            records.push(DisplayRecord::ToolCall {
                                cursor: event.cursor,
                                call,
                            });
                        }
                    }
                    SubMessage::System(system) => {
                        records.push(DisplayRecord::System {
                            cursor: event.cursor,
                            session_id: batch.session_id.clone(),
                            subtype: system.subtype,
                            commands: system.commands.unwrap_or_default(),
                        });
                    }
                    SubMessage::Raw(text) => {
                        records.push(DisplayRecord::Raw {
                            cursor: event.cursor,
                            session_id: batch.session_id.clone(),
                            text,
                        });
                    }
                    SubMessage::Agent(_) => unreachable!("handled above"),
                }
            }
        }
    }
    flush_run(&mut run, event, batch, records);
}

fn flush_run(
    run: &mut String,
    event: &Event,
    batch: &OutputBatch,
    records: &mut Vec<DisplayRecord>,
) {
    if run.is_empty() {
        return;
    }
    records.push(DisplayRecord::Text {
        cursor: event.cursor,
        session_id: batch.session_id.clone(),
        ts: batch.ts,
        text: std::mem::take(run),
    });
}
