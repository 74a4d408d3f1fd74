use adk_client::{BusApi, FeedConnection, FeedNotice, ReplayFilters, Subscription};
use adk_events::KindPattern;
use adk_feed::{ConnectionStatus, DisplayRecord, FeedStore};
use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "adk-tail", about = "Tail a bus subscription as display records")]
struct Args {
    /// WebSocket subscribe endpoint, e.g. ws://localhost:4070/subscribe
    #[arg(long)]
    url: String,
    /// HTTP API base for replay; derived from --url when omitted
    #[arg(long, default_value = "")]
    api_url: String,
    #[arg(long, env = "ADK_TOKEN", default_value = "")]
    token: String,
    /// Kind pattern, repeatable; empty subscribes to every kind
    #[arg(long = "kind")]
    kinds: Vec<String>,
    #[arg(long, default_value = "")]
    agent: String,
    #[arg(long, default_value = "")]
    task: String,
    /// Starting cursor for replay + live catch-up
    #[arg(long)]
    since: Option<u64>,
    /// Page size for the HTTP backfill
    #[arg(long, default_value_t = 500)]
    limit: usize,
    /// Skip the HTTP backfill and rely on in-stream replay only
    #[arg(long, default_value_t = false)]
    no_backfill: bool,
    /// Emit records as JSON lines instead of text
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.token.is_empty() {
        bail!("missing auth token (pass --token or set ADK_TOKEN)");
    }

    let ws_url = Url::parse(&args.url).context("invalid --url")?;
    let api_url = if args.api_url.is_empty() {
        derive_api_url(&ws_url)?
    } else {
        Url::parse(&args.api_url).context("invalid --api-url")?
    };

    let mut kinds = Vec::new();
    for raw in &args.kinds {
        let pattern: KindPattern = raw
            .parse()
            .map_err(|err| anyhow::anyhow!("bad --kind {raw}: {err}"))?;
        kinds.push(pattern);
    }
    let agent_id = (!args.agent.is_empty()).then(|| args.agent.clone());
    let task_id = (!args.task.is_empty()).then(|| args.task.clone());

    let mut subscription = Subscription::new(ws_url, args.token.clone());
    subscription.kinds = kinds.clone();
    subscription.since = args.since;
    subscription.agent_id = agent_id.clone();
    subscription.task_id = task_id.clone();

    let mut store = FeedStore::new();
    let mut printed: Vec<String> = Vec::new();

    if args.no_backfill {
        store.backfill_done();
    } else {
        let api = BusApi::new(api_url, args.token.clone());
        let filters = ReplayFilters {
            kinds,
            agent_id,
            task_id,
        };
        let since = args.since.unwrap_or(0);
        let events = api
            .fetch_all(since, &filters, args.limit)
            .await
            .context("backfill failed")?;
        info!("backfill_loaded: events={}", events.len());
        store.ingest_backfill(events);
        store.backfill_done();
        flush_records(&store, &mut printed, args.json);
    }

    let mut handle = FeedConnection::open(subscription);
    loop {
        tokio::select! {
            maybe_notice = handle.next() => {
                let Some(notice) = maybe_notice else {
                    break;
                };
                let fatal = matches!(
                    notice,
                    FeedNotice::Disconnected { fatal: true, .. }
                );
                match notice {
                    FeedNotice::Connected => {
                        store.mark_connected();
                        info!("feed_connected");
                    }
                    FeedNotice::Event(event) => store.apply_live_event(event),
                    FeedNotice::ReplayComplete => {
                        store.mark_replay_complete();
                        if store.is_loaded() {
                            info!("feed_loaded: head={:?}", store.head_cursor());
                        }
                    }
                    FeedNotice::StreamError { code, message } => {
                        warn!("feed_stream_error: code={code} message={message}");
                        store.note_stream_error(&code, &message);
                    }
                    FeedNotice::Disconnected { fatal, reason } => {
                        store.mark_disconnected(fatal, reason);
                        if !fatal {
                            info!("feed_reconnecting");
                        }
                    }
                }
                flush_records(&store, &mut printed, args.json);
                if fatal {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("feed_interrupted");
                handle.close().await;
                return Ok(());
            }
        }
    }

    if store.status() == ConnectionStatus::Fatal {
        bail!(
            "feed disconnected: {}",
            store.last_error().unwrap_or("attempts exhausted")
        );
    }
    Ok(())
}

/// Swap the WebSocket endpoint for the sibling HTTP base, keeping host and
/// port: ws://host:4070/subscribe -> http://host:4070/
fn derive_api_url(ws: &Url) -> Result<Url> {
    let mut api = ws.clone();
    let scheme = match ws.scheme() {
        "ws" => "http",
        "wss" => "https",
        other => bail!("cannot derive an API base from scheme {other}"),
    };
    api.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("cannot derive an API base from {ws}"))?;
    api.set_path("/");
    api.set_query(None);
    Ok(api)
}

/// Print records added since the last flush, and reprint any earlier record
/// a later event refined in place.
fn flush_records(store: &FeedStore, printed: &mut Vec<String>, json: bool) {
    let records = store.records();
    for (index, record) in records.iter().enumerate() {
        let line = render_record(record, json);
        if index >= printed.len() {
            println!("+ {line}");
            printed.push(line);
        } else if printed[index] != line {
            println!("~ {line}");
            printed[index] = line;
        }
    }
}

fn render_record(record: &DisplayRecord, json: bool) -> String {
    if json {
        return serde_json::to_string(record).unwrap_or_else(|err| format!("<encode error: {err}>"));
    }
    match record {
        DisplayRecord::Text { cursor, text, .. } => format!("[{cursor}] {text}"),
        DisplayRecord::Plan { cursor, entries, .. } => {
            let steps: Vec<&str> = entries.iter().map(|entry| entry.content.as_str()).collect();
            format!("[{cursor}] plan: {}", steps.join(" | "))
        }
        DisplayRecord::ToolCall { cursor, call } => format!(
            "[{cursor}] tool {} ({}) {}",
            call.id,
            call.status.as_str(),
            call.title
        ),
        DisplayRecord::Permission { cursor, record } => {
            let state = match record.outcome() {
                Some(outcome) => match outcome.selected_option_id() {
                    Some(option) => format!("answered:{option}"),
                    None => "cancelled".to_string(),
                },
                None => "pending".to_string(),
            };
            format!(
                "[{cursor}] permission {} {} ({state})",
                record.key.request_id, record.tool_call.title
            )
        }
        DisplayRecord::System { cursor, subtype, .. } => format!("[{cursor}] system {subtype}"),
        DisplayRecord::Raw { cursor, text, .. } => format!("[{cursor}] raw {text}"),
    }
}
