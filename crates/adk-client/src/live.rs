use adk_events::pattern::KindPattern;
use adk_events::wire::{ClientFrame, ServerFrame, ERROR_CODE_UNAUTHORIZED};
use adk_events::Event;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::Subscription;

const NOTICE_CHANNEL_CAPACITY: usize = 256;
const COMMAND_CHANNEL_CAPACITY: usize = 8;
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const BASE_DELAY_SECS: u64 = 1;
const MAX_DELAY_SECS: u64 = 30;

/// Backoff for the given zero-based attempt: 1s, 2s, 4s, 8s, 16s, 30s, 30s.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let secs = BASE_DELAY_SECS << attempt.min(6);
    Duration::from_secs(secs.min(MAX_DELAY_SECS))
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectLimits {
    /// Reconnect attempts tolerated before the connection gives up and
    /// reports a fatal disconnect.
    pub max_attempts: u32,
}

impl Default for ConnectLimits {
    fn default() -> Self {
        Self { max_attempts: 8 }
    }
}

/// Everything a live connection reports, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedNotice {
    Connected,
    Event(Event),
    /// History for the requested starting cursor is done; the feed is live.
    ReplayComplete,
    /// Non-fatal error frame from the bus. The stream keeps running.
    StreamError { code: String, message: String },
    /// `fatal` means the connection stopped retrying (auth rejection or
    /// attempts exhausted). Accumulated caller state stays valid.
    Disconnected { fatal: bool, reason: Option<String> },
}

#[derive(Debug)]
enum FeedCommand {
    Reconnect,
    Close,
}

enum SessionExit {
    /// Transport dropped or errored outside our control.
    Dropped(Option<String>),
    /// Auth rejected by the bus; retrying cannot help.
    AuthRejected(String),
    ReconnectNow,
    Closed,
}

pub struct FeedConnection;

impl FeedConnection {
    pub fn open(subscription: Subscription) -> FeedHandle {
        Self::open_with_limits(subscription, ConnectLimits::default())
    }

    pub fn open_with_limits(subscription: Subscription, limits: ConnectLimits) -> FeedHandle {
        let (notice_tx, notice_rx) = mpsc::channel(NOTICE_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let task = tokio::spawn(run(subscription, limits, notice_tx, command_rx));
        FeedHandle {
            notices: notice_rx,
            commands: command_tx,
            task,
        }
    }
}

/// Handle to one live connection. Dropping it (or calling [`close`]) tears
/// the transport down; no notices are delivered afterwards.
///
/// [`close`]: FeedHandle::close
pub struct FeedHandle {
    notices: mpsc::Receiver<FeedNotice>,
    commands: mpsc::Sender<FeedCommand>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub async fn next(&mut self) -> Option<FeedNotice> {
        self.notices.recv().await
    }

    /// Retry immediately, resetting the attempt counter, regardless of any
    /// backoff sleep in progress.
    pub fn reconnect_now(&self) {
        let _ = self.commands.try_send(FeedCommand::Reconnect);
    }

    /// Tear down the transport and cancel any pending reconnect timer.
    pub async fn close(mut self) {
        let _ = self.commands.send(FeedCommand::Close).await;
        if tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
        }
    }
}

async fn run(
    subscription: Subscription,
    limits: ConnectLimits,
    tx: mpsc::Sender<FeedNotice>,
    mut commands: mpsc::Receiver<FeedCommand>,
) {
    let client_id = Uuid::new_v4().to_string();
    let mut attempt: u32 = 0;

    loop {
        let exit = match connect_async(subscription.socket_url()).await {
            Ok((socket, _response)) => {
                pump_session(socket, &subscription, &client_id, &tx, &mut commands, &mut attempt)
                    .await
            }
            Err(err) => {
                warn!("feed_connect_error: {err}");
                SessionExit::Dropped(Some(err.to_string()))
            }
        };

        match exit {
            SessionExit::Closed => return,
            SessionExit::AuthRejected(message) => {
                let _ = tx
                    .send(FeedNotice::Disconnected {
                        fatal: true,
                        reason: Some(message),
                    })
                    .await;
                return;
            }
            SessionExit::ReconnectNow => {
                attempt = 0;
                continue;
            }
            SessionExit::Dropped(reason) => {
                let delay = reconnect_delay(attempt);
                attempt += 1;
                if attempt > limits.max_attempts {
                    let _ = tx
                        .send(FeedNotice::Disconnected {
                            fatal: true,
                            reason,
                        })
                        .await;
                    return;
                }
                debug!(
                    "feed_reconnect_scheduled: attempt={attempt} delay_secs={}",
                    delay.as_secs()
                );
                match wait_backoff(delay, &mut commands).await {
                    Some(SessionExit::Closed) => return,
                    Some(SessionExit::ReconnectNow) => attempt = 0,
                    _ => {}
                }
            }
        }
    }
}

/// Pump one established socket until it drops, errors, or a command ends it.
async fn pump_session(
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    subscription: &Subscription,
    client_id: &str,
    tx: &mpsc::Sender<FeedNotice>,
    commands: &mut mpsc::Receiver<FeedCommand>,
    attempt: &mut u32,
) -> SessionExit {
    let (mut sink, mut stream) = socket.split();

    let subscribe = ClientFrame::Subscribe {
        client_id: client_id.to_string(),
        kinds: subscription
            .kinds
            .iter()
            .map(KindPattern::as_str)
            .map(str::to_string)
            .collect(),
        since: subscription.since,
        agent_id: subscription.agent_id.clone(),
        task_id: subscription.task_id.clone(),
    };
    let encoded = match subscribe.encode() {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!("feed_subscribe_encode_error: {err}");
            return SessionExit::Dropped(Some(err.to_string()));
        }
    };
    if sink.send(Message::Text(encoded)).await.is_err() {
        return SessionExit::Dropped(Some("subscribe send failed".to_string()));
    }

    let mut session_connected = false;
    let exit = loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    None => break SessionExit::Dropped(Some("stream closed".to_string())),
                    Some(Err(err)) => {
                        warn!("feed_read_error: {err}");
                        break SessionExit::Dropped(Some(err.to_string()));
                    }
                    Some(Ok(Message::Text(text))) => {
                        match ServerFrame::decode(&text) {
                            Ok(ServerFrame::Subscribed { last_cursor }) => {
                                debug!("feed_subscribed: last_cursor={last_cursor:?}");
                                *attempt = 0;
                                session_connected = true;
                                if tx.send(FeedNotice::Connected).await.is_err() {
                                    break SessionExit::Closed;
                                }
                            }
                            Ok(ServerFrame::Event { event }) => {
                                if tx.send(FeedNotice::Event(event)).await.is_err() {
                                    break SessionExit::Closed;
                                }
                            }
                            Ok(ServerFrame::ReplayComplete) => {
                                if tx.send(FeedNotice::ReplayComplete).await.is_err() {
                                    break SessionExit::Closed;
                                }
                            }
                            Ok(ServerFrame::Ping) => {
                                match ClientFrame::Pong.encode() {
                                    Ok(pong) => {
                                        let _ = sink.send(Message::Text(pong)).await;
                                    }
                                    Err(err) => warn!("feed_pong_encode_error: {err}"),
                                }
                            }
                            Ok(ServerFrame::Error { code, message }) => {
                                if code == ERROR_CODE_UNAUTHORIZED {
                                    let _ = sink.close().await;
                                    break SessionExit::AuthRejected(message);
                                }
                                warn!("feed_stream_error: code={code} message={message}");
                                if tx
                                    .send(FeedNotice::StreamError { code, message })
                                    .await
                                    .is_err()
                                {
                                    break SessionExit::Closed;
                                }
                            }
                            Ok(ServerFrame::Unknown) => {
                                debug!("feed_unknown_frame: {text}");
                            }
                            Err(err) => {
                                // One undecodable frame must not break the
                                // cursor stream behind it.
                                warn!("feed_decode_error: {err}");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        break SessionExit::Dropped(Some("close frame".to_string()));
                    }
                    Some(Ok(_)) => {}
                }
            }
            command = commands.recv() => {
                match command {
                    Some(FeedCommand::Reconnect) => {
                        let _ = sink.close().await;
                        break SessionExit::ReconnectNow;
                    }
                    Some(FeedCommand::Close) | None => {
                        let _ = sink.close().await;
                        break SessionExit::Closed;
                    }
                }
            }
        }
    };

    if session_connected {
        if let SessionExit::Dropped(reason) = &exit {
            let _ = tx
                .send(FeedNotice::Disconnected {
                    fatal: false,
                    reason: reason.clone(),
                })
                .await;
        }
    }
    exit
}

/// Sleep out the backoff unless a command interrupts it. `None` means the
/// delay elapsed and the next attempt should proceed.
async fn wait_backoff(
    delay: Duration,
    commands: &mut mpsc::Receiver<FeedCommand>,
) -> Option<SessionExit> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => None,
        command = commands.recv() => match command {
            Some(FeedCommand::Reconnect) => Some(SessionExit::ReconnectNow),
            Some(FeedCommand::Close) | None => Some(SessionExit::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn reconnect_delay_doubles_then_caps() {
        let delays: Vec<u64> = (0..=6).map(|a| reconnect_delay(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(reconnect_delay(20).as_secs(), 30);
    }

    fn unreachable_subscription() -> Subscription {
        // Port 1 refuses immediately; no server involved.
        Subscription::new(Url::parse("ws://127.0.0.1:1/subscribe").unwrap(), "t")
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_a_fatal_disconnect() {
        let mut handle = FeedConnection::open_with_limits(
            unreachable_subscription(),
            ConnectLimits { max_attempts: 0 },
        );
        match handle.next().await {
            Some(FeedNotice::Disconnected { fatal: true, .. }) => {}
            other => panic!("expected fatal disconnect, got {other:?}"),
        }
        assert!(handle.next().await.is_none());
    }

    #[tokio::test]
    async fn close_cancels_a_pending_backoff() {
        let handle = FeedConnection::open_with_limits(
            unreachable_subscription(),
            ConnectLimits { max_attempts: 100 },
        );
        // First dial fails instantly; the task is now sleeping its backoff.
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_secs(5), handle.close())
            .await
            .expect("close should cancel the reconnect timer promptly");
    }
}
