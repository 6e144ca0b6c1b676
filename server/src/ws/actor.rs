use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};

use crate::ws::protocol;
use crate::ws::registry::{ConnectionHandle, ConnectionRegistry};

/// Server pings every 30 seconds so abruptly dropped peers are noticed and
/// removed from the registry.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// A ping left unanswered this long ends the connection.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code and reason sent when the peer stops answering pings.
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const PONG_TIMEOUT_REASON: &str = "Pong timeout";

/// Time the writer gets to flush queued frames once the reader has stopped.
const WRITER_GRACE: Duration = Duration::from_secs(1);

const KEEPALIVE_PAYLOAD: &[u8] = b"keepalive";

/// Why a connection's reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    ClientClosed,
    StreamEnded,
    ReceiveError,
    PongTimeout,
    WriterGone,
}

/// Run one admitted WebSocket until it disconnects.
///
/// The socket is split in two:
/// - an outbound task owns the sink and drains the connection's mpsc queue
/// - this task reads frames, applies named events to the registry and keeps
///   the connection alive with pings
///
/// The connection's [`ConnectionHandle`] wraps the queue sender, so the
/// delivery gateway can push to this client without touching the socket.
/// The connection only enters the registry once it sends `register`, and
/// leaves it as soon as the reader stops for any reason.
pub async fn run_connection(socket: WebSocket, registry: ConnectionRegistry) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let handle = ConnectionHandle::new(tx);
    let connection_id = handle.id();

    tracing::info!(connection_id = %connection_id, "WebSocket actor started");

    let mut outbound = tokio::spawn(forward_outbound(sink, rx));

    let reason = read_until_disconnect(&mut stream, &handle, &registry).await;

    if let Some(user_id) = registry.remove_by_handle(&handle) {
        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            reason = ?reason,
            "User disconnected"
        );
    }

    // With the registry's clone gone, dropping ours closes the queue once
    // any in-flight delivery finishes, and the outbound task drains and stops.
    drop(handle);
    finish_outbound(&mut outbound).await;

    tracing::info!(
        connection_id = %connection_id,
        reason = ?reason,
        "WebSocket actor stopped"
    );
}

async fn read_until_disconnect(
    stream: &mut SplitStream<WebSocket>,
    handle: &ConnectionHandle,
    registry: &ConnectionRegistry,
) -> Disconnect {
    let mut ping_timer = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pong_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    protocol::handle_text_message(text.as_str(), handle, registry);
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(
                        connection_id = %handle.id(),
                        bytes = data.len(),
                        "Ignoring binary frame"
                    );
                }
                Some(Ok(Message::Pong(_))) => pong_deadline = None,
                Some(Ok(Message::Ping(data))) => {
                    handle.send(Message::Pong(data));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(
                        connection_id = %handle.id(),
                        reason = ?frame,
                        "Client initiated close"
                    );
                    return Disconnect::ClientClosed;
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        connection_id = %handle.id(),
                        error = %e,
                        "WebSocket receive error"
                    );
                    return Disconnect::ReceiveError;
                }
                None => return Disconnect::StreamEnded,
            },
            _ = ping_timer.tick(), if pong_deadline.is_none() => {
                if !handle.send(Message::Ping(Bytes::from_static(KEEPALIVE_PAYLOAD))) {
                    return Disconnect::WriterGone;
                }
                pong_deadline = Some(Instant::now() + PONG_TIMEOUT);
            }
            _ = sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                tracing::warn!(connection_id = %handle.id(), "Pong timeout, closing connection");
                handle.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_GOING_AWAY,
                    reason: PONG_TIMEOUT_REASON.into(),
                })));
                return Disconnect::PongTimeout;
            }
        }
    }
}

/// Drain the outbound queue into the socket. Stops after forwarding a close
/// frame, when the socket rejects a write, or when every sender is dropped.
async fn forward_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = queue.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = sink.send(msg).await {
            tracing::debug!(error = %e, "WebSocket send failed");
            return;
        }
        if closing {
            return;
        }
    }
}

async fn finish_outbound(outbound: &mut JoinHandle<()>) {
    if timeout(WRITER_GRACE, &mut *outbound).await.is_err() {
        outbound.abort();
    }
}
