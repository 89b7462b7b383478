//! Connection manager: one persistent WebSocket per process.
//!
//! [`Connection::open`] performs the handshake and spawns a background I/O
//! task that owns both halves of the socket. Consumers interact through
//! two handles: a cloneable [`SocketSender`] for outbound text frames and
//! a take-once [`SocketEvents`] stream for inbound events.
//!
//! Inbound text frames are delivered in strict arrival order. The stream
//! ends with a single [`SocketEvent::Closed`] when the connection
//! terminates, whether by close frame, transport error, or EOF. There is
//! no reconnection: the connection is opened once and held for process
//! lifetime.
//!
//! At most one live connection exists per process, enforced by a
//! process-wide guard claimed in [`Connection::open`] and released when
//! the I/O task exits.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use crate::error::BridgeError;

/// Concrete WebSocket stream type (avoids repeating the generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Process-wide single-connection guard.
static CONNECTION_LIVE: AtomicBool = AtomicBool::new(false);

/// RAII claim on [`CONNECTION_LIVE`].
///
/// Created in [`Connection::open`] once the guard is claimed and moved
/// into the I/O task, so every exit path releases it: handshake errors,
/// normal loop exit, and cancellation of the task's future (runtime
/// shutdown, handle abort).
struct ConnectionClaim;

impl Drop for ConnectionClaim {
    fn drop(&mut self) {
        CONNECTION_LIVE.store(false, Ordering::SeqCst);
    }
}

/// Build the target WebSocket URL from a host and port.
///
/// Pure function: the same host and port always yield the same URL.
pub fn socket_url(host: &str, port: u16) -> String {
    format!("ws://{host}:{port}")
}

/// An event delivered by the connection's I/O task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// An inbound text frame, passed through opaquely.
    Message(String),
    /// The connection terminated. Delivered exactly once, last.
    Closed {
        /// WebSocket close code (1000 = normal, 1005 = no code, 1006 = abnormal).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Cloneable handle for writing text frames to the connection.
#[derive(Debug, Clone)]
pub struct SocketSender {
    frame_tx: mpsc::UnboundedSender<String>,
}

impl SocketSender {
    /// Queue a single text frame for transmission.
    ///
    /// Frames are written to the wire in the order they are sent here.
    /// Returns [`BridgeError::ConnectionClosed`] once the I/O task has
    /// exited, so writes after connection death fail loudly rather than
    /// disappearing.
    pub fn send(&self, payload: &str) -> Result<(), BridgeError> {
        self.frame_tx
            .send(payload.to_string())
            .map_err(|_| BridgeError::ConnectionClosed)
    }
}

/// The connection's inbound event stream.
///
/// Claimed at most once via [`Connection::take_events`]; events arrive in
/// strict transport order, ending with [`SocketEvent::Closed`].
#[derive(Debug)]
pub struct SocketEvents {
    event_rx: mpsc::Receiver<SocketEvent>,
}

impl SocketEvents {
    /// Receive the next event, returning `None` when the stream ends.
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        self.event_rx.recv().await
    }

    /// Try to receive the next event (non-blocking).
    pub fn try_recv(&mut self) -> Option<SocketEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// A live WebSocket connection to the simulation server.
#[derive(Debug)]
pub struct Connection {
    url: String,
    sender: SocketSender,
    events: Option<SocketEvents>,
    io_task: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Open a WebSocket connection to `url` and spawn its I/O task.
    ///
    /// Awaits handshake completion, so no send can be issued before the
    /// connection is open. Returns [`BridgeError::AlreadyConnected`] if a
    /// live connection already exists in this process; the guard is
    /// released when the connection dies (including cancellation of its
    /// I/O task), after which `open` may succeed again.
    pub async fn open(url: &str) -> Result<Self, BridgeError> {
        use tungstenite::client::IntoClientRequest;

        if CONNECTION_LIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BridgeError::AlreadyConnected);
        }
        let claim = ConnectionClaim;

        let request = match url.into_client_request() {
            Ok(req) => req,
            Err(e) => {
                return Err(BridgeError::InvalidAddress {
                    address: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        log::info!("[Socket] Connecting to {}", url);

        let ws_stream = match tokio_tungstenite::connect_async(request).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                log::error!("[Socket] Connection to {} failed: {}", url, e);
                return Err(BridgeError::ConnectFailed(e.to_string()));
            }
        };

        log::info!("[Socket] Connected to {}", url);

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(256);

        let io_task = tokio::spawn(run_io_task(claim, ws_stream, frame_rx, event_tx));

        Ok(Self {
            url: url.to_string(),
            sender: SocketSender { frame_tx },
            events: Some(SocketEvents { event_rx }),
            io_task,
        })
    }

    /// The URL this connection was opened against.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Claim the inbound event stream. Returns `None` once claimed.
    pub fn take_events(&mut self) -> Option<SocketEvents> {
        self.events.take()
    }

    /// A cloneable handle for writing frames to this connection.
    pub fn sender(&self) -> SocketSender {
        self.sender.clone()
    }

    /// Write a single text frame to the connection.
    pub fn send(&self, payload: &str) -> Result<(), BridgeError> {
        self.sender.send(payload)
    }

    /// Whether the connection's I/O task is still running.
    pub fn is_open(&self) -> bool {
        !self.io_task.is_finished()
    }

    /// Drop this handle's endpoints and wait for the I/O task to exit,
    /// releasing the single-connection claim.
    ///
    /// Production code holds the connection for process lifetime and
    /// never calls this; it exists for deterministic teardown between
    /// sequential consumers (tests). The caller must drop any
    /// [`SocketSender`] clones first or the I/O task will keep waiting
    /// on the outbound queue.
    pub async fn shutdown(self) {
        let Self {
            sender,
            events,
            io_task,
            ..
        } = self;
        drop(sender);
        drop(events);
        let _ = io_task.await;
    }
}

/// How the I/O message loop ended.
enum IoExit {
    /// The connection terminated; the close code and reason to surface.
    Closed { code: u16, reason: String },
    /// Every local handle was dropped; nobody is left to notify.
    ClientGone,
}

/// Background I/O task: runs the message loop, emits the terminal event,
/// then releases the single-connection claim.
async fn run_io_task(
    claim: ConnectionClaim,
    ws_stream: WsStream,
    mut frame_rx: mpsc::UnboundedReceiver<String>,
    event_tx: mpsc::Sender<SocketEvent>,
) {
    // Held for the task's whole lifetime; dropping the future (runtime
    // shutdown, abort) releases the claim too.
    let _claim = claim;

    let (mut ws_sink, mut ws_stream_rx) = ws_stream.split();

    let exit = run_message_loop(&mut ws_sink, &mut ws_stream_rx, &mut frame_rx, &event_tx).await;

    if let IoExit::Closed { code, reason } = exit {
        log::warn!("[Socket] Connection ended (code {}) {}", code, reason);
        let _ = event_tx.send(SocketEvent::Closed { code, reason }).await;
    }

    // The claim drops here, after the terminal event, so a reopened
    // connection cannot race ahead of the previous Closed delivery.
}

/// Inner message loop for the single WebSocket connection.
///
/// Multiplexes inbound frames and the outbound frame queue. Pings are
/// answered in-loop; binary frames are not part of the protocol and are
/// dropped with a log record. Returns when the connection is lost or all
/// local handles are gone.
async fn run_message_loop(
    ws_sink: &mut (impl futures_util::Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin),
    ws_stream_rx: &mut (impl futures_util::Stream<Item = Result<tungstenite::Message, tungstenite::Error>>
              + Unpin),
    frame_rx: &mut mpsc::UnboundedReceiver<String>,
    event_tx: &mpsc::Sender<SocketEvent>,
) -> IoExit {
    loop {
        tokio::select! {
            // Receive from WebSocket
            msg = ws_stream_rx.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        log::trace!("[Socket] Received {} byte frame", text.len());
                        if event_tx.send(SocketEvent::Message(text.to_string())).await.is_err() {
                            log::warn!("[Socket] Event receiver dropped, closing connection");
                            let _ = ws_sink.close().await;
                            return IoExit::ClientGone;
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        let _ = ws_sink.send(tungstenite::Message::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Binary(data))) => {
                        log::debug!("[Socket] Dropping {} byte binary frame", data.len());
                    }
                    Some(Ok(tungstenite::Message::Close(close_frame))) => {
                        let (code, reason) = close_frame
                            .map(|cf| (cf.code.into(), cf.reason.to_string()))
                            .unwrap_or((1005, String::new()));
                        log::info!("[Socket] Connection closed by server (code {})", code);
                        return IoExit::Closed { code, reason };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("[Socket] WebSocket error: {}", e);
                        return IoExit::Closed { code: 1006, reason: e.to_string() };
                    }
                    None => {
                        log::info!("[Socket] WebSocket stream ended");
                        return IoExit::Closed { code: 1006, reason: "stream ended".to_string() };
                    }
                }
            }

            // Drain the outbound frame queue
            frame = frame_rx.recv() => {
                match frame {
                    Some(text) => {
                        log::trace!("[Socket] Sending {} byte frame", text.len());
                        if let Err(e) = ws_sink.send(tungstenite::Message::Text(text)).await {
                            log::warn!("[Socket] Send failed: {}", e);
                            return IoExit::Closed { code: 1006, reason: e.to_string() };
                        }
                    }
                    None => {
                        // All sender handles dropped -- the connection's owner is gone.
                        let _ = ws_sink.close().await;
                        return IoExit::ClientGone;
                    }
                }
            }
        }
    }
}

/// Build a synthetic event stream for exercising consumers without a socket.
#[cfg(test)]
pub(crate) fn test_events(capacity: usize) -> (mpsc::Sender<SocketEvent>, SocketEvents) {
    let (event_tx, event_rx) = mpsc::channel(capacity);
    (event_tx, SocketEvents { event_rx })
}

/// Build a sender handle whose frames land in the returned receiver.
#[cfg(test)]
pub(crate) fn test_sender() -> (SocketSender, mpsc::UnboundedReceiver<String>) {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    (SocketSender { frame_tx }, frame_rx)
}
