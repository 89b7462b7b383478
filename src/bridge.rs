//! The bidirectional relay between the connection and the UI runtime.
//!
//! The bridge owns one end of each UI channel and the connection's event
//! stream. Its run loop forwards every inbound server payload verbatim
//! into the update channel, and encodes every outbound [`UiCommand`] onto
//! the wire. Both paths are 1:1 and order-preserving; no state is held
//! between messages.
//!
//! The two paths are independent: the UI runtime closing its command side
//! does not stop inbound relay. The loop ends when the connection dies
//! (surfaced as [`BridgeError::ConnectionLost`]) or when the UI runtime
//! drops its update receiver (clean shutdown).

use tokio::sync::mpsc;

use crate::command::UiCommand;
use crate::error::BridgeError;
use crate::socket::{Connection, SocketEvent, SocketEvents, SocketSender};

/// The UI runtime's side of the channel pair.
///
/// The runtime reads server payloads from `update_rx` and emits user
/// commands into `command_tx`. Both are opaque typed conduits; the bridge
/// never inspects payload contents.
#[derive(Debug)]
pub struct UiHandle {
    /// Inbound conduit for server-originated state payloads.
    pub update_rx: mpsc::Receiver<String>,
    /// Outbound conduit for user-originated commands.
    pub command_tx: mpsc::Sender<UiCommand>,
}

/// The bridge's side of the channel pair.
#[derive(Debug)]
pub struct UiChannels {
    update_tx: mpsc::Sender<String>,
    command_rx: mpsc::Receiver<UiCommand>,
}

/// Build the channel pair connecting the bridge to the UI runtime.
pub fn ui_channels() -> (UiHandle, UiChannels) {
    let (update_tx, update_rx) = mpsc::channel(256);
    let (command_tx, command_rx) = mpsc::channel(64);

    (
        UiHandle {
            update_rx,
            command_tx,
        },
        UiChannels {
            update_tx,
            command_rx,
        },
    )
}

/// The relay between one [`Connection`] and one UI channel pair.
///
/// Constructed explicitly from the connection handles and the channel
/// endpoints; there is no ambient state beyond the connection guard.
#[derive(Debug)]
pub struct Bridge {
    events: SocketEvents,
    sender: SocketSender,
    update_tx: mpsc::Sender<String>,
    command_rx: mpsc::Receiver<UiCommand>,
}

impl Bridge {
    /// Wire a bridge to `connection`, claiming its inbound event stream.
    ///
    /// Returns [`BridgeError::EventsTaken`] if the stream was already
    /// claimed by an earlier bridge.
    pub fn new(connection: &mut Connection, channels: UiChannels) -> Result<Self, BridgeError> {
        let events = connection.take_events().ok_or(BridgeError::EventsTaken)?;

        Ok(Self {
            events,
            sender: connection.sender(),
            update_tx: channels.update_tx,
            command_rx: channels.command_rx,
        })
    }

    /// Run the relay until the connection dies or the UI runtime goes away.
    ///
    /// Returns `Ok(())` when the UI runtime drops its update receiver, and
    /// [`BridgeError::ConnectionLost`] with the close code when the
    /// connection terminates.
    pub async fn run(mut self) -> Result<(), BridgeError> {
        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(SocketEvent::Message(payload)) => {
                            log::trace!("[Bridge] Relaying {} byte update", payload.len());
                            if self.update_tx.send(payload).await.is_err() {
                                log::info!("[Bridge] Update receiver dropped, stopping");
                                return Ok(());
                            }
                        }
                        Some(SocketEvent::Closed { code, reason }) => {
                            log::warn!("[Bridge] Connection lost (code {})", code);
                            return Err(BridgeError::ConnectionLost { code, reason });
                        }
                        None => {
                            return Err(BridgeError::ConnectionLost {
                                code: 1006,
                                reason: "event stream ended".to_string(),
                            });
                        }
                    }
                }

                // Branch disables itself when the UI runtime closes its
                // command side; inbound relay keeps running.
                Some(command) = self.command_rx.recv() => {
                    let frame = command.encode();
                    log::debug!("[Bridge] Sending command frame {}", frame);
                    self.sender.send(&frame)?;
                }
            }
        }
    }
}
