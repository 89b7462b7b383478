//! Error types for connection and bridge failures.

/// Errors that can occur while opening, using, or losing the connection.
#[derive(Debug)]
pub enum BridgeError {
    /// The target address failed WebSocket request validation.
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Why validation failed.
        reason: String,
    },
    /// A live connection already exists in this process.
    AlreadyConnected,
    /// The WebSocket handshake failed.
    ConnectFailed(String),
    /// An outbound write was attempted after the connection ended.
    ConnectionClosed,
    /// The connection was lost mid-session.
    ConnectionLost {
        /// WebSocket close code (1000 = normal, 1005 = no code, 1006 = abnormal).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
    /// The inbound event stream was already claimed.
    EventsTaken,
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress { address, reason } => {
                write!(f, "Invalid address '{address}': {reason}")
            }
            Self::AlreadyConnected => {
                write!(f, "A live connection already exists in this process")
            }
            Self::ConnectFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::ConnectionLost { code, reason } => {
                if reason.is_empty() {
                    write!(f, "Connection lost (code {code})")
                } else {
                    write!(f, "Connection lost (code {code}): {reason}")
                }
            }
            Self::EventsTaken => write!(f, "Inbound event stream already claimed"),
        }
    }
}

impl std::error::Error for BridgeError {}
