//! Startup configuration for the bridge.
//!
//! The target address is always injected: defaults, then environment
//! variables (`BOIDLINK_HOST`, `BOIDLINK_PORT`), then explicit overrides
//! from the caller (CLI flags). The crate never derives the host itself.

use serde::{Deserialize, Serialize};

/// Default target host (loopback, matching a local simulation server).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default target port for the simulation server.
pub const DEFAULT_PORT: u16 = 3435;

/// Resolved bridge configuration: where to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Target host name or IP address.
    pub host: String,
    /// Target port.
    pub port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl BridgeConfig {
    /// Load configuration: defaults overridden by environment variables.
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply explicit overrides (highest precedence, e.g. CLI flags).
    #[must_use]
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    /// The `ws://<host>:<port>` URL this configuration points at.
    pub fn url(&self) -> String {
        crate::socket::socket_url(&self.host, self.port)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("BOIDLINK_HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("BOIDLINK_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => {
                    log::warn!(
                        "Ignoring invalid BOIDLINK_PORT '{}', using {}",
                        port,
                        self.port
                    );
                }
            }
        }
    }
}
