//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so a partial
//! `settings.json` only needs the keys it overrides.

use ecotrack_core::audience::DEFAULT_ADMIN_PREFIX;
use ecotrack_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EcotrackSettings {
    /// HTTP / WebSocket listener settings.
    pub server: ServerSettings,
    /// Routing, queueing, and publisher settings.
    pub hub: HubSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl EcotrackSettings {
    /// Reject values that would make the hub unusable.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool); 7] = [
            ("server.maxConnections", self.server.max_connections > 0),
            ("server.maxMessageSize", self.server.max_message_size > 0),
            ("server.heartbeatIntervalSecs", self.server.heartbeat_interval_secs > 0),
            (
                "server.heartbeatTimeoutSecs",
                self.server.heartbeat_timeout_secs >= self.server.heartbeat_interval_secs,
            ),
            ("hub.statsIntervalMs", self.hub.stats_interval_ms > 0),
            ("hub.sendQueueCapacity", self.hub.send_queue_capacity > 0),
            ("hub.eventQueueCapacity", self.hub.event_queue_capacity > 0),
        ];
        match checks.iter().find(|(_, ok)| !ok) {
            Some((key, _)) => Err(SettingsError::InvalidValue(format!("{key} is out of range"))),
            None => Ok(()),
        }
    }
}

/// Network settings for the HTTP / WebSocket listener.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval between server Ping frames.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client silent for longer than this.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_connections: 1_000,
            max_message_size: 64 * 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
        }
    }
}

/// Hub routing and background task settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Id prefix that marks an administrative client when no role is claimed.
    pub admin_prefix: String,
    /// Period of the synthetic analytics publisher, in milliseconds.
    pub stats_interval_ms: u64,
    /// Per-connection outbound queue capacity.
    pub send_queue_capacity: usize,
    /// Lifetime dropped messages after which a slow client is pruned.
    pub max_send_drops: u64,
    /// Capacity of the collaborator event queue (oldest dropped when full).
    pub event_queue_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
            stats_interval_ms: 5_000,
            send_queue_capacity: 256,
            max_send_drops: 100,
            event_queue_capacity: 1_024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Line format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
