//! Server configuration.

use std::time::Duration;

use ecotrack_hub::HubConfig;
use ecotrack_settings::EcotrackSettings;

/// Configuration for the EcoTrack server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client silent for longer than this many seconds.
    pub heartbeat_timeout_secs: u64,
    /// Hub routing and background task tuning.
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1_000,
            max_message_size: 64 * 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &EcotrackSettings) -> Self {
        let server = &settings.server;
        let hub = &settings.hub;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            max_message_size: server.max_message_size,
            heartbeat_interval_secs: server.heartbeat_interval_secs,
            heartbeat_timeout_secs: server.heartbeat_timeout_secs,
            hub: HubConfig {
                admin_prefix: hub.admin_prefix.clone(),
                send_queue_capacity: hub.send_queue_capacity,
                max_send_drops: hub.max_send_drops,
                stats_interval: Duration::from_millis(hub.stats_interval_ms),
                event_queue_capacity: hub.event_queue_capacity,
            },
        }
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Interval between server Ping frames.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Silence after which a client is disconnected.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_auto_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn default_heartbeat() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn from_settings_copies_every_field() {
        let mut settings = EcotrackSettings::default();
        settings.server.host = "0.0.0.0".into();
        settings.server.port = 8080;
        settings.server.max_connections = 7;
        settings.hub.admin_prefix = "ops_".into();
        settings.hub.stats_interval_ms = 250;
        settings.hub.send_queue_capacity = 4;
        settings.hub.max_send_drops = 9;
        settings.hub.event_queue_capacity = 32;

        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.max_connections, 7);
        assert_eq!(cfg.hub.admin_prefix, "ops_");
        assert_eq!(cfg.hub.stats_interval, Duration::from_millis(250));
        assert_eq!(cfg.hub.send_queue_capacity, 4);
        assert_eq!(cfg.hub.max_send_drops, 9);
        assert_eq!(cfg.hub.event_queue_capacity, 32);
    }

    #[test]
    fn default_settings_match_default_hub() {
        let cfg = ServerConfig::from_settings(&EcotrackSettings::default());
        let hub = HubConfig::default();
        assert_eq!(cfg.hub.admin_prefix, hub.admin_prefix);
        assert_eq!(cfg.hub.stats_interval, hub.stats_interval);
        assert_eq!(cfg.hub.send_queue_capacity, hub.send_queue_capacity);
        assert_eq!(cfg.port, 8000);
    }
}
