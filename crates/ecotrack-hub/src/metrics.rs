//! Metric names shared by the hub and the server.

/// WebSocket connections opened total (counter, labels: audience).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: audience).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Messages queued to a client total (counter, labels: type).
pub const HUB_MESSAGES_DELIVERED_TOTAL: &str = "hub_messages_delivered_total";
/// Messages dropped on a full client queue total (counter, labels: type).
pub const HUB_SEND_DROPS_TOTAL: &str = "hub_send_drops_total";
/// Connections removed after a failed send total (counter, labels: reason).
pub const HUB_CONNECTIONS_PRUNED_TOTAL: &str = "hub_connections_pruned_total";
/// Connections replaced by a newer one with the same id total (counter).
pub const HUB_CONNECTIONS_EVICTED_TOTAL: &str = "hub_connections_evicted_total";
/// Unparseable inbound frames total (counter).
pub const HUB_INBOUND_MALFORMED_TOTAL: &str = "hub_inbound_malformed_total";
/// Collaborator events lost to queue overflow total (counter).
pub const HUB_EVENTS_LAGGED_TOTAL: &str = "hub_events_lagged_total";
/// Analytics snapshots published total (counter).
pub const HUB_STATS_PUBLISHED_TOTAL: &str = "hub_stats_published_total";
