//! Inbound routing and per-audience fan-out.

use std::sync::Arc;
use std::time::Duration;

use ecotrack_core::{
    Audience, DEFAULT_ADMIN_PREFIX, Identity, InboundMessage, OutboundMessage, Role,
};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::{ClientConnection, SendOutcome};
use crate::events::Target;
use crate::metrics::{
    HUB_CONNECTIONS_EVICTED_TOTAL, HUB_CONNECTIONS_PRUNED_TOTAL, HUB_INBOUND_MALFORMED_TOTAL,
    HUB_MESSAGES_DELIVERED_TOTAL, HUB_SEND_DROPS_TOTAL,
};
use crate::registry::ConnectionRegistry;

/// Hub tuning.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Id prefix classifying a client as admin when it claims no role.
    pub admin_prefix: String,
    /// Per-connection outbound queue capacity.
    pub send_queue_capacity: usize,
    /// Lifetime drops after which a slow connection is pruned.
    pub max_send_drops: u64,
    /// Analytics publisher period.
    pub stats_interval: Duration,
    /// Collaborator event queue capacity.
    pub event_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
            send_queue_capacity: 256,
            max_send_drops: 100,
            stats_interval: Duration::from_secs(5),
            event_queue_capacity: 1_024,
        }
    }
}

/// Per-call delivery summary. Failures never surface as errors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Connections in the target snapshot.
    pub recipients: usize,
    /// Messages queued.
    pub delivered: usize,
    /// Messages dropped on a full queue.
    pub dropped: usize,
    /// Connections removed from the registry during this call.
    pub pruned: usize,
}

/// What [`BroadcastHub::dispatch_inbound`] did with a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A `location_update` re-broadcast as `tracking`.
    Tracking(FanoutReport),
    /// A `ping` answered; `delivered` is whether the `pong` was queued.
    Pong {
        /// Whether the reply reached the sender's queue.
        delivered: bool,
    },
    /// Not JSON, no `type`, or a known type with a bad payload.
    Malformed,
    /// Well-formed frame of a type the hub does not handle.
    Ignored,
}

enum Delivery {
    Delivered,
    Dropped,
    Pruned,
    Skipped,
}

/// Routes frames between connections and audiences.
pub struct BroadcastHub {
    registry: ConnectionRegistry,
    config: HubConfig,
}

impl BroadcastHub {
    /// Create a hub with an empty registry.
    pub fn new(config: HubConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            config,
        }
    }

    /// Hub tuning.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// The underlying registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Resolve a handshake's identity using the configured admin prefix.
    pub fn identify(
        &self,
        id: impl Into<String>,
        role_claim: Option<&str>,
    ) -> Result<Identity, ecotrack_core::audience::UnknownRole> {
        Identity::from_claim(id, role_claim, &self.config.admin_prefix)
    }

    /// Register a new connection and mark it open.
    ///
    /// Returns the connection and the receiving half of its outbound queue,
    /// which the caller's writer task must own. A previous connection with
    /// the same id is closed.
    pub fn connect(
        &self,
        identity: Identity,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(self.config.send_queue_capacity.max(1));
        let registered = self.registry.register(identity, tx);
        let connection = registered.connection;

        if let Some(evicted) = registered.evicted {
            info!(client_id = %evicted.id, "replacing existing connection with same id");
            counter!(HUB_CONNECTIONS_EVICTED_TOTAL).increment(1);
            evicted.begin_close();
        }

        let _ = connection.mark_open();
        debug!(
            client_id = %connection.id,
            role = %connection.role,
            audience = %connection.audience,
            "connection registered"
        );
        (connection, rx)
    }

    /// Unregister a finished session and mark it closed.
    ///
    /// Returns `true` if the registry still held this connection.
    pub fn disconnect(&self, connection: &Arc<ClientConnection>) -> bool {
        let removed = self.registry.unregister(connection);
        connection.mark_closed();
        removed
    }

    /// Handle one inbound text frame from `connection`.
    pub fn dispatch_inbound(&self, connection: &Arc<ClientConnection>, raw: &str) -> DispatchOutcome {
        let message = match InboundMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!(client_id = %connection.id, error = %e, "dropping malformed frame");
                counter!(HUB_INBOUND_MALFORMED_TOTAL).increment(1);
                return DispatchOutcome::Malformed;
            }
        };

        match message {
            InboundMessage::LocationUpdate { location } => {
                let tracking = OutboundMessage::Tracking {
                    driver_id: connection.id.clone(),
                    location,
                };
                DispatchOutcome::Tracking(self.broadcast_to_operational(&tracking))
            }
            InboundMessage::Ping => {
                let delivered = match encode(&OutboundMessage::Pong) {
                    Some(json) => matches!(
                        self.deliver(connection, json, "pong"),
                        Delivery::Delivered
                    ),
                    None => false,
                };
                DispatchOutcome::Pong { delivered }
            }
            InboundMessage::Unknown => {
                debug!(client_id = %connection.id, "ignoring frame of unknown type");
                DispatchOutcome::Ignored
            }
        }
    }

    /// Directed send to one operational connection. A miss is a no-op.
    pub fn send_to(&self, id: &str, message: &OutboundMessage) -> bool {
        let Some(connection) = self.registry.lookup_operational(id) else {
            debug!(client_id = id, kind = message.kind(), "send_to: no such connection");
            return false;
        };
        let Some(json) = encode(message) else {
            return false;
        };
        matches!(
            self.deliver(&connection, json, message.kind()),
            Delivery::Delivered
        )
    }

    /// Fan out to every administrative connection.
    pub fn broadcast_to_admins(&self, message: &OutboundMessage) -> FanoutReport {
        self.broadcast(Target::Administrative, message)
    }

    /// Fan out to every operational connection.
    pub fn broadcast_to_operational(&self, message: &OutboundMessage) -> FanoutReport {
        self.broadcast(Target::Operational, message)
    }

    /// Fan out to the connections that joined with `role`.
    pub fn broadcast_to_role(&self, role: Role, message: &OutboundMessage) -> FanoutReport {
        self.broadcast(Target::Role(role), message)
    }

    /// Fan out to every connection in both audiences.
    pub fn broadcast_all(&self, message: &OutboundMessage) -> FanoutReport {
        self.broadcast(Target::All, message)
    }

    /// Fan out to `target`, attempting each send independently.
    pub fn broadcast(&self, target: Target, message: &OutboundMessage) -> FanoutReport {
        let connections = match target {
            Target::Administrative => self.registry.audience_connections(Audience::Administrative),
            Target::Operational => self.registry.audience_connections(Audience::Operational),
            Target::All => self.registry.all_connections(),
            Target::Role(role) => self.registry.role_connections(role),
        };

        let mut report = FanoutReport {
            recipients: connections.len(),
            ..FanoutReport::default()
        };
        if connections.is_empty() {
            debug!(kind = message.kind(), ?target, "broadcast: no recipients");
            return report;
        }
        let Some(json) = encode(message) else {
            return report;
        };

        for connection in &connections {
            match self.deliver(connection, Arc::clone(&json), message.kind()) {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Dropped => report.dropped += 1,
                Delivery::Pruned => report.pruned += 1,
                Delivery::Skipped => {}
            }
        }

        debug!(
            kind = message.kind(),
            ?target,
            recipients = report.recipients,
            delivered = report.delivered,
            dropped = report.dropped,
            pruned = report.pruned,
            "broadcast"
        );
        report
    }

    /// One send with the failure policy applied: a closed queue prunes at
    /// once, a full queue prunes after `max_send_drops` lifetime drops.
    fn deliver(
        &self,
        connection: &Arc<ClientConnection>,
        json: Arc<String>,
        kind: &'static str,
    ) -> Delivery {
        match connection.send(json) {
            SendOutcome::Delivered => {
                counter!(HUB_MESSAGES_DELIVERED_TOTAL, "type" => kind).increment(1);
                Delivery::Delivered
            }
            SendOutcome::Full => {
                counter!(HUB_SEND_DROPS_TOTAL, "type" => kind).increment(1);
                let drops = connection.drop_count();
                if drops >= self.config.max_send_drops {
                    warn!(
                        client_id = %connection.id,
                        drops,
                        "client too slow, disconnecting"
                    );
                    self.prune(connection, "slow");
                    Delivery::Pruned
                } else {
                    Delivery::Dropped
                }
            }
            SendOutcome::Closed => {
                warn!(client_id = %connection.id, kind, "send failed: connection closed");
                self.prune(connection, "closed");
                Delivery::Pruned
            }
            SendOutcome::NotOpen => Delivery::Skipped,
        }
    }

    fn prune(&self, connection: &Arc<ClientConnection>, reason: &'static str) {
        if self.registry.unregister(connection) {
            counter!(HUB_CONNECTIONS_PRUNED_TOTAL, "reason" => reason).increment(1);
        }
        connection.begin_close();
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

fn encode(message: &OutboundMessage) -> Option<Arc<String>> {
    match message.to_json() {
        Ok(json) => Some(Arc::new(json)),
        Err(e) => {
            warn!(kind = message.kind(), error = %e, "failed to serialize message");
            None
        }
    }
}
