//! Collaborator event queue.
//!
//! Request handlers outside the hub (pickup requests, admin announcements)
//! hand messages to an [`EventSender`] and return immediately. The queue is a
//! bounded `tokio::sync::broadcast` channel, so a burst beyond its capacity
//! overwrites the oldest events instead of blocking the producer. A single
//! pump task drains it into the hub.

use std::sync::Arc;

use ecotrack_core::{Announcement, Location, OutboundMessage, PickupNotice, Role};
use metrics::counter;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hub::BroadcastHub;
use crate::metrics::HUB_EVENTS_LAGGED_TOTAL;

/// Which connections a broadcast addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// Administrators only.
    Administrative,
    /// Citizens and collectors.
    Operational,
    /// Every connection.
    All,
    /// Only connections that joined with this role.
    Role(Role),
}

impl Target {
    /// Audience for an announcement's `target_role`.
    ///
    /// `None` (or `all`) addresses everyone. A citizen or collector target
    /// reaches that role alone.
    pub fn for_role(role: Option<Role>) -> Self {
        match role {
            None => Self::All,
            Some(Role::Admin) => Self::Administrative,
            Some(role) => Self::Role(role),
        }
    }
}

/// A message waiting to be fanned out.
#[derive(Clone, Debug)]
pub struct HubEvent {
    /// Audience to address.
    pub target: Target,
    /// Frame to send.
    pub message: OutboundMessage,
}

/// Producer handle. Cheap to clone; never blocks.
#[derive(Clone)]
pub struct EventSender {
    tx: broadcast::Sender<HubEvent>,
}

/// Consumer half, owned by [`run_event_pump`].
pub struct EventReceiver {
    rx: broadcast::Receiver<HubEvent>,
}

/// Create a queue holding at most `capacity` pending events.
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = broadcast::channel(capacity.max(1));
    (EventSender { tx }, EventReceiver { rx })
}

impl EventSender {
    /// Queue a message for every operational connection.
    pub fn enqueue_operational_event(&self, message: OutboundMessage) -> bool {
        self.enqueue(Target::Operational, message)
    }

    /// Queue a message for every administrative connection.
    pub fn enqueue_admin_event(&self, message: OutboundMessage) -> bool {
        self.enqueue(Target::Administrative, message)
    }

    /// Queue a message for every connection.
    pub fn enqueue_broadcast_event(&self, message: OutboundMessage) -> bool {
        self.enqueue(Target::All, message)
    }

    /// Queue a message for connections of a single role.
    pub fn enqueue_role_event(&self, role: Role, message: OutboundMessage) -> bool {
        self.enqueue(Target::Role(role), message)
    }

    /// Queue a pickup notice for collectors.
    pub fn notify_pickup(
        &self,
        user_id: impl Into<String>,
        waste_type: impl Into<String>,
        amount: impl Into<String>,
        location: Location,
    ) -> bool {
        let notice = PickupNotice {
            user_id: user_id.into(),
            waste_type: waste_type.into(),
            amount: amount.into(),
            location,
        };
        self.enqueue_role_event(Role::Collector, OutboundMessage::PickupNotice(notice))
    }

    /// Queue an announcement for the audience implied by `target_role`.
    pub fn announce(&self, announcement: Announcement, target_role: Option<Role>) -> bool {
        self.enqueue(
            Target::for_role(target_role),
            OutboundMessage::Announcement(announcement),
        )
    }

    /// Queue `message` for `target`.
    ///
    /// Returns `false` only when the pump is gone; a full queue still
    /// accepts the event and discards the oldest one.
    pub fn enqueue(&self, target: Target, message: OutboundMessage) -> bool {
        let kind = message.kind();
        match self.tx.send(HubEvent { target, message }) {
            Ok(_) => {
                debug!(kind, ?target, "event queued");
                true
            }
            Err(_) => {
                warn!(kind, ?target, "event pump not running, dropping event");
                false
            }
        }
    }

    /// Events currently waiting.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Drain `receiver` into `hub` until `cancel` fires or every sender is gone.
///
/// Returns the number of events fanned out. Events lost to overflow are
/// counted and logged, never fatal.
pub async fn run_event_pump(
    hub: Arc<BroadcastHub>,
    mut receiver: EventReceiver,
    cancel: CancellationToken,
) -> u64 {
    let mut dispatched = 0_u64;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = receiver.rx.recv() => match result {
                Ok(event) => {
                    let _ = hub.broadcast(event.target, &event.message);
                    dispatched += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    counter!(HUB_EVENTS_LAGGED_TOTAL).increment(skipped);
                    warn!(skipped, "event queue overflowed, oldest events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    info!(dispatched, "event pump stopped");
    dispatched
}
