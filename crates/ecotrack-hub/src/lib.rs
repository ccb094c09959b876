//! # ecotrack-hub
//!
//! The in-memory core of the realtime hub:
//!
//! - **Connections**: [`ClientConnection`] with a bounded outbound queue,
//!   lifecycle state, liveness bookkeeping, and a close signal
//! - **Registry**: [`ConnectionRegistry`] partitioning connections into the
//!   administrative and operational audiences
//! - **Hub**: [`BroadcastHub`] routing inbound frames and fanning out to an
//!   audience, pruning clients that cannot keep up
//! - **Events**: fire-and-forget collaborator queue drained by [`run_event_pump`]
//! - **Publisher**: periodic synthetic analytics via [`run_live_stats`]

#![deny(unsafe_code)]

pub mod connection;
pub mod events;
pub mod hub;
pub mod metrics;
pub mod publisher;
pub mod registry;

pub use connection::{ClientConnection, ConnectionState, SendOutcome};
pub use events::{EventReceiver, EventSender, HubEvent, Target, event_queue, run_event_pump};
pub use hub::{BroadcastHub, DispatchOutcome, FanoutReport, HubConfig};
pub use publisher::{MetricsSource, SyntheticMetrics, run_live_stats};
pub use registry::{ConnectionRegistry, Registered};
