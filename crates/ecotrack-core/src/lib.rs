//! # ecotrack-core
//!
//! Foundation types shared by every EcoTrack crate:
//!
//! - **Audience**: [`Role`], [`Audience`], and the handshake-time [`Identity`]
//! - **Messages**: inbound client frames ([`InboundMessage`]) and outbound
//!   hub frames ([`OutboundMessage`]) with their `type` discriminators
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod audience;
pub mod logging;
pub mod messages;

pub use audience::{Audience, DEFAULT_ADMIN_PREFIX, Identity, Role};
pub use messages::{
    AnalyticsSnapshot, Announcement, InboundMessage, Location, OutboundMessage, PickupNotice,
    Priority,
};
