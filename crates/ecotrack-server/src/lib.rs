//! # ecotrack-server
//!
//! Axum HTTP + `WebSocket` surface of the realtime hub.
//!
//! - `WebSocket` gateway: handshake identity, per-connection session loop,
//!   heartbeat, exclusive writer task
//! - Collaborator ingest: pickup notices and announcements over HTTP
//! - Health and Prometheus endpoints
//! - Background tasks (analytics publisher, event pump) and graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{AppState, EcotrackServer};
