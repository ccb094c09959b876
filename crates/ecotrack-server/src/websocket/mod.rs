//! `WebSocket` gateway: handshake identity and session lifecycle.

pub mod session;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::warn;

use crate::server::AppState;
use session::SessionLimits;

/// Query parameters of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Explicit role claim (`citizen`, `collector`, `admin`).
    pub role: Option<String>,
}

/// GET /api/realtime/ws/{client_id}
///
/// The identity is resolved before the upgrade is accepted; an unknown role
/// claim is answered with `400` and never reaches the registry.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let identity = match state.hub.identify(client_id, params.role.as_deref()) {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "rejecting handshake");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let registry = state.hub.registry();
    if registry.connection_count() >= state.config.max_connections
        && registry.lookup(&identity.id).is_none()
    {
        warn!(
            client_id = %identity.id,
            max = state.config.max_connections,
            "connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }

    let hub = state.hub.clone();
    let limits = SessionLimits::from_config(&state.config);
    let shutdown = state.shutdown.token();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| session::run_ws_session(socket, identity, hub, limits, shutdown))
}
