//! `EcotrackServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use ecotrack_hub::{
    BroadcastHub, EventReceiver, EventSender, SyntheticMetrics, event_queue, run_event_pump,
    run_live_stats,
};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::routes;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry and fan-out.
    pub hub: Arc<BroadcastHub>,
    /// Producer side of the collaborator event queue.
    pub events: EventSender,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The EcoTrack realtime server.
pub struct EcotrackServer {
    config: Arc<ServerConfig>,
    hub: Arc<BroadcastHub>,
    events: EventSender,
    event_rx: Mutex<Option<EventReceiver>>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics_handle: Option<PrometheusHandle>,
}

impl EcotrackServer {
    /// Create a new server. Nothing runs until [`listen`](Self::listen).
    pub fn new(config: ServerConfig, metrics_handle: Option<PrometheusHandle>) -> Self {
        let hub = Arc::new(BroadcastHub::new(config.hub.clone()));
        let (events, event_rx) = event_queue(config.hub.event_queue_capacity);
        Self {
            config: Arc::new(config),
            hub,
            events,
            event_rx: Mutex::new(Some(event_rx)),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics_handle,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics_handle.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/api/realtime/ws/{client_id}", get(websocket::ws_handler))
            .route("/api/realtime/pickup-notices", post(routes::post_pickup_notice))
            .route("/api/realtime/announcements", post(routes::post_announcement))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the listener, start the background tasks, and serve.
    ///
    /// Returns the bound address and the serve task's handle. The analytics
    /// publisher and event pump are tracked by the shutdown coordinator.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let event_rx = self
            .event_rx
            .lock()
            .take()
            .ok_or(ServerError::AlreadyStarted)?;

        let bind_addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;

        self.spawn_background(event_rx);

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });

        info!(%addr, "ecotrack server listening");
        Ok((addr, handle))
    }

    fn spawn_background(&self, event_rx: EventReceiver) {
        let token = self.shutdown.token();

        let hub = self.hub.clone();
        let period = self.config.hub.stats_interval;
        let cancel = token.clone();
        self.shutdown.track(
            "live_stats",
            tokio::spawn(async move {
                let _ = run_live_stats(hub, period, SyntheticMetrics, cancel).await;
            }),
        );

        let hub = self.hub.clone();
        self.shutdown.track(
            "event_pump",
            tokio::spawn(async move {
                let _ = run_event_pump(hub, event_rx, token).await;
            }),
        );
    }

    /// Cancel every session and background task and wait for them.
    pub async fn stop(&self, timeout: Option<Duration>) {
        let finished = self.shutdown.graceful_shutdown(timeout).await;
        info!(finished, "ecotrack server stopped");
    }

    /// Get the hub.
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Get a producer handle for collaborator events.
    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.hub.registry()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, metrics::render(handle)),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use ecotrack_core::Identity;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> EcotrackServer {
        EcotrackServer::new(ServerConfig::default(), None)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.hub().registry().connection_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_reports_audiences() {
        let server = make_server();
        let (_a, _arx) = server.hub().connect(Identity::classify("admin_1", "admin"));
        let (_u, _urx) = server.hub().connect(Identity::classify("user_1", "admin"));

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 2);
        assert_eq!(parsed["admin_connections"], 1);
        assert_eq!(parsed["operational_connections"], 1);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_unavailable() {
        let server = make_server();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_with_recorder_renders() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = EcotrackServer::new(ServerConfig::default(), Some(handle));
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn pickup_notice_is_accepted_and_queued() {
        let server = make_server();
        let body = serde_json::json!({
            "user_id": "user_7",
            "waste_type": "recyclable",
            "amount": "2-5 bags",
            "location": {"lat": 12.9, "lng": 77.6, "address": "MG Road"},
        });
        let resp = server
            .router()
            .oneshot(post_json("/api/realtime/pickup-notices", &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(resp).await["status"], "queued");
        assert_eq!(server.events().pending(), 1);
    }

    #[tokio::test]
    async fn announcement_is_accepted() {
        let server = make_server();
        let body = serde_json::json!({"title": "Holiday", "message": "No pickup Monday"});
        let resp = server
            .router()
            .oneshot(post_json("/api/realtime/announcements", &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(server.events().pending(), 1);
    }

    #[tokio::test]
    async fn announcement_with_bad_target_is_rejected() {
        let server = make_server();
        let body = serde_json::json!({"title": "t", "message": "m", "target_role": "mayor"});
        let resp = server
            .router()
            .oneshot(post_json("/api/realtime/announcements", &body))
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
        assert_eq!(server.events().pending(), 0);
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let server = make_server();
        let req = Request::builder()
            .uri("/api/realtime/ws/user_1")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
        assert_eq!(server.hub().registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_twice_fails() {
        let server = make_server();
        let (addr, _handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(matches!(server.listen().await, Err(ServerError::AlreadyStarted)));
        server.stop(Some(Duration::from_secs(1))).await;
    }
}
