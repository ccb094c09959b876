//! HTTP ingest for collaborator events.
//!
//! CRUD services running out of process post pickup requests and admin
//! announcements here. Handlers only enqueue and answer `202 Accepted`;
//! fan-out happens on the event pump.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use ecotrack_core::{Announcement, Location, Priority, Role};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::server::AppState;

/// `target_role` of an announcement request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetRole {
    /// Every connection.
    #[default]
    All,
    /// Citizens only.
    Citizen,
    /// Collectors only.
    Collector,
    /// Administrative audience.
    Admin,
}

impl TargetRole {
    /// The role to address, `None` meaning everyone.
    pub fn role(self) -> Option<Role> {
        match self {
            Self::All => None,
            Self::Citizen => Some(Role::Citizen),
            Self::Collector => Some(Role::Collector),
            Self::Admin => Some(Role::Admin),
        }
    }
}

/// Body of `POST /api/realtime/pickup-notices`.
#[derive(Clone, Debug, Deserialize)]
pub struct PickupNoticeRequest {
    /// Requesting citizen.
    pub user_id: String,
    /// Waste category.
    pub waste_type: String,
    /// Approximate amount.
    pub amount: String,
    /// Pickup location.
    pub location: Location,
}

/// Body of `POST /api/realtime/announcements`.
#[derive(Clone, Debug, Deserialize)]
pub struct AnnouncementRequest {
    /// Headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Urgency, `normal` when omitted.
    #[serde(default)]
    pub priority: Priority,
    /// Audience, `all` when omitted.
    #[serde(default)]
    pub target_role: TargetRole,
}

/// POST /api/realtime/pickup-notices
pub async fn post_pickup_notice(
    State(state): State<AppState>,
    Json(req): Json<PickupNoticeRequest>,
) -> impl IntoResponse {
    info!(user_id = %req.user_id, waste_type = %req.waste_type, "pickup notice received");
    let queued = state
        .events
        .notify_pickup(req.user_id, req.waste_type, req.amount, req.location);
    accepted(queued)
}

/// POST /api/realtime/announcements
pub async fn post_announcement(
    State(state): State<AppState>,
    Json(req): Json<AnnouncementRequest>,
) -> impl IntoResponse {
    info!(
        title = %req.title,
        priority = ?req.priority,
        target_role = ?req.target_role,
        "announcement received"
    );
    let announcement = Announcement {
        title: req.title,
        message: req.message,
        priority: req.priority,
    };
    let queued = state.events.announce(announcement, req.target_role.role());
    accepted(queued)
}

fn accepted(queued: bool) -> (StatusCode, Json<serde_json::Value>) {
    if queued {
        (StatusCode::ACCEPTED, Json(json!({"status": "queued"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unavailable"})),
        )
    }
}
