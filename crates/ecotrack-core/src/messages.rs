//! Wire envelopes exchanged over the realtime channel.
//!
//! Every frame is a JSON object with a required `type` discriminator and a
//! flat, type-specific payload. Locations travel as the raw object the client
//! sent so extra fields (`address`, `accuracy`, ...) survive the round trip.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A client-supplied location object (`{lat, lng, ...}`), echoed verbatim.
pub type Location = Map<String, Value>;

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// A frame sent by a client to the hub.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// A collector reporting its current position.
    LocationUpdate {
        /// Current position.
        location: Location,
    },
    /// Liveness probe; answered with [`OutboundMessage::Pong`].
    Ping,
    /// Any `type` the hub does not know. Dropped without error.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Parse a raw text frame.
    ///
    /// Fails for non-JSON input, non-object JSON, a missing `type`, or a
    /// known `type` whose payload does not match.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Synthetic analytics snapshot published to administrators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    /// Users currently active on the portal.
    pub active_users: u32,
    /// CO2 saved, in kilograms.
    pub co2_saved: u32,
    /// Waste collected, in kilograms.
    pub waste_collected: u32,
}

/// Raised when a citizen files a pickup request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PickupNotice {
    /// Requesting citizen.
    pub user_id: String,
    /// Waste category (`organic`, `recyclable`, `hazardous`, ...).
    pub waste_type: String,
    /// Approximate amount (`1 bag`, `2-5 bags`, `truck load`, ...).
    pub amount: String,
    /// Pickup location.
    pub location: Location,
}

/// Announcement urgency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Informational.
    Low,
    /// Default.
    #[default]
    Normal,
    /// Needs attention.
    High,
    /// Needs immediate attention.
    Urgent,
}

/// Broadcast issued by an administrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    /// Headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Urgency.
    #[serde(default)]
    pub priority: Priority,
}

/// A frame sent by the hub to one or more clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Reply to [`InboundMessage::Ping`].
    Pong,
    /// Re-broadcast of a collector's location update.
    Tracking {
        /// Id of the connection that sent the update.
        driver_id: String,
        /// Location as sent.
        location: Location,
    },
    /// Periodic synthetic metrics.
    AnalyticsUpdate(AnalyticsSnapshot),
    /// A new pickup request for collectors.
    PickupNotice(PickupNotice),
    /// An administrator broadcast.
    Announcement(Announcement),
}

impl OutboundMessage {
    /// The `type` discriminator as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pong => "pong",
            Self::Tracking { .. } => "tracking",
            Self::AnalyticsUpdate(_) => "analytics_update",
            Self::PickupNotice(_) => "pickup_notice",
            Self::Announcement(_) => "announcement",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn location(lat: i64, lng: i64) -> Location {
        let Value::Object(map) = json!({"lat": lat, "lng": lng}) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn parse_location_update() {
        let msg = InboundMessage::parse(
            r#"{"type":"location_update","location":{"lat":10,"lng":20,"address":"Ward 6"}}"#,
        )
        .unwrap();
        let InboundMessage::LocationUpdate { location } = msg else {
            panic!("expected location update");
        };
        assert_eq!(location["lat"], 10);
        assert_eq!(location["lng"], 20);
        assert_eq!(location["address"], "Ward 6");
    }

    #[test]
    fn parse_ping() {
        let msg = InboundMessage::parse(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Ping);
    }

    #[test]
    fn ping_ignores_extra_fields() {
        let msg = InboundMessage::parse(r#"{"type":"ping","ts":123}"#).unwrap();
        assert_eq!(msg, InboundMessage::Ping);
    }

    #[test]
    fn unknown_type_parses_as_unknown() {
        let msg = InboundMessage::parse(r#"{"type":"subscribe","route":"r1"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Unknown);
    }

    #[test]
    fn missing_type_is_error() {
        assert!(InboundMessage::parse(r#"{"location":{"lat":1}}"#).is_err());
    }

    #[test]
    fn non_json_is_error() {
        assert!(InboundMessage::parse("not json").is_err());
        assert!(InboundMessage::parse("").is_err());
    }

    #[test]
    fn non_object_json_is_error() {
        assert!(InboundMessage::parse("[1,2,3]").is_err());
        assert!(InboundMessage::parse("\"ping\"").is_err());
    }

    #[test]
    fn location_update_without_location_is_error() {
        assert!(InboundMessage::parse(r#"{"type":"location_update"}"#).is_err());
        assert!(InboundMessage::parse(r#"{"type":"location_update","location":5}"#).is_err());
    }

    #[test]
    fn pong_wire_format() {
        let json: Value = serde_json::from_str(&OutboundMessage::Pong.to_json().unwrap()).unwrap();
        assert_eq!(json, json!({"type": "pong"}));
    }

    #[test]
    fn tracking_wire_format() {
        let msg = OutboundMessage::Tracking {
            driver_id: "c1".into(),
            location: location(10, 20),
        };
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({"type": "tracking", "driver_id": "c1", "location": {"lat": 10, "lng": 20}})
        );
    }

    #[test]
    fn analytics_wire_format_is_flat() {
        let msg = OutboundMessage::AnalyticsUpdate(AnalyticsSnapshot {
            active_users: 120,
            co2_saved: 3000,
            waste_collected: 800,
        });
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "analytics_update");
        assert_eq!(json["active_users"], 120);
        assert_eq!(json["co2_saved"], 3000);
        assert_eq!(json["waste_collected"], 800);
    }

    #[test]
    fn pickup_notice_wire_format() {
        let msg = OutboundMessage::PickupNotice(PickupNotice {
            user_id: "u1".into(),
            waste_type: "organic".into(),
            amount: "1 bag".into(),
            location: location(1, 2),
        });
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "pickup_notice");
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["waste_type"], "organic");
        assert_eq!(json["amount"], "1 bag");
        assert_eq!(json["location"]["lat"], 1);
    }

    #[test]
    fn announcement_priority_defaults_to_normal() {
        let a: Announcement =
            serde_json::from_value(json!({"title": "t", "message": "m"})).unwrap();
        assert_eq!(a.priority, Priority::Normal);
        let json: Value =
            serde_json::from_str(&OutboundMessage::Announcement(a).to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "announcement");
        assert_eq!(json["priority"], "normal");
    }

    #[test]
    fn kind_matches_serialized_type() {
        let msgs = [
            OutboundMessage::Pong,
            OutboundMessage::Tracking {
                driver_id: "d".into(),
                location: Location::new(),
            },
            OutboundMessage::AnalyticsUpdate(AnalyticsSnapshot {
                active_users: 1,
                co2_saved: 1,
                waste_collected: 1,
            }),
            OutboundMessage::Announcement(Announcement {
                title: "t".into(),
                message: "m".into(),
                priority: Priority::Urgent,
            }),
        ];
        for msg in msgs {
            let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
            assert_eq!(json["type"], msg.kind());
        }
    }
}
