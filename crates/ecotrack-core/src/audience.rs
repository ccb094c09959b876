//! Connection roles, audiences, and handshake-time identity.
//!
//! A connection's audience is decided once, when the WebSocket handshake is
//! accepted. An explicit role claim wins; without one the client id is
//! classified by the reserved admin marker prefix. Nothing downstream of the
//! handshake re-parses the id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default reserved marker for administrative client ids.
pub const DEFAULT_ADMIN_PREFIX: &str = "admin";

/// Id prefix that classifies an unclaimed operational client as a collector.
const COLLECTOR_PREFIX: &str = "collector";

/// Self-declared role of a connected client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Resident filing pickups and watching trucks.
    Citizen,
    /// Collection driver publishing location updates.
    Collector,
    /// Operator receiving analytics and announcements.
    Admin,
}

impl Role {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Citizen => "citizen",
            Self::Collector => "collector",
            Self::Admin => "admin",
        }
    }

    /// The audience this role belongs to.
    pub fn audience(self) -> Audience {
        match self {
            Self::Admin => Audience::Administrative,
            Self::Citizen | Self::Collector => Audience::Operational,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role claim is not one of the known roles.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "citizen" => Ok(Self::Citizen),
            "collector" => Ok(Self::Collector),
            "admin" => Ok(Self::Admin),
            _ => Err(UnknownRole(s.to_owned())),
        }
    }
}

/// A named group of connections that receive the same broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Administrators: analytics snapshots and admin announcements.
    Administrative,
    /// Citizens and collectors: tracking updates and pickup notices.
    Operational,
}

impl Audience {
    /// Lowercase label used in logs and health output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrative => "administrative",
            Self::Operational => "operational",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a client, fixed at handshake time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Caller-supplied id, unique per registry at a point in time.
    pub id: String,
    /// Role the client connected as.
    pub role: Role,
}

impl Identity {
    /// Build an identity with an explicit role.
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Classify an id by naming convention.
    ///
    /// Ids starting with `admin_prefix` are admins, ids starting with
    /// `collector` are collectors, everything else is a citizen.
    pub fn classify(id: impl Into<String>, admin_prefix: &str) -> Self {
        let id = id.into();
        let role = if !admin_prefix.is_empty() && id.starts_with(admin_prefix) {
            Role::Admin
        } else if id.starts_with(COLLECTOR_PREFIX) {
            Role::Collector
        } else {
            Role::Citizen
        };
        Self { id, role }
    }

    /// Resolve the identity from an optional role claim, falling back to
    /// [`Identity::classify`] when no claim was made.
    pub fn from_claim(
        id: impl Into<String>,
        claim: Option<&str>,
        admin_prefix: &str,
    ) -> Result<Self, UnknownRole> {
        match claim.filter(|c| !c.is_empty()) {
            Some(raw) => Ok(Self::new(id, raw.parse()?)),
            None => Ok(Self::classify(id, admin_prefix)),
        }
    }

    /// Audience derived from the role.
    pub fn audience(&self) -> Audience {
        self.role.audience()
    }
}
