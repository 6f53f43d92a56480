//! Participant identity and location types.
//!
//! A participant is any connected driver or rider tracked by the
//! registry. The role is fixed at creation; switching roles means
//! removing the participant and registering it again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role a participant plays in dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Reports location, goes online/offline, accepts or rejects rides.
    Driver,
    /// Requests rides and receives driver updates.
    Client,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Driver => write!(f, "driver"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// A latitude/longitude pair.
///
/// Serialized as a two-element `[lat, lng]` array, which is how ride
/// payloads carry pickup and destination coordinates on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl From<[f64; 2]> for Location {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<Location> for [f64; 2] {
    fn from(loc: Location) -> Self {
        [loc.lat, loc.lng]
    }
}

/// A connected driver or client and its last known state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub role: Role,
    /// Unset until the first location update arrives. A driver may go
    /// online before it has ever reported a position.
    pub location: Option<Location>,
    pub last_update: DateTime<Utc>,
}

impl Participant {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            location: None,
            last_update: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_wire_format_is_pair() {
        let loc = Location::new(51.1694, 71.4491);
        let json = serde_json::to_string(&loc).unwrap();
        assert_eq!(json, "[51.1694,71.4491]");

        let back: Location = serde_json::from_str("[1.0,2.0]").unwrap();
        assert_eq!(back, Location::new(1.0, 2.0));
    }

    #[test]
    fn test_non_finite_coordinates_detected() {
        assert!(Location::new(1.0, 2.0).is_finite());
        assert!(!Location::new(f64::NAN, 2.0).is_finite());
        assert!(!Location::new(1.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Driver).unwrap(), "\"driver\"");
        assert_eq!(serde_json::to_string(&Role::Client).unwrap(), "\"client\"");
    }
}
