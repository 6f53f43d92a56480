//! The pending ride ledger.
//!
//! The ledger holds only rides waiting for a driver. Acceptance removes
//! the record and hands back a snapshot for notification purposes, so
//! later `completeRide`/`cancelRide` events for that id operate purely
//! on caller-supplied ids. Ride ids come from the caller; a colliding
//! id overwrites the previous record.

use crate::participant::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Lifecycle state of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Pending,
    Accepted,
    Completed,
    Cancelled,
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A ride request and everything known about it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub ride_id: String,
    pub client_id: String,
    pub pickup: Location,
    pub destination: Location,
    /// Where the client was when it asked for the ride.
    pub client_location: Location,
    pub status: RideStatus,
    /// Set once a driver claims the ride.
    pub driver_id: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// In-flight ride requests keyed by ride id.
///
/// Invariant: every record in here is `pending`, and there is at most
/// one record per ride id.
#[derive(Debug, Default)]
pub struct RideLedger {
    rides: HashMap<String, Ride>,
}

impl RideLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pending ride, returning a snapshot for fan-out.
    ///
    /// The ledger does not generate or deduplicate ids: a colliding id
    /// silently replaces the prior record, exactly as the reference
    /// behaves. We log it because it usually means a buggy client.
    pub fn create(
        &mut self,
        ride_id: &str,
        client_id: &str,
        pickup: Location,
        destination: Location,
        client_location: Location,
    ) -> Ride {
        let ride = Ride {
            ride_id: ride_id.to_string(),
            client_id: client_id.to_string(),
            pickup,
            destination,
            client_location,
            status: RideStatus::Pending,
            driver_id: None,
            requested_at: Utc::now(),
            accepted_at: None,
        };
        if self.rides.insert(ride_id.to_string(), ride.clone()).is_some() {
            warn!("ride id collision: overwriting pending ride {}", ride_id);
        }
        ride
    }

    /// Claims a pending ride for a driver.
    ///
    /// Removes the record from the ledger and returns the accepted
    /// snapshot. Returns None when the id is unknown, which includes
    /// rides somebody else already accepted.
    pub fn accept(&mut self, ride_id: &str, driver_id: &str) -> Option<Ride> {
        let mut ride = self.rides.remove(ride_id)?;
        ride.status = RideStatus::Accepted;
        ride.driver_id = Some(driver_id.to_string());
        ride.accepted_at = Some(Utc::now());
        Some(ride)
    }

    /// Removes whatever record exists for this id. No-op when absent.
    pub fn cancel(&mut self, ride_id: &str) -> Option<Ride> {
        let mut ride = self.rides.remove(ride_id)?;
        ride.status = RideStatus::Cancelled;
        Some(ride)
    }

    /// A driver turning down a ride mutates nothing: the ride stays
    /// pending for the rest of the fleet. There is no rejection count
    /// and no expiry.
    pub fn reject(&self, ride_id: &str, driver_id: &str) {
        tracing::info!("ride {} rejected by driver {}", ride_id, driver_id);
    }

    pub fn get(&self, ride_id: &str) -> Option<&Ride> {
        self.rides.get(ride_id)
    }

    /// All pending rides, sorted by ride id.
    pub fn rides(&self) -> Vec<Ride> {
        let mut rides: Vec<_> = self.rides.values().cloned().collect();
        rides.sort_by(|a, b| a.ride_id.cmp(&b.ride_id));
        rides
    }

    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, lng: f64) -> Location {
        Location::new(lat, lng)
    }

    fn request(ledger: &mut RideLedger, ride_id: &str) -> Ride {
        ledger.create(ride_id, "c1", loc(1.0, 1.0), loc(2.0, 2.0), loc(1.0, 1.0))
    }

    #[test]
    fn test_create_is_pending() {
        let mut ledger = RideLedger::new();
        let ride = request(&mut ledger, "r1");

        assert_eq!(ride.status, RideStatus::Pending);
        assert!(ride.driver_id.is_none());
        assert!(ride.accepted_at.is_none());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_colliding_id_overwrites() {
        let mut ledger = RideLedger::new();
        request(&mut ledger, "r1");
        let second = ledger.create("r1", "c2", loc(3.0, 3.0), loc(4.0, 4.0), loc(3.0, 3.0));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("r1").unwrap().client_id, second.client_id);
    }

    #[test]
    fn test_accept_removes_from_ledger() {
        let mut ledger = RideLedger::new();
        request(&mut ledger, "r1");

        let ride = ledger.accept("r1", "d1").unwrap();
        assert_eq!(ride.status, RideStatus::Accepted);
        assert_eq!(ride.driver_id.as_deref(), Some("d1"));
        assert!(ride.accepted_at.is_some());

        // No longer retrievable from the pending ledger.
        assert!(ledger.get("r1").is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_second_accept_is_noop() {
        let mut ledger = RideLedger::new();
        request(&mut ledger, "r1");

        assert!(ledger.accept("r1", "d1").is_some());
        assert!(ledger.accept("r1", "d2").is_none());
    }

    #[test]
    fn test_cancel_removes_and_is_idempotent() {
        let mut ledger = RideLedger::new();
        request(&mut ledger, "r1");

        let cancelled = ledger.cancel("r1").unwrap();
        assert_eq!(cancelled.status, RideStatus::Cancelled);
        assert!(ledger.cancel("r1").is_none());
    }

    #[test]
    fn test_reject_leaves_ride_pending() {
        let mut ledger = RideLedger::new();
        request(&mut ledger, "r1");

        ledger.reject("r1", "d1");
        ledger.reject("r1", "d2");

        assert_eq!(ledger.get("r1").unwrap().status, RideStatus::Pending);
    }

    #[test]
    fn test_rides_listing_sorted() {
        let mut ledger = RideLedger::new();
        request(&mut ledger, "r2");
        request(&mut ledger, "r1");

        let ids: Vec<_> = ledger.rides().into_iter().map(|r| r.ride_id).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }
}
