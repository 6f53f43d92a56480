//! Shared dispatch state.
//!
//! The registry, availability set and ride ledger are the only shared
//! mutable state in the process. They live together in one struct
//! behind a single `Arc<RwLock>`: every inbound event takes the write
//! lock, mutates, and performs its fan-out before releasing, which
//! preserves the run-to-completion atomicity the dispatch semantics
//! rely on. Fan-out uses unbounded sends, so nothing blocks while the
//! lock is held.

use crate::protocol::OutboundEvent;
use hail_core::{AvailabilitySet, Participant, Registry, Ride, RideLedger};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};

/// Per-participant connection handle: the sending half of the queue the
/// connection task drains into its socket.
pub type ClientHandle = mpsc::UnboundedSender<OutboundEvent>;

/// Shared dispatch state across connections.
pub type SharedState = Arc<RwLock<DispatchState>>;

/// All mutable dispatch state, owned in one place.
pub struct DispatchState {
    pub registry: Registry<ClientHandle>,
    pub availability: AvailabilitySet,
    pub ledger: RideLedger,
    started_at: Instant,
    /// Notifications that found no live connection. Delivery is fire
    /// and forget; this is a counter, not an error path.
    pub(crate) dropped: u64,
}

impl Default for DispatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchState {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            availability: AvailabilitySet::new(),
            ledger: RideLedger::new(),
            started_at: Instant::now(),
            dropped: 0,
        }
    }

    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Health and statistics snapshot for the query surface.
    pub fn stats(&self) -> Stats {
        Stats {
            connected_participants: self.registry.len(),
            online_drivers: self.availability.len(),
            pending_rides: self.ledger.len(),
            dropped_notifications: self.dropped,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// The point-in-time view a new monitoring subscriber receives.
    pub fn monitor_snapshot(&self) -> (Vec<Participant>, Vec<Ride>) {
        (self.registry.drivers(), self.ledger.rides())
    }
}

/// Counts reported by the `stats` query method.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub connected_participants: usize,
    pub online_drivers: usize,
    pub pending_rides: usize,
    pub dropped_notifications: u64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hail_core::Role;

    #[test]
    fn test_stats_reflect_state() {
        let mut state = DispatchState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        state.registry.bind("d1", Role::Driver, tx);
        state.availability.mark_online("d1");
        state.ledger.create(
            "r1",
            "c1",
            hail_core::Location::new(1.0, 1.0),
            hail_core::Location::new(2.0, 2.0),
            hail_core::Location::new(1.0, 1.0),
        );

        let stats = state.stats();
        assert_eq!(stats.connected_participants, 1);
        assert_eq!(stats.online_drivers, 1);
        assert_eq!(stats.pending_rides, 1);
        assert_eq!(stats.dropped_notifications, 0);
    }

    #[test]
    fn test_monitor_snapshot_contains_drivers_and_rides() {
        let mut state = DispatchState::new();
        state
            .registry
            .upsert_location("d1", Role::Driver, 51.0, 71.0)
            .unwrap();
        state.ledger.create(
            "r1",
            "c1",
            hail_core::Location::new(1.0, 1.0),
            hail_core::Location::new(2.0, 2.0),
            hail_core::Location::new(1.0, 1.0),
        );

        let (drivers, rides) = state.monitor_snapshot();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].id, "d1");
        assert_eq!(rides.len(), 1);
        assert_eq!(rides[0].ride_id, "r1");
    }
}
