//! The participant registry.
//!
//! The registry is the single owner of participant records and their
//! connection handles. It is generic over the handle type `H` so this
//! crate never depends on a transport: the server instantiates it with
//! an outbound message sender, tests with whatever is convenient.

use crate::error::DispatchError;
use crate::participant::{Location, Participant, Role};
use std::collections::HashMap;
use tracing::warn;

struct Entry<H> {
    participant: Participant,
    /// Live connection handle, if any. A participant created through an
    /// out-of-band location write has no reachable connection; directed
    /// deliveries to it are silently dropped.
    handle: Option<H>,
}

/// Connected participants keyed by id.
pub struct Registry<H> {
    entries: HashMap<String, Entry<H>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Binds a connection handle to a participant, creating the record
    /// if this id has never been seen.
    ///
    /// Rebinding an existing id replaces the old handle: the newest
    /// connection wins.
    pub fn bind(&mut self, id: &str, role: Role, handle: H) -> &Participant {
        let entry = self
            .entries
            .entry(id.to_string())
            .or_insert_with(|| Entry {
                participant: Participant::new(id, role),
                handle: None,
            });
        if entry.participant.role != role {
            // Roles are fixed at creation; keep the original one.
            warn!(
                "ignoring role change for {}: {} -> {}",
                id, entry.participant.role, role
            );
        }
        entry.handle = Some(handle);
        &entry.participant
    }

    /// Inserts or updates a participant's location and timestamp.
    ///
    /// Coordinates must be finite; a rejected update leaves all state
    /// untouched. Returns a snapshot of the updated record.
    pub fn upsert_location(
        &mut self,
        id: &str,
        role: Role,
        lat: f64,
        lng: f64,
    ) -> Result<Participant, DispatchError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(DispatchError::InvalidCoordinates { lat, lng });
        }

        let entry = self
            .entries
            .entry(id.to_string())
            .or_insert_with(|| Entry {
                participant: Participant::new(id, role),
                handle: None,
            });
        entry.participant.location = Some(Location::new(lat, lng));
        entry.participant.last_update = chrono::Utc::now();
        Ok(entry.participant.clone())
    }

    /// Removes a participant, returning its last known state.
    pub fn remove(&mut self, id: &str) -> Option<Participant> {
        self.entries.remove(id).map(|e| e.participant)
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.entries.get(id).map(|e| &e.participant)
    }

    /// The live connection handle for a participant, if one is bound.
    pub fn handle(&self, id: &str) -> Option<&H> {
        self.entries.get(id).and_then(|e| e.handle.as_ref())
    }

    /// Iterates over every bound connection handle.
    pub fn handles(&self) -> impl Iterator<Item = (&str, &H)> {
        self.entries
            .iter()
            .filter_map(|(id, e)| e.handle.as_ref().map(|h| (id.as_str(), h)))
    }

    /// Iterates over all participant records.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.entries.values().map(|e| &e.participant)
    }

    /// All participants with the driver role, for monitoring snapshots.
    pub fn drivers(&self) -> Vec<Participant> {
        let mut drivers: Vec<_> = self
            .participants()
            .filter(|p| p.role == Role::Driver)
            .cloned()
            .collect();
        drivers.sort_by(|a, b| a.id.cmp(&b.id));
        drivers
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_inserts_then_updates() {
        let mut registry: Registry<()> = Registry::new();

        let p = registry
            .upsert_location("d1", Role::Driver, 51.0, 71.0)
            .unwrap();
        assert_eq!(p.location.unwrap().lat, 51.0);

        let p = registry
            .upsert_location("d1", Role::Driver, 52.0, 72.0)
            .unwrap();
        assert_eq!(p.location.unwrap().lat, 52.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let mut registry: Registry<()> = Registry::new();
        for i in 0..10 {
            registry
                .upsert_location("d1", Role::Driver, i as f64, 0.0)
                .unwrap();
        }
        assert_eq!(registry.get("d1").unwrap().location.unwrap().lat, 9.0);
    }

    #[test]
    fn test_rejects_non_finite_coordinates() {
        let mut registry: Registry<()> = Registry::new();
        let err = registry.upsert_location("d1", Role::Driver, f64::NAN, 1.0);
        assert!(matches!(
            err,
            Err(DispatchError::InvalidCoordinates { .. })
        ));
        // Nothing was applied.
        assert!(registry.get("d1").is_none());
    }

    #[test]
    fn test_role_fixed_after_creation() {
        let mut registry: Registry<()> = Registry::new();
        registry.bind("u1", Role::Driver, ());
        registry.bind("u1", Role::Client, ());
        assert_eq!(registry.get("u1").unwrap().role, Role::Driver);
    }

    #[test]
    fn test_handle_lifecycle() {
        let mut registry: Registry<u32> = Registry::new();

        // Created without a connection: no handle to deliver to.
        registry.upsert_location("d1", Role::Driver, 1.0, 1.0).unwrap();
        assert!(registry.handle("d1").is_none());

        registry.bind("d1", Role::Driver, 7);
        assert_eq!(registry.handle("d1"), Some(&7));

        let removed = registry.remove("d1").unwrap();
        assert_eq!(removed.id, "d1");
        assert!(registry.get("d1").is_none());
    }

    #[test]
    fn test_drivers_snapshot_sorted_and_filtered() {
        let mut registry: Registry<()> = Registry::new();
        registry.bind("d2", Role::Driver, ());
        registry.bind("d1", Role::Driver, ());
        registry.bind("c1", Role::Client, ());

        let drivers = registry.drivers();
        let ids: Vec<_> = drivers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
    }
}
