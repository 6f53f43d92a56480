//! The driver availability set.
//!
//! A derived, non-owning index: an id is present iff that driver is
//! currently eligible to receive ride offers. Membership changes on
//! explicit online/offline signals, on disconnect (removed), when a
//! driver accepts a ride (removed) and when it completes one
//! (re-added). The set never looks at the registry; callers keep the
//! two consistent.

use std::collections::HashSet;

/// Driver ids currently eligible for ride offers.
#[derive(Debug, Default)]
pub struct AvailabilitySet {
    online: HashSet<String>,
}

impl AvailabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a driver. Returns true when membership actually changed.
    pub fn mark_online(&mut self, id: &str) -> bool {
        self.online.insert(id.to_string())
    }

    /// Removes a driver. Returns true when membership actually changed.
    pub fn mark_offline(&mut self, id: &str) -> bool {
        self.online.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.online.contains(id)
    }

    /// A sorted copy of the current membership.
    ///
    /// Fan-outs iterate this snapshot, not the live set, so a driver
    /// connecting mid-broadcast never sees half an event. Sorted for
    /// deterministic `driversAvailable` payloads.
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.online.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}
