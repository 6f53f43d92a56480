//! Event routing: directed delivery and broadcasts.
//!
//! Delivery is fire and forget. There is no retry, no queueing beyond
//! the per-connection channel, and no delivery confirmation: a target
//! without a live connection simply does not get the event, and the
//! drop is counted so operators can see it in `stats`.

use crate::protocol::OutboundEvent;
use crate::state::DispatchState;
use tracing::debug;

/// Fire-and-forget delivery of outbound events, resolved against the
/// registry's connection handles.
pub trait Notifier {
    /// Sends to exactly one participant. Returns false when the event
    /// was dropped (unknown id, no handle, or a closed connection).
    fn send_to(&mut self, id: &str, event: &OutboundEvent) -> bool;

    /// Sends to every participant with a live connection.
    fn broadcast(&mut self, event: &OutboundEvent);

    /// Sends to every participant except `skip` (typically the sender
    /// of the inbound event being fanned out).
    fn broadcast_except(&mut self, skip: &str, event: &OutboundEvent);

    /// Sends to each driver id in a snapshot taken by the caller.
    /// Drivers that come online after the snapshot never see the event.
    fn broadcast_drivers(&mut self, drivers: &[String], event: &OutboundEvent);
}

impl Notifier for DispatchState {
    fn send_to(&mut self, id: &str, event: &OutboundEvent) -> bool {
        let delivered = match self.registry.handle(id) {
            Some(handle) => handle.send(event.clone()).is_ok(),
            None => false,
        };
        if !delivered {
            debug!("dropping undeliverable event for {}", id);
            self.dropped += 1;
        }
        delivered
    }

    fn broadcast(&mut self, event: &OutboundEvent) {
        let targets: Vec<String> = self.registry.handles().map(|(id, _)| id.to_string()).collect();
        for id in targets {
            self.send_to(&id, event);
        }
    }

    fn broadcast_except(&mut self, skip: &str, event: &OutboundEvent) {
        let targets: Vec<String> = self
            .registry
            .handles()
            .map(|(id, _)| id.to_string())
            .filter(|id| id != skip)
            .collect();
        for id in targets {
            self.send_to(&id, event);
        }
    }

    fn broadcast_drivers(&mut self, drivers: &[String], event: &OutboundEvent) {
        for id in drivers {
            self.send_to(id, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hail_core::Role;
    use tokio::sync::mpsc;

    fn connect(state: &mut DispatchState, id: &str, role: Role) -> mpsc::UnboundedReceiver<OutboundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        state.registry.bind(id, role, tx);
        rx
    }

    fn cancelled(ride_id: &str) -> OutboundEvent {
        OutboundEvent::RideCancelled {
            ride_id: ride_id.into(),
        }
    }

    #[test]
    fn test_send_to_unknown_target_is_counted_drop() {
        let mut state = DispatchState::new();
        assert!(!state.send_to("ghost", &cancelled("r1")));
        assert_eq!(state.stats().dropped_notifications, 1);
    }

    #[test]
    fn test_send_to_closed_connection_is_counted_drop() {
        let mut state = DispatchState::new();
        let rx = connect(&mut state, "d1", Role::Driver);
        drop(rx);

        assert!(!state.send_to("d1", &cancelled("r1")));
        assert_eq!(state.stats().dropped_notifications, 1);
    }

    #[test]
    fn test_broadcast_except_skips_sender() {
        let mut state = DispatchState::new();
        let mut d1 = connect(&mut state, "d1", Role::Driver);
        let mut c1 = connect(&mut state, "c1", Role::Client);

        state.broadcast_except("d1", &cancelled("r1"));

        assert!(d1.try_recv().is_err());
        assert_eq!(c1.try_recv().unwrap(), cancelled("r1"));
    }

    #[test]
    fn test_broadcast_drivers_uses_caller_snapshot() {
        let mut state = DispatchState::new();
        let mut d1 = connect(&mut state, "d1", Role::Driver);
        let mut d2 = connect(&mut state, "d2", Role::Driver);

        // d2 is not in the snapshot, so it must not hear about r1.
        state.broadcast_drivers(&["d1".to_string()], &cancelled("r1"));

        assert_eq!(d1.try_recv().unwrap(), cancelled("r1"));
        assert!(d2.try_recv().is_err());
    }
}
