//! Event and query handlers.
//!
//! [`apply_event`] is the dispatch core: one inbound event in, state
//! mutated, notifications fanned out to participants and mirrored to
//! the monitoring feed. The caller holds the state write lock for the
//! whole call, so each event runs to completion before the next one
//! starts.
//!
//! The `handle_*` functions below it implement the query surface, one
//! per method, in request/response style.

use crate::monitor::MonitorFeed;
use crate::protocol::{
    DriverGetParams, DriverStatus, DriverUpdateParams, InboundEvent, MonitorEvent, OutboundEvent,
    Response, RideGetParams,
};
use crate::router::Notifier;
use crate::state::{DispatchState, SharedState};
use hail_core::Role;
use serde_json::Value;
use tracing::{debug, info};

/// Applies one inbound event to the dispatch state.
///
/// Returns an event to send back to the connection the frame arrived
/// on, if the event warrants a direct reply (errors and not-founds do;
/// successful mutations answer through their fan-out).
pub fn apply_event(
    state: &mut DispatchState,
    feed: &MonitorFeed,
    event: InboundEvent,
) -> Option<OutboundEvent> {
    match event {
        InboundEvent::Register { id, .. } => Some(OutboundEvent::Error {
            message: format!("{} is already registered on this connection", id),
        }),

        InboundEvent::UpdateLocation { id, lat, lng, role } => {
            update_location(state, feed, &id, role, lat, lng, Some(&id))
        }

        InboundEvent::DriverOnline { id } => {
            // Only registered drivers enter the rotation; the
            // availability set never holds a client or unknown id.
            if state.registry.get(&id).map(|p| p.role) != Some(Role::Driver) {
                return Some(OutboundEvent::Error {
                    message: format!("not a registered driver: {}", id),
                });
            }
            state.availability.mark_online(&id);
            broadcast_availability(state);
            // The status event is emitted even when the driver was
            // already online; duplicate signals mean duplicate events.
            feed.publish(MonitorEvent::DriverStatusChange {
                id,
                status: DriverStatus::Online,
            });
            None
        }

        InboundEvent::DriverOffline { id } => {
            state.availability.mark_offline(&id);
            broadcast_availability(state);
            feed.publish(MonitorEvent::DriverStatusChange {
                id,
                status: DriverStatus::Offline,
            });
            None
        }

        InboundEvent::RequestRide {
            ride_id,
            client_id,
            pickup,
            destination,
            client_location,
        } => {
            let ride = state
                .ledger
                .create(&ride_id, &client_id, pickup, destination, client_location);
            info!("ride {} requested by client {}", ride_id, client_id);

            // Fan out to the availability snapshot taken now. Drivers
            // who come online later never see this request.
            let drivers = state.availability.snapshot();
            state.broadcast_drivers(
                &drivers,
                &OutboundEvent::RideRequest {
                    ride_id: ride.ride_id.clone(),
                    client_id: ride.client_id.clone(),
                    pickup: ride.pickup,
                    destination: ride.destination,
                    client_location: ride.client_location,
                    requested_at: ride.requested_at,
                },
            );
            feed.publish(MonitorEvent::RideCreated { ride });
            None
        }

        InboundEvent::AcceptRide {
            ride_id,
            driver_id,
            client_id,
        } => match state.ledger.accept(&ride_id, &driver_id) {
            Some(ride) => {
                info!("ride {} accepted by driver {}", ride_id, driver_id);

                // An accepted driver stops receiving offers until the
                // ride completes.
                if state.availability.mark_offline(&driver_id) {
                    broadcast_availability(state);
                }

                let accepted = OutboundEvent::RideAccepted {
                    ride_id: ride.ride_id.clone(),
                    driver_id: driver_id.clone(),
                    client_id: client_id.clone(),
                    pickup: ride.pickup,
                    destination: ride.destination,
                    accepted_at: ride.accepted_at.unwrap_or(ride.requested_at),
                };
                state.send_to(&client_id, &accepted);
                state.send_to(&driver_id, &accepted);
                feed.publish(MonitorEvent::RideAccepted { ride });
                None
            }
            // Unknown or already claimed: report back, mutate nothing.
            None => Some(OutboundEvent::Error {
                message: format!("ride not found: {}", ride_id),
            }),
        },

        InboundEvent::RejectRide { ride_id, driver_id } => {
            // No mutation: the ride stays pending for the rest of the
            // fleet, with no retry or expiry.
            state.ledger.reject(&ride_id, &driver_id);
            None
        }

        InboundEvent::CancelRide { ride_id, .. } => {
            if state.ledger.cancel(&ride_id).is_some() {
                info!("ride {} cancelled", ride_id);
                // Every currently-online driver hears the cancellation,
                // including drivers who never saw the original request.
                let drivers = state.availability.snapshot();
                state.broadcast_drivers(&drivers, &OutboundEvent::RideCancelled { ride_id });
            } else {
                debug!("cancel for unknown ride {} ignored", ride_id);
            }
            None
        }

        InboundEvent::CompleteRide {
            ride_id,
            driver_id,
            client_id,
        } => {
            // Accepted rides are no longer in the ledger, so completion
            // trusts the caller-supplied ids.
            info!("ride {} completed by driver {}", ride_id, driver_id);
            let completed = OutboundEvent::RideCompleted {
                ride_id: ride_id.clone(),
                driver_id: driver_id.clone(),
                client_id: client_id.clone(),
            };
            state.send_to(&client_id, &completed);
            state.send_to(&driver_id, &completed);

            // The caller-supplied driver id only re-enters the rotation
            // when it names a registered driver.
            if state.registry.get(&driver_id).map(|p| p.role) == Some(Role::Driver)
                && state.availability.mark_online(&driver_id)
            {
                broadcast_availability(state);
            }
            feed.publish(MonitorEvent::RideCompleted {
                ride_id,
                driver_id,
                client_id,
            });
            None
        }
    }
}

/// Cleans up after a participant's connection closes.
///
/// Disconnect is the only cancellation signal, and it only cancels the
/// participant's presence: rides it was party to stay exactly as they
/// were.
pub fn disconnect(state: &mut DispatchState, feed: &MonitorFeed, id: &str) {
    let Some(participant) = state.registry.remove(id) else {
        return;
    };
    info!("participant {} ({}) removed", id, participant.role);

    if participant.role == Role::Driver && state.availability.mark_offline(id) {
        broadcast_availability(state);
        feed.publish(MonitorEvent::DriverStatusChange {
            id: id.to_string(),
            status: DriverStatus::Offline,
        });
    }
}

/// Location write shared by the dispatch socket and the query surface.
///
/// `skip` is the id whose connection produced the update, so it does
/// not hear its own echo; out-of-band writes pass None and broadcast
/// everywhere.
fn update_location(
    state: &mut DispatchState,
    feed: &MonitorFeed,
    id: &str,
    role: Role,
    lat: f64,
    lng: f64,
    skip: Option<&str>,
) -> Option<OutboundEvent> {
    let participant = match state.registry.upsert_location(id, role, lat, lng) {
        Ok(p) => p,
        Err(e) => {
            return Some(OutboundEvent::Error {
                message: e.to_string(),
            })
        }
    };

    let update = OutboundEvent::UserLocationUpdate {
        id: participant.id.clone(),
        role: participant.role,
        lat,
        lng,
        timestamp: participant.last_update,
    };
    match skip {
        Some(skip) => state.broadcast_except(skip, &update),
        None => state.broadcast(&update),
    }

    if participant.role == Role::Driver {
        // Location reports keep the driver visible to dispatch; the
        // online/offline signal remains a separate concern.
        state.availability.mark_online(id);
        feed.publish(MonitorEvent::DriverLocationUpdate {
            id: participant.id,
            lat,
            lng,
            timestamp: participant.last_update,
        });
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Query surface
// ─────────────────────────────────────────────────────────────────────────────

/// Handles the drivers.list method.
pub async fn handle_drivers_list(state: SharedState, id: Option<Value>) -> Response {
    let s = state.read().await;
    let drivers = s.registry.drivers();
    let total = drivers.len();

    Response::success(
        id,
        serde_json::json!({
            "drivers": drivers,
            "total": total,
            "online": s.availability.snapshot(),
        }),
    )
}

/// Handles the drivers.get method.
pub async fn handle_drivers_get(
    state: SharedState,
    id: Option<Value>,
    params: DriverGetParams,
) -> Response {
    let s = state.read().await;
    match s.registry.get(&params.id) {
        Some(p) if p.role == Role::Driver => Response::success(
            id,
            serde_json::json!({
                "driver": p,
                "online": s.availability.contains(&params.id),
            }),
        ),
        _ => Response::error(id, -32001, format!("driver not found: {}", params.id)),
    }
}

/// Handles the drivers.updateLocation method: the out-of-band write.
///
/// Only known drivers can be moved this way; coordinates are validated
/// before anything is applied.
pub async fn handle_drivers_update(
    state: SharedState,
    feed: MonitorFeed,
    id: Option<Value>,
    params: DriverUpdateParams,
) -> Response {
    let mut s = state.write().await;

    let role = match s.registry.get(&params.id) {
        Some(p) => p.role,
        None => {
            return Response::error(id, -32001, format!("driver not found: {}", params.id));
        }
    };

    if !params.lat.is_finite() || !params.lng.is_finite() {
        return Response::invalid_params(
            id,
            format!("non-finite coordinates ({}, {})", params.lat, params.lng),
        );
    }

    update_location(&mut s, &feed, &params.id, role, params.lat, params.lng, None);
    Response::success(id, serde_json::json!({ "updated": params.id }))
}

/// Handles the rides.list method. The ledger holds pending rides only.
pub async fn handle_rides_list(state: SharedState, id: Option<Value>) -> Response {
    let s = state.read().await;
    let rides = s.ledger.rides();
    let total = rides.len();

    Response::success(
        id,
        serde_json::json!({
            "rides": rides,
            "total": total,
        }),
    )
}

/// Handles the rides.get method.
pub async fn handle_rides_get(
    state: SharedState,
    id: Option<Value>,
    params: RideGetParams,
) -> Response {
    let s = state.read().await;
    match s.ledger.get(&params.ride_id) {
        Some(ride) => Response::success(id, ride),
        None => Response::error(id, -32001, format!("ride not found: {}", params.ride_id)),
    }
}

/// Handles the stats method: health and statistics snapshot.
pub async fn handle_stats(state: SharedState, id: Option<Value>) -> Response {
    let s = state.read().await;
    Response::success(id, s.stats())
}

/// Broadcasts the full availability list to every participant.
fn broadcast_availability(state: &mut DispatchState) {
    let drivers = state.availability.snapshot();
    state.broadcast(&OutboundEvent::DriversAvailable { drivers });
}
