//! Wire protocol for the dispatch, monitor and query sockets.
//!
//! Everything is JSON. Dispatch and monitor frames are tagged enums
//! (`"type"` discriminator, camelCase names); the query socket speaks a
//! small request/response protocol with JSON-RPC style error codes.

use chrono::{DateTime, Utc};
use hail_core::{Location, Participant, Ride, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events a participant sends to the dispatch socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InboundEvent {
    /// Connection handshake. Must be the first frame on a connection.
    Register {
        id: String,
        role: Role,
    },
    UpdateLocation {
        id: String,
        lat: f64,
        lng: f64,
        role: Role,
    },
    DriverOnline {
        id: String,
    },
    DriverOffline {
        id: String,
    },
    RequestRide {
        ride_id: String,
        client_id: String,
        pickup: Location,
        destination: Location,
        client_location: Location,
    },
    AcceptRide {
        ride_id: String,
        driver_id: String,
        client_id: String,
    },
    RejectRide {
        ride_id: String,
        driver_id: String,
    },
    CancelRide {
        ride_id: String,
        client_id: String,
    },
    CompleteRide {
        ride_id: String,
        driver_id: String,
        client_id: String,
    },
}

/// Events the server pushes to participants.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutboundEvent {
    /// Handshake acknowledgement.
    Registered {
        id: String,
        role: Role,
    },
    /// A frame could not be handled. The connection stays open.
    Error {
        message: String,
    },
    UserLocationUpdate {
        id: String,
        role: Role,
        lat: f64,
        lng: f64,
        timestamp: DateTime<Utc>,
    },
    /// Full sorted list of online driver ids.
    DriversAvailable {
        drivers: Vec<String>,
    },
    RideRequest {
        ride_id: String,
        client_id: String,
        pickup: Location,
        destination: Location,
        client_location: Location,
        requested_at: DateTime<Utc>,
    },
    RideAccepted {
        ride_id: String,
        driver_id: String,
        client_id: String,
        pickup: Location,
        destination: Location,
        accepted_at: DateTime<Utc>,
    },
    RideCompleted {
        ride_id: String,
        driver_id: String,
        client_id: String,
    },
    RideCancelled {
        ride_id: String,
    },
}

/// Online/offline marker carried by monitor status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    Online,
    Offline,
}

/// Events pushed to monitoring subscribers.
///
/// The monitor feed is unfiltered: every registry, availability and
/// ledger mutation the dispatch socket performs is mirrored here.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MonitorEvent {
    /// Point-in-time snapshot sent once, on connect.
    InitialData {
        drivers: Vec<Participant>,
        pending_rides: Vec<Ride>,
    },
    DriverLocationUpdate {
        id: String,
        lat: f64,
        lng: f64,
        timestamp: DateTime<Utc>,
    },
    DriverStatusChange {
        id: String,
        status: DriverStatus,
    },
    RideCreated {
        ride: Ride,
    },
    RideAccepted {
        ride: Ride,
    },
    RideCompleted {
        ride_id: String,
        driver_id: String,
        client_id: String,
    },
    /// Reply to `requestDriverLocation` when the driver is known.
    DriverLocation {
        id: String,
        lat: f64,
        lng: f64,
        timestamp: DateTime<Utc>,
    },
    /// Reply to `requestDriverLocation` when it is not.
    DriverNotFound {
        id: String,
    },
}

/// Requests a monitoring subscriber may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MonitorRequest {
    RequestDriverLocation { driver_id: String },
}

/// Parameters for the `drivers.get` query method.
#[derive(Debug, Deserialize)]
pub struct DriverGetParams {
    pub id: String,
}

/// Parameters for the `drivers.updateLocation` query method, the
/// out-of-band location write.
#[derive(Debug, Deserialize)]
pub struct DriverUpdateParams {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
}

/// Parameters for the `rides.get` query method.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideGetParams {
    pub ride_id: String,
}

/// A query-socket request.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// A query-socket response.
#[derive(Debug, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC style error object.
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl Response {
    pub fn success(id: Option<Value>, result: impl Serialize) -> Self {
        Self {
            id,
            result: serde_json::to_value(result).ok(),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn parse_error() -> Self {
        Self::error(None, -32700, "parse error")
    }

    pub fn invalid_params(id: Option<Value>, detail: impl Into<String>) -> Self {
        Self::error(id, -32602, format!("invalid params: {}", detail.into()))
    }

    pub fn method_not_found(id: Option<Value>, method: &str) -> Self {
        Self::error(id, -32601, format!("method not found: {}", method))
    }
}
