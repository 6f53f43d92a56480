//! Error taxonomy for dispatch operations.
//!
//! Every error is resolved at the boundary of the operation that
//! detected it. A bad event never takes the process down and never
//! affects the handling of any other event.

use thiserror::Error;

/// Errors returned by dispatch state mutations and lookups.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Latitude or longitude was NaN or infinite.
    #[error("invalid coordinates: ({lat}, {lng})")]
    InvalidCoordinates { lat: f64, lng: f64 },

    /// The referenced participant is not in the registry.
    #[error("participant not found: {0}")]
    ParticipantNotFound(String),

    /// The referenced ride is not in the pending ledger.
    #[error("ride not found: {0}")]
    RideNotFound(String),
}
