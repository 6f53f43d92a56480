//! Hail Core - Dispatch state management
//!
//! This crate holds the in-memory state machine behind the Hail dispatch
//! server: who is connected, which drivers can take a ride, and which
//! ride requests are still waiting for a driver.
//!
//! # Architecture
//!
//! Three stores, each with a single owner:
//! - The [`Registry`] owns participant records and their connection
//!   handles.
//! - The [`AvailabilitySet`] is a derived, non-owning index of driver
//!   ids that are eligible to receive ride offers.
//! - The [`RideLedger`] owns pending ride records. A ride leaves the
//!   ledger the moment a driver accepts it.
//!
//! Nothing here touches a socket. The registry is generic over its
//! connection handle type so the transport layer decides what a live
//! connection looks like.
//!
//! # Example
//!
//! ```
//! use hail_core::{Registry, Role};
//!
//! let mut registry: Registry<()> = Registry::new();
//! registry.bind("driver-1", Role::Driver, ());
//! let p = registry.upsert_location("driver-1", Role::Driver, 51.1, 71.4).unwrap();
//! assert_eq!(p.location.unwrap().lat, 51.1);
//! ```

mod availability;
mod error;
mod ledger;
mod participant;
mod registry;

pub use availability::AvailabilitySet;
pub use error::DispatchError;
pub use ledger::{Ride, RideLedger, RideStatus};
pub use participant::{Location, Participant, Role};
pub use registry::Registry;
