//! Hail Server - WebSocket dispatch for riders and drivers
//!
//! This crate implements the transport around the `hail-core` state
//! machine. It runs three WebSocket listeners against one shared state:
//!
//! - a dispatch socket carrying the ride lifecycle between riders and
//!   drivers,
//! - a monitor socket mirroring every mutation to external observers,
//! - a query socket exposing reads, statistics and an out-of-band
//!   location write in request/response style.
//!
//! Delivery is fire and forget throughout: no retries, no queueing
//! beyond each connection's outbound channel, no confirmations. Events
//! that cannot be delivered are counted and dropped.

mod handlers;
mod monitor;
mod protocol;
mod router;
mod server;
mod state;

pub use handlers::{apply_event, disconnect};
pub use monitor::MonitorFeed;
pub use protocol::{
    DriverStatus, InboundEvent, MonitorEvent, MonitorRequest, OutboundEvent, Request, Response,
    RpcError,
};
pub use router::Notifier;
pub use server::{DispatchServer, ServerConfig};
pub use state::{ClientHandle, DispatchState, SharedState, Stats};
