//! The monitoring feed.
//!
//! A secondary, read-mostly WebSocket channel for external observers.
//! Every mutation the dispatch socket performs is mirrored here with no
//! filtering. A new subscriber gets a point-in-time snapshot on
//! connect, then the incremental stream; it may also pull a specific
//! driver's last known location on demand.

use crate::protocol::{MonitorEvent, MonitorRequest};
use crate::state::SharedState;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Handle for publishing mutation events to all monitoring subscribers.
///
/// Cheap to clone; events published while nobody is subscribed are
/// discarded, which is the desired fire-and-forget behavior.
#[derive(Clone)]
pub struct MonitorFeed {
    tx: broadcast::Sender<MonitorEvent>,
}

impl Default for MonitorFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Mirrors one mutation to every subscriber.
    pub fn publish(&self, event: MonitorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }
}

/// Accepts monitoring subscribers forever.
pub async fn run_monitor_listener(listener: TcpListener, state: SharedState, feed: MonitorFeed) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = state.clone();
                let rx = feed.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = handle_subscriber(stream, addr, state, rx).await {
                        warn!("monitor connection error from {}: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("monitor accept error: {}", e);
            }
        }
    }
}

/// Handles a single monitoring subscriber.
async fn handle_subscriber(
    stream: TcpStream,
    addr: SocketAddr,
    state: SharedState,
    mut rx: broadcast::Receiver<MonitorEvent>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let subscriber = Uuid::new_v4();
    info!("monitor subscriber {} connected from {}", subscriber, addr);

    // Snapshot first, stream after. Events published between the
    // snapshot read and the first recv are already buffered in rx.
    {
        let s = state.read().await;
        let (drivers, pending_rides) = s.monitor_snapshot();
        let snapshot = MonitorEvent::InitialData {
            drivers,
            pending_rides,
        };
        write
            .send(Message::Text(serde_json::to_string(&snapshot)?))
            .await?;
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let json = serde_json::to_string(&event)?;
                        if write.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("monitor subscriber {} lagged by {} events", subscriber, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_request(&state, &text).await {
                            let json = serde_json::to_string(&reply)?;
                            write.send(Message::Text(json)).await?;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("monitor subscriber {} error: {}", subscriber, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("monitor subscriber {} disconnected", subscriber);
    Ok(())
}

/// Answers a subscriber's pull request without blocking the stream.
/// Malformed requests are logged and ignored.
async fn handle_request(state: &SharedState, text: &str) -> Option<MonitorEvent> {
    let request: MonitorRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            debug!("ignoring malformed monitor request: {}", e);
            return None;
        }
    };

    match request {
        MonitorRequest::RequestDriverLocation { driver_id } => {
            let s = state.read().await;
            let reply = match s
                .registry
                .get(&driver_id)
                .and_then(|p| p.location.map(|loc| (loc, p.last_update)))
            {
                Some((loc, at)) => MonitorEvent::DriverLocation {
                    id: driver_id,
                    lat: loc.lat,
                    lng: loc.lng,
                    timestamp: at,
                },
                None => MonitorEvent::DriverNotFound { id: driver_id },
            };
            Some(reply)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DriverStatus;

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let feed = MonitorFeed::new();
        feed.publish(MonitorEvent::DriverStatusChange {
            id: "d1".into(),
            status: DriverStatus::Online,
        });
    }

    #[tokio::test]
    async fn test_subscriber_gets_snapshot_before_buffered_events() {
        use crate::state::DispatchState;
        use hail_core::{Location, Role};

        let state = DispatchState::shared();
        {
            let mut s = state.write().await;
            s.registry
                .upsert_location("d1", Role::Driver, 1.0, 2.0)
                .unwrap();
            s.ledger.create(
                "r1",
                "c1",
                Location::new(1.0, 1.0),
                Location::new(2.0, 2.0),
                Location::new(1.0, 1.0),
            );
        }

        let feed = MonitorFeed::new();
        let rx = feed.subscribe();
        // Published before the subscriber handshake completes; it must
        // arrive after the snapshot, not instead of it.
        feed.publish(MonitorEvent::DriverStatusChange {
            id: "d1".into(),
            status: DriverStatus::Online,
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_state = state.clone();
        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let _ = handle_subscriber(stream, peer, server_state, rx).await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (ws, _) = tokio_tungstenite::client_async("ws://localhost/", stream)
            .await
            .unwrap();
        let (_, mut read) = ws.split();

        let first = read.next().await.unwrap().unwrap();
        let first: serde_json::Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
        assert_eq!(first["type"], "initialData");
        assert_eq!(first["drivers"][0]["id"], "d1");
        assert_eq!(first["pendingRides"][0]["rideId"], "r1");

        let second = read.next().await.unwrap().unwrap();
        let second: serde_json::Value = serde_json::from_str(second.to_text().unwrap()).unwrap();
        assert_eq!(second["type"], "driverStatusChange");
        assert_eq!(second["id"], "d1");
    }

    #[test]
    fn test_subscribers_see_events_in_order() {
        let feed = MonitorFeed::new();
        let mut rx = feed.subscribe();

        feed.publish(MonitorEvent::DriverStatusChange {
            id: "d1".into(),
            status: DriverStatus::Online,
        });
        feed.publish(MonitorEvent::DriverStatusChange {
            id: "d1".into(),
            status: DriverStatus::Offline,
        });

        assert!(matches!(
            rx.try_recv().unwrap(),
            MonitorEvent::DriverStatusChange {
                status: DriverStatus::Online,
                ..
            }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            MonitorEvent::DriverStatusChange {
                status: DriverStatus::Offline,
                ..
            }
        ));
    }
}
