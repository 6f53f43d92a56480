//! WebSocket server implementation.
//!
//! Three listeners share one dispatch state:
//! - the dispatch socket, where participants register and exchange
//!   ride lifecycle events;
//! - the monitor socket, the unfiltered feed for external observers;
//! - the query socket, a request/response surface for reads, stats and
//!   the out-of-band location write.

use crate::handlers::{
    apply_event, disconnect, handle_drivers_get, handle_drivers_list, handle_drivers_update,
    handle_rides_get, handle_rides_list, handle_stats,
};
use crate::monitor::{run_monitor_listener, MonitorFeed};
use crate::protocol::{
    DriverGetParams, DriverUpdateParams, InboundEvent, OutboundEvent, Request, Response,
    RideGetParams,
};
use crate::state::{DispatchState, SharedState};
use futures_util::{SinkExt, StreamExt};
use hail_core::Role;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address for the participant dispatch socket.
    pub addr: SocketAddr,
    /// Address for the monitoring feed.
    pub monitor_addr: SocketAddr,
    /// Address for the query surface.
    pub query_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:7510".parse().unwrap(),
            monitor_addr: "127.0.0.1:7511".parse().unwrap(),
            query_addr: "127.0.0.1:7512".parse().unwrap(),
        }
    }
}

/// The Hail dispatch server.
pub struct DispatchServer {
    config: ServerConfig,
    state: SharedState,
    feed: MonitorFeed,
}

impl DispatchServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: DispatchState::shared(),
            feed: MonitorFeed::new(),
        }
    }

    /// Returns the shared state, for tests and embedding.
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Returns the monitoring feed handle.
    pub fn feed(&self) -> MonitorFeed {
        self.feed.clone()
    }

    /// Runs all three listeners, accepting connections forever.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let dispatch = TcpListener::bind(&self.config.addr).await?;
        let monitor = TcpListener::bind(&self.config.monitor_addr).await?;
        let query = TcpListener::bind(&self.config.query_addr).await?;

        info!("dispatch socket listening on ws://{}", self.config.addr);
        info!("monitor socket listening on ws://{}", self.config.monitor_addr);
        info!("query socket listening on ws://{}", self.config.query_addr);

        tokio::spawn(run_monitor_listener(
            monitor,
            self.state.clone(),
            self.feed.clone(),
        ));
        tokio::spawn(run_query_listener(
            query,
            self.state.clone(),
            self.feed.clone(),
        ));

        loop {
            match dispatch.accept().await {
                Ok((stream, addr)) => {
                    debug!("new dispatch connection from {}", addr);
                    let state = self.state.clone();
                    let feed = self.feed.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_participant(stream, addr, state, feed).await {
                            warn!("connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

/// Handles one participant connection end to end.
///
/// The first frame must be a `register` event; it binds this
/// connection's outbound queue into the registry. Afterwards the loop
/// interleaves inbound events with queued outbound deliveries until
/// either side closes.
async fn handle_participant(
    stream: TcpStream,
    addr: SocketAddr,
    state: SharedState,
    feed: MonitorFeed,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    // Handshake.
    let (id, role) = match read_register(&mut write, &mut read).await? {
        Some(registration) => registration,
        None => return Ok(()),
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    // The registry's clone is the only strong sender; this task keeps a
    // weak one for the cleanup identity check, so a reconnect that
    // replaces the handle closes our queue.
    let weak = tx.downgrade();
    {
        let mut s = state.write().await;
        s.registry.bind(&id, role, tx);
    }
    info!("participant {} ({}) registered from {}", id, role, addr);

    let ack = OutboundEvent::Registered {
        id: id.clone(),
        role,
    };
    write.send(Message::Text(serde_json::to_string(&ack)?)).await?;

    loop {
        tokio::select! {
            // Deliveries routed to this participant.
            queued = rx.recv() => {
                match queued {
                    Some(event) => {
                        let json = serde_json::to_string(&event)?;
                        if write.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    // Registry dropped our handle: a reconnect replaced
                    // this connection.
                    None => break,
                }
            }

            // Inbound events from the participant.
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<InboundEvent>(&text) {
                            Ok(event) => {
                                let mut s = state.write().await;
                                apply_event(&mut s, &feed, event)
                            }
                            Err(e) => Some(OutboundEvent::Error {
                                message: format!("invalid message: {}", e),
                            }),
                        };
                        if let Some(reply) = reply {
                            let json = serde_json::to_string(&reply)?;
                            write.send(Message::Text(json)).await?;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("participant {} disconnected", id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("message error from {}: {}", id, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // Only clean up if the registry still points at this connection; a
    // reconnect may have already replaced our handle.
    {
        let mut s = state.write().await;
        let ours = match (weak.upgrade(), s.registry.handle(&id)) {
            (Some(tx), Some(handle)) => handle.same_channel(&tx),
            _ => false,
        };
        if ours {
            disconnect(&mut s, &feed, &id);
        }
    }

    info!("connection closed: {}", addr);
    Ok(())
}

type WsWriter = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<TcpStream>,
    Message,
>;
type WsReader = futures_util::stream::SplitStream<tokio_tungstenite::WebSocketStream<TcpStream>>;

/// Reads the registration handshake, replying with an error and None
/// when the client opens with anything else.
async fn read_register(
    write: &mut WsWriter,
    read: &mut WsReader,
) -> Result<Option<(String, Role)>, Box<dyn std::error::Error + Send + Sync>> {
    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => {
                return match serde_json::from_str::<InboundEvent>(&text) {
                    Ok(InboundEvent::Register { id, role }) => Ok(Some((id, role))),
                    _ => {
                        let err = OutboundEvent::Error {
                            message: "a register event is required before anything else".into(),
                        };
                        write
                            .send(Message::Text(serde_json::to_string(&err)?))
                            .await?;
                        Ok(None)
                    }
                };
            }
            Message::Ping(data) => {
                write.send(Message::Pong(data)).await?;
            }
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

/// Accepts query connections forever.
async fn run_query_listener(listener: TcpListener, state: SharedState, feed: MonitorFeed) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("new query connection from {}", addr);
                let state = state.clone();
                let feed = feed.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_query_connection(stream, addr, state, feed).await {
                        warn!("query connection error from {}: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("query accept error: {}", e);
            }
        }
    }
}

/// Handles a single query connection: one request in, one response out.
async fn handle_query_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: SharedState,
    feed: MonitorFeed,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!("query message error from {}: {}", addr, e);
                break;
            }
        };

        if msg.is_close() {
            break;
        }
        if msg.is_ping() {
            write.send(Message::Pong(msg.into_data())).await?;
            continue;
        }
        if msg.is_text() {
            let text = msg.to_text().unwrap_or("");
            let response = process_request(text, state.clone(), feed.clone()).await;
            let json = serde_json::to_string(&response)?;
            write.send(Message::Text(json)).await?;
        }
    }

    debug!("query connection closed: {}", addr);
    Ok(())
}

/// Parses and routes one query request.
async fn process_request(text: &str, state: SharedState, feed: MonitorFeed) -> Response {
    let request: Request = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => return Response::parse_error(),
    };

    let id = request.id.clone();
    let method = request.method.as_str();

    debug!("processing query method: {}", method);

    match method {
        "drivers.list" => handle_drivers_list(state, id).await,

        "drivers.get" => match serde_json::from_value::<DriverGetParams>(request.params) {
            Ok(params) => handle_drivers_get(state, id, params).await,
            Err(e) => Response::invalid_params(id, e.to_string()),
        },

        "drivers.updateLocation" => {
            match serde_json::from_value::<DriverUpdateParams>(request.params) {
                Ok(params) => handle_drivers_update(state, feed, id, params).await,
                Err(e) => Response::invalid_params(id, e.to_string()),
            }
        }

        "rides.list" => handle_rides_list(state, id).await,

        "rides.get" => match serde_json::from_value::<RideGetParams>(request.params) {
            Ok(params) => handle_rides_get(state, id, params).await,
            Err(e) => Response::invalid_params(id, e.to_string()),
        },

        "stats" => handle_stats(state, id).await,

        _ => Response::method_not_found(id, method),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_process_request_rejects_garbage() {
        let state = DispatchState::shared();
        let feed = MonitorFeed::new();

        let resp = process_request("not json", state.clone(), feed.clone()).await;
        assert_eq!(resp.error.unwrap().code, -32700);

        let resp = process_request(
            r#"{"id":1,"method":"teleport","params":{}}"#,
            state.clone(),
            feed.clone(),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, -32601);

        let resp = process_request(
            r#"{"id":2,"method":"drivers.get","params":{}}"#,
            state,
            feed,
        )
        .await;
        assert_eq!(resp.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_reconnect_closes_replaced_queue() {
        let state = DispatchState::shared();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let weak = tx.downgrade();
        state.write().await.registry.bind("d1", Role::Driver, tx);

        // A second connection rebinds the id, dropping the first
        // handle: the old queue closes, and the old connection's
        // cleanup check no longer matches.
        let (tx2, _rx2) = mpsc::unbounded_channel();
        state.write().await.registry.bind("d1", Role::Driver, tx2);

        assert!(rx.recv().await.is_none());
        assert!(weak.upgrade().is_none());
        assert!(state.read().await.registry.get("d1").is_some());
    }

    #[tokio::test]
    async fn test_process_request_stats_roundtrip() {
        let state = DispatchState::shared();
        let feed = MonitorFeed::new();

        let resp = process_request(r#"{"id":1,"method":"stats"}"#, state, feed).await;
        let result = resp.result.unwrap();
        assert_eq!(result["connectedParticipants"], 0);
        assert_eq!(result["pendingRides"], 0);
    }
}
