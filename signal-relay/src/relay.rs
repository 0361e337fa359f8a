//! HTTP and WebSocket surface of the relay.
//!
//! Upgrades `GET /ws` into a signaling connection after the hub's origin
//! policy admits it, then runs one inbound loop that decodes frames and
//! dispatches them into the [`Hub`], next to the client's outbound task that
//! the hub spawned. Also serves `/health` and, optionally, a static web
//! directory.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt, future};
use signal_proto::{Message, codec};
use tower_http::services::ServeDir;

use crate::client::Client;
use crate::hub::Hub;

/// Default maximum inbound WebSocket message size in bytes (64 KB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// HTTP-level settings that are not part of the hub.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Static file directory served at `/`, mounted only if it exists.
    pub web_dir: Option<PathBuf>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            web_dir: None,
        }
    }
}

#[derive(Clone)]
struct AppState {
    hub: Arc<Hub>,
    max_message_size: usize,
}

/// Builds the axum router for `hub`.
///
/// Must be served with connect info (`into_make_service_with_connect_info`)
/// because the WebSocket handler logs the peer address.
pub fn router(hub: Arc<Hub>, options: &ServerOptions) -> axum::Router {
    let state = AppState {
        hub,
        max_message_size: options.max_message_size,
    };
    let mut app = axum::Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health));

    match &options.web_dir {
        Some(dir) if dir.is_dir() => {
            tracing::info!(dir = %dir.display(), "serving static files");
            app = app.fallback_service(ServeDir::new(dir));
        }
        Some(dir) => {
            tracing::debug!(dir = %dir.display(), "web directory not found, static files disabled");
        }
        None => {}
    }

    app.with_state(state)
}

/// Starts a relay with a fresh default [`Hub`] on the given address and
/// returns the bound address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_hub(addr, Arc::new(Hub::new()), ServerOptions::default()).await
}

/// Starts the relay around a pre-configured [`Hub`].
///
/// This is the primary entry point used by both `main.rs` and test code;
/// binding to port 0 picks a free port.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_hub(
    addr: &str,
    hub: Arc<Hub>,
    options: ServerOptions,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(hub, &options);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the relay in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port) and returns the bound address
/// and a [`tokio::task::JoinHandle`] for cleanup.
#[cfg(test)]
pub async fn start_test_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}

async fn health() -> &'static str {
    "OK"
}

/// axum handler that checks the origin policy and upgrades the request to a
/// signaling connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());

    if !state.hub.origin_policy().allows(origin, host) {
        tracing::warn!(
            remote = %remote,
            origin = origin.unwrap_or_default(),
            host = host.unwrap_or_default(),
            policy = %state.hub.origin_policy(),
            "websocket origin rejected"
        );
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    let hub = state.hub;
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, hub, remote))
        .into_response()
}

/// Runs one signaling connection until either direction ends.
///
/// The connection lifecycle:
/// 1. Register an anonymous client with the hub, which starts its outbound
///    task writing JSON text frames.
/// 2. Read frames and dispatch each decoded message in order.
/// 3. A close frame, read error, or malformed frame ends the inbound side; a
///    write failure or closed mailbox ends the outbound side.
/// 4. Whichever side ends first aborts the other, then the hub forgets the
///    client.
pub async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, remote: SocketAddr) {
    let (ws_sender, ws_receiver) = socket.split();
    let sink = ws_sender.with(|msg: Message| future::ready(encode_frame(&msg)));

    let (client, mut write_task) = hub.connect(sink);
    let conn = client.conn_id();
    tracing::info!(conn = %conn, remote = %remote, "websocket connected");

    let reader_hub = Arc::clone(&hub);
    let reader_client = Arc::clone(&client);
    let mut read_task =
        tokio::spawn(async move { read_loop(ws_receiver, &reader_hub, &reader_client).await });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    let (room, id) = client.registration().unwrap_or_default();
    hub.disconnect(&client);
    tracing::info!(conn = %conn, remote = %remote, room = %room, id = %id, "websocket disconnected");
}

/// Reads frames until the peer goes away or sends something undecodable.
async fn read_loop(mut receiver: SplitStream<WebSocket>, hub: &Hub, client: &Arc<Client>) {
    while let Some(frame) = receiver.next().await {
        let decoded = match frame {
            Ok(WsMessage::Text(text)) => codec::decode_str(text.as_str()),
            Ok(WsMessage::Binary(data)) => codec::decode(&data),
            Ok(WsMessage::Close(_)) => {
                tracing::debug!(conn = %client.conn_id(), "received close frame");
                break;
            }
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => continue,
            Err(e) => {
                tracing::warn!(conn = %client.conn_id(), error = %e, "websocket read failed");
                break;
            }
        };

        match decoded {
            Ok(msg) => hub.dispatch(client, msg),
            Err(e) => {
                let (room, id) = client.registration().unwrap_or_default();
                tracing::warn!(
                    conn = %client.conn_id(),
                    room = %room,
                    id = %id,
                    error = %e,
                    "malformed frame, closing connection"
                );
                break;
            }
        }
    }
}

fn encode_frame(msg: &Message) -> Result<WsMessage, axum::Error> {
    codec::encode(msg)
        .map(|text| WsMessage::Text(text.into()))
        .map_err(axum::Error::new)
}
