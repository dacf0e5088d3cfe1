//! `/ws` upgrade handler and per-connection tasks
//!
//! Each upgraded socket is split in two: a writer task drains the
//! connection's outbound channel into the socket, and a listener task decodes
//! inbound frames onto the hub's ingestion channel. A writer whose socket
//! write fails evicts its connection at once. A listener that hits a read or
//! decode error just stops.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header::ORIGIN, HeaderMap},
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use url::Url;

use super::{
    connection::{Connection, ConnectionId},
    events::{WsPayload, WsResponse},
    hub::{HubError, NotificationHub},
};
use crate::{error::ApiError, state::AppState};

/// Upgrade to a notification socket after checking the `Origin` header
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(origin) = headers.get(ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !origin_allowed(origin, &state.config.public_url, &state.config.ws_allowed_origins) {
            tracing::warn!(origin = %origin, "Rejected WebSocket upgrade from foreign origin");
            return Err(ApiError::Forbidden);
        }
    }

    if state.hub.is_shut_down() {
        return Err(ApiError::ServiceUnavailable);
    }

    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub)))
}

async fn handle_socket(socket: WebSocket, hub: NotificationHub) {
    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<WsResponse>();

    // Registered before the writer starts, so a failed write always finds
    // the entry it has to evict
    let id = match hub.register(Connection::new("", tx)).await {
        Ok(id) => id,
        Err(e) => {
            tracing::info!(error = %e, "Dropping WebSocket upgraded during shutdown");
            return;
        }
    };

    tokio::spawn(write_loop(sink, rx, hub.clone(), id));
    run_listener(stream, hub, id).await;
}

/// Drain a connection's outbound channel into its socket. The first failed
/// write evicts the connection from the hub.
pub async fn write_loop<S>(
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<WsResponse>,
    hub: NotificationHub,
    id: ConnectionId,
) where
    S: Sink<Message> + Unpin,
{
    while let Some(event) = rx.recv().await {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = ?e, "Failed to serialize notification");
                continue;
            }
        };
        if sink.send(Message::Text(json)).await.is_err() {
            tracing::debug!(connection_id = %id, "Socket write failed, writer stopping");
            hub.unregister(id).await;
            break;
        }
    }
    let _ = sink.close().await;
}

/// Run [`listen`] on its own task and wait for it. Whatever happens to the
/// listener, panics included, stays confined to this connection.
pub async fn run_listener<S>(stream: S, hub: NotificationHub, id: ConnectionId)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
{
    match tokio::spawn(listen(stream, hub, id)).await {
        Ok(Ok(())) => tracing::info!(connection_id = %id, "Notification listener finished"),
        Ok(Err(e)) => tracing::info!(connection_id = %id, error = %e, "Notification listener stopped"),
        Err(e) if e.is_panic() => {
            tracing::error!(connection_id = %id, "Notification listener panicked");
        }
        Err(_) => {}
    }
}

/// Read frames until the socket closes, a frame fails to read or decode, or
/// the hub shuts down. Frames are handled strictly in arrival order.
pub async fn listen<S>(
    mut stream: S,
    hub: NotificationHub,
    id: ConnectionId,
) -> Result<(), ListenError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut shutdown = hub.shutdown_signal();
    if *shutdown.borrow() {
        return Ok(());
    }

    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = shutdown.changed() => return Ok(()),
        };

        match frame {
            None | Some(Ok(Message::Close(_))) => return Ok(()),
            Some(Err(e)) => return Err(ListenError::Read(e)),
            Some(Ok(Message::Text(text))) => {
                let payload: WsPayload = serde_json::from_str(&text)?;
                tracing::debug!(connection_id = %id, action = ?payload.action, "Notification received");
                hub.ingest(payload)?;
            }
            // Ping/pong is answered by the socket; binary frames carry nothing for us
            Some(Ok(_)) => {}
        }
    }
}

/// Whether a browser `Origin` may open a notification socket
pub fn origin_allowed(origin: &str, public_url: &str, extra: &[String]) -> bool {
    let Ok(presented) = Url::parse(origin) else {
        return false;
    };
    let presented = presented.origin();

    std::iter::once(public_url)
        .chain(extra.iter().map(String::as_str))
        .filter_map(|allowed| Url::parse(allowed).ok())
        .any(|allowed| allowed.origin() == presented)
}

#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("Socket read failed: {0}")]
    Read(axum::Error),
    #[error("Undecodable message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Hub(#[from] HubError),
}
