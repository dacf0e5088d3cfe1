//! Notification hub: connection registry, ingestion channel and dispatcher
//!
//! One hub is built at startup and shared by handle. Connection setup
//! registers into it, socket listeners and admin handlers ingest into it, and
//! a single dispatcher task turns ingested payloads into broadcasts.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::connection::{Connection, ConnectionId};
use super::events::{ClientAction, WsPayload, WsResponse};

/// Shared handle to the notification hub
#[derive(Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    ingest_tx: mpsc::UnboundedSender<WsPayload>,
    /// Taken by the one dispatcher task
    ingest_rx: Mutex<Option<mpsc::UnboundedReceiver<WsPayload>>>,
    shutdown: watch::Sender<bool>,
}

impl NotificationHub {
    pub fn new() -> Self {
        let (ingest_tx, ingest_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(HubInner {
                connections: RwLock::new(HashMap::new()),
                ingest_tx,
                ingest_rx: Mutex::new(Some(ingest_rx)),
                shutdown,
            }),
        }
    }

    /// Add a connection and greet it.
    ///
    /// The shutdown flag is checked under the registry lock, so a connection
    /// is either refused here or cleared by `shutdown`.
    pub async fn register(&self, conn: Connection) -> Result<ConnectionId, HubError> {
        let id = conn.id;
        let mut connections = self.inner.connections.write().await;
        if self.is_shut_down() {
            return Err(HubError::ShutDown);
        }

        if conn.send(WsResponse::greeting()).is_err() {
            tracing::debug!(connection_id = %id, "Greeting not delivered, writer already gone");
        }
        connections.insert(id, conn);

        tracing::info!(
            connection_id = %id,
            total_connections = connections.len(),
            "Notification connection registered"
        );
        Ok(id)
    }

    /// Drop a connection whose socket can no longer be written to
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.inner.connections.write().await.remove(&id).is_some();
        if removed {
            tracing::info!(connection_id = %id, "Evicted notification connection after failed write");
        }
        removed
    }

    /// Place a payload on the ingestion channel
    pub fn ingest(&self, payload: WsPayload) -> Result<(), HubError> {
        if self.is_shut_down() {
            return Err(HubError::ShutDown);
        }
        self.inner
            .ingest_tx
            .send(payload)
            .map_err(|_| HubError::ShutDown)
    }

    /// Queue `event` for every registered connection, evicting the ones whose
    /// writer has gone away. Returns how many connections accepted it.
    ///
    /// A writer that fails the actual socket write evicts itself through
    /// [`NotificationHub::unregister`].
    pub async fn broadcast(&self, event: &WsResponse) -> usize {
        let (attempted, failed): (usize, Vec<ConnectionId>) = {
            let connections = self.inner.connections.read().await;
            let failed = connections
                .values()
                .filter(|conn| conn.send(event.clone()).is_err())
                .map(|conn| conn.id)
                .collect();
            (connections.len(), failed)
        };

        if !failed.is_empty() {
            let mut connections = self.inner.connections.write().await;
            for id in &failed {
                if connections.remove(id).is_some() {
                    tracing::info!(connection_id = %id, "Evicted notification connection after failed write");
                }
            }
        }
        let delivered = attempted - failed.len();

        tracing::debug!(
            action = %event.action,
            delivered,
            evicted = failed.len(),
            "Broadcast complete"
        );
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    /// Interpret one ingested payload
    pub async fn dispatch(&self, payload: WsPayload) {
        match payload.action {
            ClientAction::DeleteUser => {
                tracing::info!(user_id = payload.user_id, "Broadcasting logout for deleted user");
                self.broadcast(&WsResponse::logout(payload.user_id)).await;
            }
            ClientAction::Unknown => {
                tracing::debug!(message_type = %payload.message_type, "Ignoring unknown action");
            }
        }
    }

    /// Start the dispatcher. Only the first call gets the ingestion channel;
    /// later calls return `None`.
    pub async fn spawn_dispatcher(&self) -> Option<JoinHandle<()>> {
        let mut rx = self.inner.ingest_rx.lock().await.take()?;
        let mut shutdown = self.shutdown_signal();
        let hub = self.clone();

        Some(tokio::spawn(async move {
            tracing::info!("Notification dispatcher started");
            loop {
                tokio::select! {
                    payload = rx.recv() => match payload {
                        Some(payload) => hub.dispatch(payload).await,
                        None => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
            tracing::info!("Notification dispatcher stopped");
        }))
    }

    /// Receiver that flips to `true` when the hub shuts down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Stop the dispatcher and every listener, and drop all connections.
    ///
    /// Dropping a connection closes its outbound channel, which ends its
    /// writer task and with it the socket.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);

        let mut connections = self.inner.connections.write().await;
        let closed = connections.len();
        connections.clear();

        tracing::info!(closed_connections = closed, "Notification hub shut down");
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Notification hub is shut down")]
    ShutDown,
}
