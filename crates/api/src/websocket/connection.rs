//! A registered notification connection

use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::WsResponse;

pub type ConnectionId = Uuid;

/// Registry entry for one upgraded socket.
///
/// The socket itself is owned by a writer task that drains `sender`'s
/// channel; once that task stops (its socket write failed) the channel
/// closes and further sends fail.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,

    /// Free-form label, currently always empty
    pub label: String,

    sender: mpsc::UnboundedSender<WsResponse>,
}

impl Connection {
    pub fn new(label: impl Into<String>, sender: mpsc::UnboundedSender<WsResponse>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            sender,
        }
    }

    /// Queue an event for this connection's writer
    #[allow(clippy::result_large_err)]
    pub fn send(&self, event: WsResponse) -> Result<(), mpsc::error::SendError<WsResponse>> {
        self.sender.send(event)
    }
}
