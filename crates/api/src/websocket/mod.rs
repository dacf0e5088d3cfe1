//! Real-time notifications over WebSocket
//!
//! - **Connection**: registry entry for one upgraded socket
//! - **Hub**: registry, ingestion channel and the single dispatcher
//! - **Handler**: `/ws` upgrade, origin check and per-socket tasks
//! - **Events**: inbound and outbound JSON shapes

pub mod connection;
pub mod events;
pub mod handler;
pub mod hub;

pub use connection::{Connection, ConnectionId};
pub use events::{ClientAction, WsPayload, WsResponse};
pub use handler::ws_handler;
pub use hub::{HubError, NotificationHub};
