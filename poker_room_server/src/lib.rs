//! Websocket front end for poker rooms: the room directory, per-connection
//! sessions and the orchestration that turns table state changes into
//! notifications.

pub mod client;
pub mod config;
pub mod error;
pub mod room;
pub mod session;

pub use client::{Client, Clients, ConnId, Outbox};
pub use config::{RoomConfig, ServerConfig};
pub use error::{ConfigError, RoomError};
pub use room::{Flow, Room};
pub use session::{AppState, SharedState, router};
