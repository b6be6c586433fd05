//! Realtime connection to the chat server.
//!
//! This module provides:
//! - The connection lifecycle, behind a [`Connector`] per platform
//! - A connection manager that hands out the live connection
//! - An event bus that multiplexes one connection among many subscribers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────┐
//! │    ConnectionManager     │        │         EventBus         │
//! │ (acquire / reconnect)    │◄───────│ emit(command)            │
//! └──────────────────────────┘        │ dispatch_frame(text)     │
//!              │                      └──────────────────────────┘
//!              ▼                                   ▲
//!      ┌──────────────┐    Inbound::Frame(id, ..)  │
//!      │  Connector   │────────────────────────────┘
//!      │ (tungstenite │     (frames of superseded
//!      │  / web_sys)  │      connections dropped)
//!      └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let (mut manager, inbound) = ConnectionManager::new(url, PlatformConnector::default());
//! let bus = EventBus::new();
//! let _sub = bus.subscribe("message", |event| { /* ... */ });
//! let conn = manager.acquire();
//! bus.emit(&conn, &ClientCommand::Ping {})?;
//! ```

pub mod bus;
pub mod connection;
mod manager;

pub use bus::{EventBus, Subscription};
pub use connection::memory::{MemoryConnector, MemoryRemote};
pub use connection::{
    Connection, ConnectionId, ConnectionState, Connector, Inbound, LinkEvents, PlatformConnector,
    SharedState, TransportLink,
};
pub use manager::ConnectionManager;
