//! A single persistent connection: lifecycle state, send handle and the
//! seam to platform transports.
//!
//! This module provides the shared types and conditionally includes
//! the platform-specific implementation.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::error::SyncError;

pub mod memory;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Connecting => 0,
            ConnectionState::Open => 1,
            ConnectionState::Closed => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }
}

/// State cell shared between a [`Connection`] handle and its transport task,
/// so senders see the transport's view without waiting for the pump.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub fn new(state: ConnectionState) -> Self {
        Self(Arc::new(AtomicU8::new(state.to_u8())))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn swap(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(state.to_u8(), Ordering::AcqRel))
    }
}

/// Monotonic id of a connection within one client session.
pub type ConnectionId = u64;

/// Notifications from transports to the client, tagged with the connection
/// they came from so that notifications of a superseded connection can be
/// told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Opened(ConnectionId),
    Frame(ConnectionId, String),
    Closed { id: ConnectionId, reason: String },
}

impl Inbound {
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            Inbound::Opened(id) | Inbound::Frame(id, _) | Inbound::Closed { id, .. } => *id,
        }
    }
}

/// Reporting side of a transport. Cheap to clone into callbacks.
#[derive(Debug, Clone)]
pub struct LinkEvents {
    id: ConnectionId,
    state: SharedState,
    inbound: UnboundedSender<Inbound>,
}

impl LinkEvents {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// The handshake completed.
    pub fn opened(&self) {
        if self.state.swap(ConnectionState::Open) == ConnectionState::Connecting {
            let _ = self.inbound.unbounded_send(Inbound::Opened(self.id));
        }
    }

    /// A text frame arrived.
    pub fn frame(&self, text: String) {
        if !self.state.get().is_closed() {
            let _ = self.inbound.unbounded_send(Inbound::Frame(self.id, text));
        }
    }

    /// The connection ended. Reported at most once.
    pub fn closed(&self, reason: impl Into<String>) {
        if self.state.swap(ConnectionState::Closed) != ConnectionState::Closed {
            let _ = self.inbound.unbounded_send(Inbound::Closed {
                id: self.id,
                reason: reason.into(),
            });
        }
    }
}

/// Everything a transport needs to run one connection.
#[derive(Debug)]
pub struct TransportLink {
    pub url: String,
    /// Serialized frames to write, in order. Ends when the client closes.
    pub outbound: UnboundedReceiver<String>,
    pub events: LinkEvents,
}

/// Platform transport. `connect` must not block: progress is reported
/// through [`TransportLink::events`].
pub trait Connector {
    fn connect(&self, link: TransportLink);
}

/// Handle to one connection. Clones refer to the same connection.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    url: String,
    state: SharedState,
    outbound: UnboundedSender<String>,
}

impl Connection {
    /// Create a handle in the `connecting` state and the link its transport
    /// will drive.
    pub(crate) fn pair(
        id: ConnectionId,
        url: &str,
        inbound: UnboundedSender<Inbound>,
    ) -> (Self, TransportLink) {
        let (outbound_tx, outbound_rx) = futures_channel::mpsc::unbounded();
        let state = SharedState::new(ConnectionState::Connecting);
        let connection = Self {
            id,
            url: url.to_string(),
            state: state.clone(),
            outbound: outbound_tx,
        };
        let link = TransportLink {
            url: url.to_string(),
            outbound: outbound_rx,
            events: LinkEvents { id, state, inbound },
        };
        (connection, link)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Queue a text frame. Fails with [`SyncError::NotReady`] unless open.
    pub fn send_text(&self, text: String) -> Result<(), SyncError> {
        if !self.state().is_open() {
            return Err(SyncError::NotReady);
        }
        self.outbound
            .unbounded_send(text)
            .map_err(|_| SyncError::NotReady)
    }

    /// Close from the client side. Sends fail from here on, and the
    /// transport winds down once it sees the outbound stream end.
    pub fn close(&self) {
        self.state.swap(ConnectionState::Closed);
        self.outbound.close_channel();
    }
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
pub use connection_wasm::WasmConnector as PlatformConnector;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub use connection_native::NativeConnector as PlatformConnector;

#[cfg(test)]
mod tests {
    use super::*;
    use futures_channel::mpsc::unbounded;

    #[test]
    fn send_requires_open() {
        let (tx, _rx) = unbounded();
        let (conn, mut link) = Connection::pair(1, "ws://x", tx);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(conn.send_text("a".into()), Err(SyncError::NotReady));

        link.events.opened();
        assert!(conn.send_text("b".into()).is_ok());
        assert_eq!(link.outbound.try_next().unwrap(), Some("b".to_string()));

        link.events.closed("bye");
        assert_eq!(conn.send_text("c".into()), Err(SyncError::NotReady));
        assert!(link.outbound.try_next().is_err());
    }

    #[test]
    fn lifecycle_notifications_are_reported_once() {
        let (tx, mut rx) = unbounded();
        let (_conn, link) = Connection::pair(7, "ws://x", tx);
        link.events.opened();
        link.events.opened();
        link.events.frame("f".into());
        link.events.closed("gone");
        link.events.closed("gone again");
        link.events.frame("late".into());

        let mut seen = Vec::new();
        while let Ok(Some(inbound)) = rx.try_next() {
            seen.push(inbound);
        }
        assert_eq!(
            seen,
            vec![
                Inbound::Opened(7),
                Inbound::Frame(7, "f".into()),
                Inbound::Closed { id: 7, reason: "gone".into() },
            ]
        );
    }

    #[test]
    fn close_ends_outbound_stream() {
        let (tx, _rx) = unbounded();
        let (conn, mut link) = Connection::pair(1, "ws://x", tx);
        link.events.opened();
        conn.close();
        assert_eq!(link.outbound.try_next().unwrap(), None);
        assert_eq!(conn.send_text("x".into()), Err(SyncError::NotReady));
    }
}
