//! Connection manager: owns the one persistent connection of a session.

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};

use super::connection::{Connection, ConnectionId, ConnectionState, Connector, Inbound};

/// Owns the lifecycle of the session's connection. `acquire` hands out the
/// live connection, or starts a new one if the previous one closed.
pub struct ConnectionManager {
    url: String,
    connector: Box<dyn Connector>,
    current: Option<Connection>,
    last_id: ConnectionId,
    inbound: UnboundedSender<Inbound>,
}

impl ConnectionManager {
    /// Create a manager and the receiver on which all of its connections
    /// report frames and lifecycle changes.
    pub fn new(
        url: impl Into<String>,
        connector: impl Connector + 'static,
    ) -> (Self, UnboundedReceiver<Inbound>) {
        let (inbound, receiver) = unbounded();
        let manager = Self {
            url: url.into(),
            connector: Box::new(connector),
            current: None,
            last_id: 0,
            inbound,
        };
        (manager, receiver)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The live connection, reconnecting if there is none or it closed.
    /// Callers must not cache the result across suspected disconnects.
    pub fn acquire(&mut self) -> Connection {
        if let Some(conn) = &self.current {
            if !conn.state().is_closed() {
                return conn.clone();
            }
        }

        self.last_id += 1;
        let (conn, link) = Connection::pair(self.last_id, &self.url, self.inbound.clone());
        crate::log_info!("Connecting to {} (connection #{})", self.url, self.last_id);
        self.current = Some(conn.clone());
        self.connector.connect(link);
        conn
    }

    /// The current connection without reconnecting.
    pub fn current(&self) -> Option<&Connection> {
        self.current.as_ref()
    }

    /// State of the current connection; `closed` if there never was one.
    pub fn state(&self) -> ConnectionState {
        self.current
            .as_ref()
            .map(Connection::state)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Whether `id` names the current connection.
    pub fn is_current(&self, id: ConnectionId) -> bool {
        self.current.as_ref().is_some_and(|conn| conn.id() == id)
    }

    /// Close the current connection and report it closed on the inbound
    /// channel. The next `acquire` reconnects. Returns `false` if there was
    /// no live connection to close.
    pub fn close(&mut self) -> bool {
        let Some(conn) = self.current.as_ref().filter(|c| !c.state().is_closed()) else {
            return false;
        };
        crate::log_info!("Closing connection #{}", conn.id());
        conn.close();
        self.report_closed(conn.id(), "closed by client");
        true
    }

    /// Report the current connection closed again without touching it, so a
    /// receiver waiting on the inbound channel wakes up.
    pub fn interrupt(&self, reason: &str) {
        self.report_closed(self.last_id, reason);
    }

    fn report_closed(&self, id: ConnectionId, reason: &str) {
        let _ = self.inbound.unbounded_send(Inbound::Closed {
            id,
            reason: reason.to_string(),
        });
    }
}
