//! In-process transport. The remote side is driven by the caller through
//! [`MemoryRemote`], which makes the whole client usable without a network.

use std::cell::RefCell;
use std::rc::Rc;

use bubble_shared::{ClientCommand, ServerEvent};
use futures_channel::mpsc::UnboundedReceiver;

use super::{ConnectionState, Connector, LinkEvents, TransportLink};

struct RemoteEnd {
    url: String,
    outbound: UnboundedReceiver<String>,
    events: LinkEvents,
}

#[derive(Default)]
struct Shared {
    ends: Vec<RemoteEnd>,
    auto_open: bool,
}

/// Connector half, handed to the client.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Rc<RefCell<Shared>>,
}

/// Remote half: plays the server for the most recent connection.
#[derive(Clone)]
pub struct MemoryRemote {
    shared: Rc<RefCell<Shared>>,
}

impl MemoryConnector {
    /// Connections stay `connecting` until [`MemoryRemote::open`].
    pub fn new() -> (Self, MemoryRemote) {
        Self::build(false)
    }

    /// Connections open as soon as they are created.
    pub fn auto_open() -> (Self, MemoryRemote) {
        Self::build(true)
    }

    fn build(auto_open: bool) -> (Self, MemoryRemote) {
        let shared = Rc::new(RefCell::new(Shared { ends: Vec::new(), auto_open }));
        (Self { shared: shared.clone() }, MemoryRemote { shared })
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, link: TransportLink) {
        let mut shared = self.shared.borrow_mut();
        if shared.auto_open {
            link.events.opened();
        }
        shared.ends.push(RemoteEnd {
            url: link.url,
            outbound: link.outbound,
            events: link.events,
        });
    }
}

impl MemoryRemote {
    /// Number of connections opened so far.
    pub fn connection_count(&self) -> usize {
        self.shared.borrow().ends.len()
    }

    pub fn url(&self) -> Option<String> {
        self.shared.borrow().ends.last().map(|end| end.url.clone())
    }

    /// State of the most recent connection.
    pub fn state(&self) -> Option<ConnectionState> {
        self.shared.borrow().ends.last().map(|end| end.events.state())
    }

    fn with_latest(&self, f: impl FnOnce(&mut RemoteEnd)) {
        if let Some(end) = self.shared.borrow_mut().ends.last_mut() {
            f(end);
        }
    }

    /// Complete the handshake of the most recent connection.
    pub fn open(&self) {
        self.with_latest(|end| end.events.opened());
    }

    /// Drop the most recent connection from the remote side.
    pub fn close(&self, reason: &str) {
        self.with_latest(|end| end.events.closed(reason));
    }

    /// Deliver a raw text frame on the most recent connection.
    pub fn push_frame(&self, text: &str) {
        self.with_latest(|end| end.events.frame(text.to_string()));
    }

    /// Deliver a typed event on the most recent connection.
    pub fn push_event(&self, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(text) => self.push_frame(&text),
            Err(e) => crate::log_error!("cannot encode {}: {}", event.event_name(), e),
        }
    }

    /// Deliver a frame on a specific, possibly superseded, connection.
    pub fn push_frame_on(&self, index: usize, text: &str) {
        if let Some(end) = self.shared.borrow().ends.get(index) {
            end.events.frame(text.to_string());
        }
    }

    /// Frames written by the client on the most recent connection since the
    /// last call.
    pub fn take_sent(&self) -> Vec<String> {
        let mut sent = Vec::new();
        self.with_latest(|end| {
            while let Ok(Some(text)) = end.outbound.try_next() {
                sent.push(text);
            }
        });
        sent
    }

    /// Same as [`MemoryRemote::take_sent`], decoded into commands.
    pub fn take_commands(&self) -> Vec<ClientCommand> {
        self.take_sent()
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }
}
