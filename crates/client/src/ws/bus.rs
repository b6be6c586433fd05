//! Event bus: serializes outgoing commands onto the connection and fans
//! incoming events out to subscribers by event name.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use bubble_shared::{ClientCommand, ServerEvent};

use super::connection::Connection;
use crate::error::SyncError;

type Handler = Rc<dyn Fn(&ServerEvent)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    /// Handlers per event name, in subscription order.
    handlers: HashMap<String, Vec<(u64, Handler)>>,
}

impl Registry {
    fn remove(&mut self, event: &str, id: u64) {
        if let Some(list) = self.handlers.get_mut(event) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                self.handlers.remove(event);
            }
        }
    }
}

/// Publish/subscribe over the shared connection. Clones share handlers.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events named `event`. Handlers for the same
    /// name run in subscription order. The handler stays registered until
    /// the returned [`Subscription`] is dropped.
    pub fn subscribe(
        &self,
        event: &str,
        handler: impl Fn(&ServerEvent) + 'static,
    ) -> Subscription {
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Rc::new(handler)));
        Subscription {
            registry: Rc::downgrade(&self.registry),
            event: event.to_string(),
            id,
        }
    }

    /// Number of live handlers for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.registry
            .borrow()
            .handlers
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Serialize `command` and write it to `conn`.
    pub fn emit(&self, conn: &Connection, command: &ClientCommand) -> Result<(), SyncError> {
        if !conn.state().is_open() {
            crate::log_warn!("Not sending {}: connection #{} not open", command.event_name(), conn.id());
            return Err(SyncError::NotReady);
        }
        let text = command.encode()?;
        conn.send_text(text)
    }

    /// Decode a text frame and dispatch it. Malformed frames and payloads
    /// that fail validation are logged and dropped. Returns the number of
    /// handlers invoked.
    pub fn dispatch_frame(&self, text: &str) -> usize {
        match ServerEvent::decode(text) {
            Ok(event) => self.dispatch(&event),
            Err(e) => {
                crate::log_warn!("Dropping inbound frame: {}", e);
                0
            }
        }
    }

    /// Invoke every handler subscribed to the event's name. Handlers
    /// subscribed or released during dispatch take effect from the next event.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let handlers: Vec<Handler> = self
            .registry
            .borrow()
            .handlers
            .get(event.event_name())
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            crate::log_debug!("No subscribers for {}", event.event_name());
        }
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

/// Registration handle. Dropping it removes exactly its own handler.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    registry: Weak<RefCell<Registry>>,
    event: String,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove the handler now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the handler registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.registry = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove(&self.event, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}
