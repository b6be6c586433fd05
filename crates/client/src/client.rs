//! The sync client: one connection, one event bus and the state of the
//! active room, wired together.
//!
//! All state lives on one thread. Inbound frames are applied in arrival
//! order, either by [`SyncClient::pump`] (drain what is queued) or by the
//! [`SyncClient::run`] driver, which also reconnects with backoff.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bubble_shared::event_names as events;
use bubble_shared::{
    ClientCommand, InviteServer, Message, MessageDeletedPayload, MessageEditedPayload, MessageId,
    NotificationPayload, PresenceStatus, RoomId, RosterEntry, ServerEvent, ServerResponsePayload,
    ServerSummary,
};
use futures_channel::mpsc::UnboundedReceiver;
use futures_util::StreamExt;

use crate::api_client::ApiClient;
use crate::composer::detect_link;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::notify::{self, Notice, Notifier, PlatformNotifier};
use crate::storage::{LocalTokenStore, TokenStore};
use crate::stores::{ActiveRoom, AppendOutcome, Generation, PresenceChange};
use crate::ws::{
    ConnectionManager, ConnectionState, Connector, EventBus, Inbound, PlatformConnector,
    Subscription,
};

/// Handle to one room activation. Fetch results are applied only while it
/// is still the current activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub room: RoomId,
    pub generation: Generation,
}

/// Session state mutated by the core event handlers.
#[derive(Debug)]
struct SessionState {
    active: Option<ActiveRoom>,
    generation: Generation,
    focused: bool,
    /// Display name of the logged-in user, from `return_user`.
    current_user: Option<String>,
    servers: Vec<ServerSummary>,
    last_invite: Option<Result<InviteServer, String>>,
    last_error: Option<String>,
    /// Rooms to join once the current dispatch finishes.
    pending_joins: Vec<RoomId>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            active: None,
            generation: 0,
            focused: true,
            current_user: None,
            servers: Vec::new(),
            last_invite: None,
            last_error: None,
            pending_joins: Vec::new(),
        }
    }
}

impl SessionState {
    fn active_for(&mut self, room: Option<&RoomId>) -> Option<&mut ActiveRoom> {
        let active = self.active.as_mut()?;
        match room {
            Some(room) if !active.is(room) => {
                crate::log_debug!("Ignoring event for room {} (active: {})", room, active.room);
                None
            }
            _ => Some(active),
        }
    }

    fn on_message(&mut self, message: &Message) {
        let Some(active) = self.active_for(Some(&message.room_id)) else {
            return;
        };
        if active.timeline.append(message.clone()) == AppendOutcome::Duplicate {
            crate::log_debug!("Duplicate message {}", message.id);
        }
    }

    fn on_edited(&mut self, payload: &MessageEditedPayload) {
        if let Some(active) = self.active_for(payload.room_id.as_ref()) {
            active.timeline.edit_in_place(payload.id, &payload.content);
        }
    }

    fn on_deleted(&mut self, payload: &MessageDeletedPayload) {
        if let Some(active) = self.active_for(payload.room_id.as_ref()) {
            if active.timeline.remove(payload.id).is_none() {
                crate::log_debug!("Delete for unknown message {}", payload.id);
            }
        }
    }

    fn upsert_server(&mut self, summary: ServerSummary) {
        match self
            .servers
            .iter_mut()
            .find(|s| s.server_id == summary.server_id)
        {
            Some(existing) => *existing = summary,
            None => self.servers.push(summary),
        }
    }

    fn on_creation(&mut self, payload: &ServerResponsePayload) {
        match payload.summary() {
            Some(summary) => {
                crate::log_info!("Created room {} ({})", summary.name, summary.server_id);
                self.pending_joins.push(summary.server_id.clone());
                self.upsert_server(summary);
            }
            None => self.fail(payload, "Server creation failed"),
        }
    }

    fn on_server_response(&mut self, payload: &ServerResponsePayload) {
        match payload.summary() {
            Some(summary) => self.upsert_server(summary),
            None if payload.is_success() => {}
            None => self.fail(payload, "Could not join server"),
        }
    }

    fn fail(&mut self, payload: &ServerResponsePayload, fallback: &str) {
        let conflict = payload
            .server
            .as_ref()
            .and_then(|s| s.get("message"))
            .and_then(|m| m.as_str());
        let message = payload
            .message
            .as_deref()
            .or(conflict)
            .unwrap_or(fallback)
            .to_string();
        crate::log_warn!("{}", message);
        self.last_error = Some(message);
    }

    fn on_invite(&mut self, server: Result<&InviteServer, &str>) {
        match server {
            Ok(server) => {
                crate::log_info!("Invite resolved to {}", server.sid);
                self.pending_joins.push(server.sid.clone());
                self.last_invite = Some(Ok(server.clone()));
            }
            Err(reason) => {
                crate::log_warn!("Invite failed: {}", reason);
                self.last_invite = Some(Err(reason.to_string()));
            }
        }
    }

    fn on_notification(&self, payload: &NotificationPayload) -> Option<Notice> {
        let active = self.active.as_ref().map(|a| &a.room);
        notify::decide(payload, active, self.focused)
    }
}

/// Subscribe a handler that mutates the session state.
fn on_state(
    bus: &EventBus,
    event: &str,
    state: &Rc<RefCell<SessionState>>,
    handler: impl Fn(&mut SessionState, &ServerEvent) + 'static,
) -> Subscription {
    let state = state.clone();
    bus.subscribe(event, move |e| handler(&mut state.borrow_mut(), e))
}

fn register_core(
    bus: &EventBus,
    state: &Rc<RefCell<SessionState>>,
    notifier: &Rc<dyn Notifier>,
) -> Vec<Subscription> {
    let mut subs = vec![
        on_state(bus, events::MESSAGE, state, |s, e| {
            if let ServerEvent::Message(m) = e {
                s.on_message(m);
            }
        }),
        on_state(bus, events::MESSAGE_EDITED, state, |s, e| {
            if let ServerEvent::MessageEdited(p) = e {
                s.on_edited(p);
            }
        }),
        on_state(bus, events::MESSAGE_DELETED, state, |s, e| {
            if let ServerEvent::MessageDeleted(p) = e {
                s.on_deleted(p);
            }
        }),
        // Presence updates carry no room id; they apply to the active roster.
        on_state(bus, events::UPDATE, state, |s, e| {
            if let ServerEvent::Update(p) = e {
                if let Some(active) = s.active.as_mut() {
                    let change = active.roster.apply(&p.update);
                    if change.is_change() || change == PresenceChange::Queued {
                        crate::log_debug!("{} is {} ({:?})", p.update.user_id, p.update.status, change);
                    }
                }
            }
        }),
        on_state(bus, events::RETURN_USER, state, |s, e| {
            if let ServerEvent::ReturnUser(p) = e {
                s.current_user = Some(p.display_name.clone());
            }
        }),
        on_state(bus, events::INVITE, state, |s, e| {
            if let ServerEvent::Invite(p) = e {
                s.on_invite(p.outcome());
            }
        }),
        on_state(bus, events::CREATION_RESPONSE, state, |s, e| {
            if let ServerEvent::CreationResponse(p) = e {
                s.on_creation(p);
            }
        }),
        on_state(bus, events::SERVER_RESPONSE, state, |s, e| {
            if let ServerEvent::ServerResponse(p) = e {
                s.on_server_response(p);
            }
        }),
        on_state(bus, events::ERROR, state, |s, e| {
            if let ServerEvent::Error(p) = e {
                crate::log_warn!("Server error: {}", p.message);
                s.last_error = Some(p.message.clone());
            }
        }),
    ];

    subs.push(bus.subscribe(events::ACK, |e| {
        if let ServerEvent::Ack(p) = e {
            crate::log_debug!("ack: {}", p.message);
        }
    }));
    subs.push(bus.subscribe(events::PONG, |_| crate::log_debug!("pong")));

    let state = state.clone();
    let notifier = notifier.clone();
    subs.push(bus.subscribe(events::NOTIFICATION, move |e| {
        if let ServerEvent::Notification(p) = e {
            let notice = state.borrow().on_notification(p);
            if let Some(notice) = notice {
                notifier.show(notice);
            }
        }
    }));

    subs
}

/// Realtime sync core of the chat client.
pub struct SyncClient {
    config: SyncConfig,
    manager: RefCell<ConnectionManager>,
    inbound: RefCell<Option<UnboundedReceiver<Inbound>>>,
    bus: EventBus,
    state: Rc<RefCell<SessionState>>,
    tokens: Rc<dyn TokenStore>,
    reconnect_attempts: Cell<u32>,
    shutting_down: Cell<bool>,
    _core: Vec<Subscription>,
}

impl SyncClient {
    pub fn new(
        config: SyncConfig,
        connector: impl Connector + 'static,
        tokens: Rc<dyn TokenStore>,
        notifier: Rc<dyn Notifier>,
    ) -> Self {
        let (manager, inbound) = ConnectionManager::new(config.endpoint.ws_url(), connector);
        let bus = EventBus::new();
        let state = Rc::new(RefCell::new(SessionState::default()));
        let core = register_core(&bus, &state, &notifier);
        Self {
            config,
            manager: RefCell::new(manager),
            inbound: RefCell::new(Some(inbound)),
            bus,
            state,
            tokens,
            reconnect_attempts: Cell::new(0),
            shutting_down: Cell::new(false),
            _core: core,
        }
    }

    /// Client with the platform transport, persistent token store and
    /// platform notifier.
    pub fn for_platform(config: SyncConfig) -> Self {
        Self::new(
            config,
            PlatformConnector::default(),
            Rc::new(LocalTokenStore::new()),
            Rc::new(PlatformNotifier::default()),
        )
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The bus, for additional subscribers.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn tokens(&self) -> &Rc<dyn TokenStore> {
        &self.tokens
    }

    // --- Connection ---

    /// Start connecting if there is no live connection.
    pub fn connect(&self) -> ConnectionState {
        self.manager.borrow_mut().acquire().state()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.borrow().state()
    }

    /// Apply one transport notification. Notifications from superseded
    /// connections are ignored.
    pub fn handle_inbound(&self, inbound: Inbound) {
        let id = inbound.connection_id();
        if !self.manager.borrow().is_current(id) {
            crate::log_debug!("Ignoring notification from superseded connection #{}", id);
            return;
        }

        match inbound {
            Inbound::Opened(_) => {
                crate::log_info!("Connection #{} open", id);
                self.reconnect_attempts.set(0);
                if self.state.borrow().active.is_some() {
                    self.announce();
                }
            }
            Inbound::Frame(_, text) => {
                self.bus.dispatch_frame(&text);
                self.run_followups();
            }
            Inbound::Closed { reason, .. } => {
                crate::log_warn!("Connection #{} closed: {}", id, reason);
            }
        }
    }

    /// Apply every queued transport notification. Returns how many were
    /// handled.
    pub fn pump(&self) -> usize {
        let mut handled = 0;
        loop {
            let next = match self.inbound.borrow_mut().as_mut() {
                Some(receiver) => receiver.try_next(),
                None => return handled,
            };
            match next {
                Ok(Some(inbound)) => {
                    self.handle_inbound(inbound);
                    handled += 1;
                }
                _ => return handled,
            }
        }
    }

    /// Drive the connection until [`SyncClient::shutdown`]: apply inbound
    /// notifications as they arrive and reconnect with backoff when the
    /// connection drops and `auto_reconnect` is set.
    pub async fn run(&self) {
        let Some(mut inbound) = self.inbound.borrow_mut().take() else {
            crate::log_warn!("SyncClient::run called while already running");
            return;
        };
        self.connect();

        while let Some(notification) = inbound.next().await {
            let dropped = matches!(&notification, Inbound::Closed { id, .. }
                if self.manager.borrow().is_current(*id));
            self.handle_inbound(notification);

            if self.shutting_down.get() {
                break;
            }
            if dropped && self.config.auto_reconnect {
                let attempt = self.reconnect_attempts.get();
                if self.config.reconnect.exhausted(attempt) {
                    // The next send re-acquires.
                    crate::log_error!("Giving up reconnecting after {} attempts", attempt);
                    continue;
                }
                let delay = self.config.reconnect.delay_for_attempt(attempt);
                self.reconnect_attempts.set(attempt + 1);
                crate::log_info!("Reconnecting in {}ms (attempt {})", delay, attempt + 1);
                sleep_ms(delay).await;
                if self.shutting_down.get() {
                    break;
                }
                self.connect();
            }
        }

        *self.inbound.borrow_mut() = Some(inbound);
    }

    /// Report the user offline and close the connection.
    pub fn shutdown(&self) {
        if self.connection_state().is_open() {
            if let Err(e) = self.update_status(PresenceStatus::Offline) {
                crate::log_debug!("Could not report offline: {}", e);
            }
        }
        self.shutting_down.set(true);
        let mut manager = self.manager.borrow_mut();
        if !manager.close() {
            // Nothing left to close; still wake a parked driver.
            manager.interrupt("shutdown");
        }
    }

    fn run_followups(&self) {
        let joins = std::mem::take(&mut self.state.borrow_mut().pending_joins);
        for room in joins {
            if let Err(e) = self.join_server(&room) {
                crate::log_warn!("Could not join {}: {}", room, e);
            }
        }
    }

    // --- Sending ---

    fn token(&self) -> Result<String, SyncError> {
        self.tokens.token().ok_or(SyncError::NotAuthenticated)
    }

    fn active_room_id(&self) -> Result<RoomId, SyncError> {
        self.state
            .borrow()
            .active
            .as_ref()
            .map(|a| a.room.clone())
            .ok_or(SyncError::NoActiveRoom)
    }

    fn send(&self, command: &ClientCommand) -> Result<(), SyncError> {
        if self.shutting_down.get() {
            return Err(SyncError::NotReady);
        }
        let conn = self.manager.borrow_mut().acquire();
        self.bus.emit(&conn, command)
    }

    /// Send a command that carries the session token. Readiness is checked
    /// before the token is read.
    fn send_authorized(
        &self,
        build: impl FnOnce(String) -> ClientCommand,
    ) -> Result<(), SyncError> {
        if self.shutting_down.get() {
            return Err(SyncError::NotReady);
        }
        let conn = self.manager.borrow_mut().acquire();
        if !conn.state().is_open() {
            return Err(SyncError::NotReady);
        }
        let command = build(self.token()?);
        self.bus.emit(&conn, &command)
    }

    pub fn verify_invite(&self, code: &str) -> Result<(), SyncError> {
        self.send(&ClientCommand::VerifyInvite {
            code: code.to_string(),
        })
    }

    pub fn join_server(&self, room: &RoomId) -> Result<(), SyncError> {
        self.send_authorized(|token| ClientCommand::JoinServer {
            token,
            sid: room.clone(),
        })
    }

    pub fn create_server(&self, name: &str) -> Result<(), SyncError> {
        self.send_authorized(|auth| ClientCommand::CreateServer {
            auth,
            server_name: name.to_string(),
        })
    }

    /// Post `text` to the active room and ask the server to notify the
    /// room's other members.
    pub fn send_message(&self, text: &str) -> Result<(), SyncError> {
        let sid = self.active_room_id()?;
        self.schedule_notification(text)?;
        self.send_authorized(|token| ClientCommand::SendMessage {
            token,
            sid,
            message: text.to_string(),
            link: detect_link(text),
        })
    }

    /// Edit one of the user's own messages. Returns `false` without sending
    /// when `id` is unknown or written by someone else.
    pub fn edit_message(&self, id: MessageId, content: &str) -> Result<bool, SyncError> {
        if !self.can_modify(id) {
            crate::log_debug!("Not editing message {}: not own or unknown", id);
            return Ok(false);
        }
        self.send_authorized(|auth| ClientCommand::EditMessage {
            auth,
            message_id: id.to_string(),
            content: content.to_string(),
        })?;
        Ok(true)
    }

    /// Delete one of the user's own messages. Returns `false` without
    /// sending when `id` is unknown or written by someone else.
    pub fn delete_message(&self, id: MessageId) -> Result<bool, SyncError> {
        if !self.can_modify(id) {
            crate::log_debug!("Not deleting message {}: not own or unknown", id);
            return Ok(false);
        }
        self.send_authorized(|auth| ClientCommand::DeleteMessage {
            auth,
            message_id: id.to_string(),
        })?;
        Ok(true)
    }

    pub fn reply_to_message(&self, id: MessageId, content: &str) -> Result<(), SyncError> {
        let sid = self.active_room_id()?;
        self.send_authorized(|token| ClientCommand::ReplyToMessage {
            token,
            ref_id: id.to_string(),
            content: content.to_string(),
            sid,
        })
    }

    pub fn update_status(&self, status: PresenceStatus) -> Result<(), SyncError> {
        self.send_authorized(|auth| ClientCommand::UpdateStatus { auth, status })
    }

    pub fn get_user(&self) -> Result<(), SyncError> {
        self.send_authorized(|token| ClientCommand::GetUser { token })
    }

    pub fn schedule_notification(&self, content: &str) -> Result<(), SyncError> {
        let sid = self.active_room_id()?;
        self.send_authorized(|token| ClientCommand::ScheduleNotification {
            token,
            content: content.to_string(),
            sid,
        })
    }

    pub fn ping(&self) -> Result<(), SyncError> {
        self.send(&ClientCommand::Ping {})
    }

    // --- Rooms ---

    /// Make `room` the active room. Events for other rooms are filtered from
    /// here on, and fetches started for an earlier activation are discarded.
    pub fn activate_room(&self, room: RoomId) -> Activation {
        let activation = {
            let mut state = self.state.borrow_mut();
            state.generation += 1;
            let generation = state.generation;
            state.active = Some(ActiveRoom::new(room.clone(), generation));
            Activation { room, generation }
        };
        crate::log_info!("Active room {} (generation {})", activation.room, activation.generation);
        self.announce();
        activation
    }

    /// Report the user online and ask for its profile. Failures are logged;
    /// the same happens again when the connection opens.
    fn announce(&self) {
        let result = self
            .update_status(PresenceStatus::Online)
            .and_then(|()| self.get_user());
        if let Err(e) = result {
            crate::log_debug!("Skipping status announcement: {}", e);
        }
    }

    pub fn leave_room(&self) {
        let mut state = self.state.borrow_mut();
        state.generation += 1;
        state.active = None;
    }

    fn with_activation<R>(
        &self,
        activation: &Activation,
        f: impl FnOnce(&mut ActiveRoom) -> R,
    ) -> Option<R> {
        let mut state = self.state.borrow_mut();
        match state.active.as_mut() {
            Some(active) if active.generation == activation.generation => Some(f(active)),
            _ => {
                crate::log_debug!(
                    "Discarding result for {} (stale generation {})",
                    activation.room,
                    activation.generation
                );
                None
            }
        }
    }

    /// Apply a roster fetch. Returns `false` if the activation is stale.
    pub fn apply_roster(&self, activation: &Activation, roster: Vec<RosterEntry>) -> bool {
        self.with_activation(activation, |active| active.roster.seed(roster))
            .is_some()
    }

    /// Apply a history fetch. Returns `false` if the activation is stale.
    pub fn apply_history(&self, activation: &Activation, history: Vec<Message>) -> bool {
        self.with_activation(activation, |active| {
            active.timeline.replace_history(history);
        })
        .is_some()
    }

    /// Activate `room` and load its roster and history. A failed fetch
    /// settles that part as empty so live events are applied from then on;
    /// the first failure is returned after both fetches were tried.
    pub async fn load_room(&self, api: &ApiClient, room: RoomId) -> Result<Activation, SyncError> {
        let activation = self.activate_room(room);
        let mut failure = None;

        let roster = api.fetch_roster(&activation.room).await.unwrap_or_else(|e| {
            crate::log_warn!("Roster fetch for {} failed: {}", activation.room, e);
            if failure.is_none() {
                failure = Some(e);
            }
            Vec::new()
        });
        self.apply_roster(&activation, roster);

        let history = api.fetch_messages(&activation.room).await.unwrap_or_else(|e| {
            crate::log_warn!("History fetch for {} failed: {}", activation.room, e);
            if failure.is_none() {
                failure = Some(e);
            }
            Vec::new()
        });
        self.apply_history(&activation, history);

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(activation),
        }
    }

    pub fn set_servers(&self, servers: Vec<ServerSummary>) {
        self.state.borrow_mut().servers = servers;
    }

    // --- Focus ---

    /// Record whether the window has input focus. Takes effect on the
    /// notification gate immediately.
    pub fn set_focus(&self, focused: bool) {
        self.state.borrow_mut().focused = focused;
    }

    pub fn is_focused(&self) -> bool {
        self.state.borrow().focused
    }

    /// Record a focus change and, after the configured delay, report it as
    /// `online`/`idle` unless focus changed again meanwhile.
    pub async fn report_focus(&self, focused: bool) -> Result<(), SyncError> {
        self.set_focus(focused);
        sleep_ms(self.config.status_delay_ms).await;
        if self.is_focused() != focused {
            return Ok(());
        }
        let status = if focused {
            PresenceStatus::Online
        } else {
            PresenceStatus::Idle
        };
        self.update_status(status)
    }

    // --- Reading state ---

    pub fn active_room(&self) -> Option<RoomId> {
        self.state.borrow().active.as_ref().map(|a| a.room.clone())
    }

    /// Run `f` on the active room, if any.
    pub fn with_active<R>(&self, f: impl FnOnce(&ActiveRoom) -> R) -> Option<R> {
        self.state.borrow().active.as_ref().map(f)
    }

    pub fn current_user(&self) -> Option<String> {
        self.state.borrow().current_user.clone()
    }

    pub fn servers(&self) -> Vec<ServerSummary> {
        self.state.borrow().servers.clone()
    }

    pub fn last_invite(&self) -> Option<Result<InviteServer, String>> {
        self.state.borrow().last_invite.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().last_error.clone()
    }

    /// Whether the current user wrote message `id` of the active room.
    pub fn can_modify(&self, id: MessageId) -> bool {
        let state = self.state.borrow();
        match (&state.current_user, &state.active) {
            (Some(user), Some(active)) => active.timeline.is_authored_by(id, user),
            _ => false,
        }
    }

    /// The message that `id` replies to, for a reply preview.
    pub fn resolve_reply(&self, id: MessageId) -> Option<Message> {
        self.with_active(|a| a.timeline.resolve_reply(id).cloned())
            .flatten()
    }
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep_ms(ms: u32) {
    tokio::time::sleep(tokio::time::Duration::from_millis(ms as u64)).await;
}

#[cfg(target_arch = "wasm32")]
async fn sleep_ms(ms: u32) {
    gloo_timers::future::TimeoutFuture::new(ms).await;
}
