//! End-to-end behavior of the sync client over the in-memory transport.

use std::cell::RefCell;
use std::rc::Rc;

use bubble_client::ws::{Inbound, MemoryConnector, MemoryRemote};
use bubble_client::{
    ApiClient, Composer, ComposerMode, MemoryTokenStore, Notice, Notifier, SyncClient, SyncConfig, SyncError,
};
use bubble_shared::{ClientCommand, Message, PresenceStatus, RosterEntry, ServerEvent};

#[derive(Default)]
struct Recorder(RefCell<Vec<Notice>>);

impl Notifier for Recorder {
    fn show(&self, notice: Notice) {
        self.0.borrow_mut().push(notice);
    }
}

struct Harness {
    client: SyncClient,
    remote: MemoryRemote,
    notices: Rc<Recorder>,
}

impl Harness {
    fn new(auto_open: bool) -> Self {
        let (connector, remote) = if auto_open {
            MemoryConnector::auto_open()
        } else {
            MemoryConnector::new()
        };
        let notices = Rc::new(Recorder::default());
        let client = SyncClient::new(
            SyncConfig::default(),
            connector,
            Rc::new(MemoryTokenStore::with_token("tok")),
            notices.clone(),
        );
        Self { client, remote, notices }
    }

    /// Connected, with room `r1` active and its roster seeded.
    fn in_room(roster: Vec<RosterEntry>) -> Self {
        let h = Self::new(true);
        h.client.connect();
        h.client.pump();
        let activation = h.client.activate_room("r1".into());
        assert!(h.client.apply_roster(&activation, roster));
        h.remote.take_sent();
        h
    }

    fn push(&self, frame: &str) {
        self.remote.push_frame(frame);
        self.client.pump();
    }

    fn timeline_ids(&self) -> Vec<u64> {
        self.client
            .with_active(|a| a.timeline.messages().iter().map(|m| m.id).collect())
            .unwrap_or_default()
    }

    fn content(&self, id: u64) -> Option<String> {
        self.client
            .with_active(|a| a.timeline.get(id).map(|m| m.content.clone()))
            .flatten()
    }

    fn status(&self, user: &str) -> Option<PresenceStatus> {
        self.client.with_active(|a| a.roster.status_of(user)).flatten()
    }
}

fn message_frame(id: u64, room: &str, reply_to: Option<u64>, content: &str, author: &str) -> String {
    serde_json::json!({
        "event": "message",
        "data": {
            "id": id,
            "displayName": author,
            "picture": "p.png",
            "serverID": room,
            "content": content,
            "timestamp": "10:00 AM",
            "messageRef": reply_to.map(|r| r.to_string()),
            "link": null,
        }
    })
    .to_string()
}

fn update_frame(user: &str, status: &str) -> String {
    serde_json::json!({"event": "update", "data": {"update": {"userID": user, "status": status}}}).to_string()
}

fn notification_frame(room: &str, token: Option<&str>) -> String {
    let mut sender = serde_json::json!({"displayName": "bo", "message": "ping", "picture": "b.png"});
    if let Some(token) = token {
        sender["token"] = token.into();
    }
    serde_json::json!({"event": "notification", "data": {"serverID": room, "sender": sender}}).to_string()
}

// --- Connection ---

#[test]
fn emit_while_not_open_is_not_ready_and_sends_nothing() {
    let h = Harness::new(false);
    assert_eq!(h.client.ping(), Err(SyncError::NotReady));
    assert_eq!(h.client.get_user(), Err(SyncError::NotReady));
    assert!(h.remote.take_sent().is_empty());
    assert_eq!(SyncError::NotReady.user_message(), "not connected, try again");
}

#[test]
fn closed_connection_is_reacquired_on_next_send() {
    let h = Harness::new(true);
    h.client.connect();
    h.remote.close("server went away");
    h.client.pump();
    assert!(h.client.connection_state().is_closed());

    assert_eq!(h.client.ping(), Ok(()));
    assert_eq!(h.remote.connection_count(), 2);
    assert_eq!(h.remote.take_commands(), vec![ClientCommand::Ping {}]);
}

#[test]
fn frames_from_superseded_connection_are_ignored() {
    let h = Harness::in_room(Vec::new());
    let old = 1;
    h.remote.close("drop");
    h.client.pump();
    h.client.connect();
    h.client.pump();

    h.client.handle_inbound(Inbound::Frame(old, message_frame(1, "r1", None, "late", "bo")));
    h.remote.push_frame_on(0, &message_frame(2, "r1", None, "late too", "bo"));
    h.client.pump();
    assert!(h.timeline_ids().is_empty());

    h.push(&message_frame(3, "r1", None, "fresh", "bo"));
    assert_eq!(h.timeline_ids(), vec![3]);
}

#[test]
fn reopen_reannounces_presence_for_active_room() {
    let h = Harness::in_room(Vec::new());
    h.remote.close("drop");
    h.client.pump();
    h.client.connect();
    h.client.pump();
    assert_eq!(
        h.remote.take_commands(),
        vec![
            ClientCommand::UpdateStatus { auth: "tok".into(), status: PresenceStatus::Online },
            ClientCommand::GetUser { token: "tok".into() },
        ]
    );
}

// --- Event bus ---

#[test]
fn subscribers_share_the_connection() {
    let h = Harness::in_room(Vec::new());
    let seen = Rc::new(RefCell::new(Vec::new()));

    let s1 = seen.clone();
    let first = h.client.bus().subscribe("message", move |_| s1.borrow_mut().push("timeline view"));
    let s2 = seen.clone();
    let _second = h.client.bus().subscribe("message", move |_| s2.borrow_mut().push("sidebar"));
    let s3 = seen.clone();
    let _other = h.client.bus().subscribe("return_user", move |e| {
        if let ServerEvent::ReturnUser(p) = e {
            s3.borrow_mut().push(if p.display_name == "ana" { "profile" } else { "?" });
        }
    });

    h.push(&message_frame(1, "r1", None, "hi", "bo"));
    h.push(r#"{"event":"return_user","data":{"displayName":"ana"}}"#);
    assert_eq!(*seen.borrow(), vec!["timeline view", "sidebar", "profile"]);

    first.unsubscribe();
    h.push(&message_frame(2, "r1", None, "again", "bo"));
    assert_eq!(seen.borrow().last(), Some(&"sidebar"));
    assert_eq!(seen.borrow().len(), 4);
    // Core handlers keep running.
    assert_eq!(h.timeline_ids(), vec![1, 2]);
    assert_eq!(h.client.current_user().as_deref(), Some("ana"));
}

#[test]
fn malformed_frames_are_dropped() {
    let h = Harness::in_room(Vec::new());
    h.push("not json at all");
    h.push(r#"{"data": {}}"#);
    h.push(r#"{"event": "message", "data": {"id": "x"}}"#);
    h.push(&message_frame(1, "r1", None, "still fine", "bo"));
    assert_eq!(h.timeline_ids(), vec![1]);
}

// --- Presence ---

#[test]
fn roster_idle_then_offline() {
    let h = Harness::in_room(vec![RosterEntry::sighted("u1", PresenceStatus::Online)]);
    h.push(&update_frame("u1", "idle"));
    assert_eq!(h.status("u1"), Some(PresenceStatus::Idle));
    assert_eq!(h.client.with_active(|a| a.roster.online().len()), Some(1));

    h.push(&update_frame("u1", "offline"));
    assert_eq!(h.status("u1"), Some(PresenceStatus::Offline));
    assert_eq!(h.client.with_active(|a| (a.roster.online().len(), a.roster.offline().len())), Some((0, 1)));

    h.push(&update_frame("ghost", "offline"));
    assert_eq!(h.status("ghost"), None);
}

#[test]
fn updates_before_roster_fetch_are_replayed() {
    let h = Harness::new(true);
    h.client.connect();
    h.client.pump();
    let activation = h.client.activate_room("r1".into());

    h.push(&update_frame("u1", "offline"));
    h.push(&update_frame("u2", "idle"));
    assert_eq!(h.status("u2"), None);

    h.client.apply_roster(&activation, vec![RosterEntry::sighted("u1", PresenceStatus::Online)]);
    assert_eq!(h.status("u1"), Some(PresenceStatus::Offline));
    assert_eq!(h.status("u2"), Some(PresenceStatus::Idle));
}

#[test]
fn roster_queue_stays_small_without_a_seed() {
    let h = Harness::new(true);
    h.client.connect();
    h.client.pump();
    let activation = h.client.activate_room("r1".into());

    for i in 0..5000 {
        let status = if i % 2 == 0 { "online" } else { "idle" };
        h.remote.push_frame(&update_frame(&format!("u{}", i % 3), status));
    }
    h.client.pump();
    assert_eq!(h.client.with_active(|a| a.roster.queued()), Some(3));

    h.client.apply_roster(&activation, Vec::new());
    assert_eq!(h.client.with_active(|a| a.roster.len()), Some(3));
    // i = 4999 is odd and belongs to u1.
    assert_eq!(h.status("u1"), Some(PresenceStatus::Idle));
}

#[tokio::test]
async fn failed_fetches_settle_the_room_as_empty() {
    let h = Harness::new(true);
    h.client.connect();
    h.client.pump();
    // Nothing listens on the discard port.
    let api = ApiClient::new()
        .with_base_url("http://127.0.0.1:9")
        .with_token(Some("tok".into()));

    let result = h.client.load_room(&api, "r1".into()).await;
    assert!(matches!(result, Err(SyncError::Api(_))), "{result:?}");
    assert_eq!(
        h.client.with_active(|a| (a.roster.is_seeded(), a.timeline.is_history_loaded())),
        Some((true, true))
    );

    h.push(&update_frame("u1", "online"));
    assert_eq!(h.status("u1"), Some(PresenceStatus::Online));
    assert_eq!(h.client.with_active(|a| a.roster.queued()), Some(0));
}

// --- Timeline ---

#[test]
fn history_load_keeps_edits_and_deletes_seen_while_loading() {
    let h = Harness::new(true);
    h.client.connect();
    h.client.pump();
    let activation = h.client.activate_room("r1".into());

    h.push(&message_frame(5, "r1", None, "live", "bo"));
    h.push(r#"{"event":"message_deleted","data":{"id":5,"success":true}}"#);
    h.push(r#"{"event":"message_edited","data":{"id":3,"content":"edited","success":true}}"#);

    let history: Vec<Message> = [(3, "original"), (5, "live")]
        .into_iter()
        .map(|(id, content)| {
            let frame: serde_json::Value = serde_json::from_str(&message_frame(id, "r1", None, content, "bo")).unwrap();
            serde_json::from_value(frame["data"].clone()).unwrap()
        })
        .collect();
    assert!(h.client.apply_history(&activation, history));

    assert_eq!(h.timeline_ids(), vec![3]);
    assert_eq!(h.content(3).as_deref(), Some("edited"));
}

#[test]
fn reply_edit_delete_scenario() {
    let h = Harness::in_room(Vec::new());
    h.push(&message_frame(1, "r1", None, "hi", "ana"));
    h.push(&message_frame(2, "r1", Some(1), "yo", "bo"));
    assert_eq!(h.client.resolve_reply(2).map(|m| m.id), Some(1));

    h.push(r#"{"event":"message_edited","data":{"id":2,"content":"yo!","success":true}}"#);
    h.push(r#"{"event":"message_deleted","data":{"id":1,"success":true,"message":"deleted"}}"#);
    assert_eq!(h.timeline_ids(), vec![2]);
    assert_eq!(h.content(2).as_deref(), Some("yo!"));
    assert!(h.client.resolve_reply(2).is_none());

    // Unknown references are absorbed.
    h.push(r#"{"event":"message_edited","data":{"id":42,"content":"?"}}"#);
    h.push(r#"{"event":"message_deleted","data":{"id":42}}"#);
    assert_eq!(h.timeline_ids(), vec![2]);
}

#[test]
fn events_for_other_rooms_change_nothing() {
    let h = Harness::in_room(Vec::new());
    h.push(&message_frame(1, "r1", None, "mine", "ana"));
    let before = h.client.with_active(|a| a.clone());

    h.push(&message_frame(2, "r2", None, "elsewhere", "bo"));
    h.push(r#"{"event":"message_edited","data":{"id":1,"content":"hijack","serverID":"r2"}}"#);
    h.push(r#"{"event":"message_deleted","data":{"id":1,"serverID":"r2"}}"#);

    assert_eq!(h.client.with_active(|a| a.clone()), before);
}

#[test]
fn switching_rooms_discards_in_flight_fetches() {
    let h = Harness::in_room(Vec::new());
    let stale = h.client.activate_room("r0".into());
    let current = h.client.activate_room("r2".into());

    assert!(!h.client.apply_roster(&stale, vec![RosterEntry::sighted("u1", PresenceStatus::Online)]));
    assert!(h.client.apply_roster(&current, Vec::new()));
    assert_eq!(h.status("u1"), None);

    h.push(&message_frame(1, "r1", None, "old room", "bo"));
    h.push(&message_frame(2, "r2", None, "new room", "bo"));
    assert_eq!(h.timeline_ids(), vec![2]);
}

// --- Notifications ---

#[test]
fn notification_gate_follows_room_and_focus() {
    let h = Harness::in_room(Vec::new());

    h.push(&notification_frame("r1", Some("t")));
    assert!(h.notices.0.borrow().is_empty());

    h.push(&notification_frame("r2", None));
    assert!(h.notices.0.borrow().is_empty());

    h.push(&notification_frame("r2", Some("t")));
    h.client.set_focus(false);
    h.push(&notification_frame("r1", Some("t")));

    let notices = h.notices.0.borrow();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0].title, "Message from bo");
    assert_eq!(notices[0].body, "ping");
    assert_eq!(notices[0].target_path(), "/bubble/server/r2");
    assert_eq!(notices[1].room.as_str(), "r1");
}

// --- Commands ---

#[test]
fn send_message_schedules_notification_and_detects_links() {
    let h = Harness::in_room(Vec::new());
    h.client.send_message("https://example.com/cat.png").unwrap();
    assert_eq!(
        h.remote.take_commands(),
        vec![
            ClientCommand::ScheduleNotification {
                token: "tok".into(),
                content: "https://example.com/cat.png".into(),
                sid: "r1".into(),
            },
            ClientCommand::SendMessage {
                token: "tok".into(),
                sid: "r1".into(),
                message: "https://example.com/cat.png".into(),
                link: Some("https://example.com/cat.png".into()),
            },
        ]
    );
}

#[test]
fn only_own_messages_can_be_edited_or_deleted() {
    let h = Harness::in_room(Vec::new());
    h.push(r#"{"event":"return_user","data":{"displayName":"ana"}}"#);
    h.push(&message_frame(1, "r1", None, "mine", "ana"));
    h.push(&message_frame(2, "r1", None, "theirs", "bo"));

    assert_eq!(h.client.edit_message(2, "nope"), Ok(false));
    assert_eq!(h.client.delete_message(2), Ok(false));
    assert_eq!(h.client.delete_message(99), Ok(false));
    assert!(h.remote.take_sent().is_empty());

    assert_eq!(h.client.edit_message(1, "mine!"), Ok(true));
    assert_eq!(h.client.delete_message(1), Ok(true));
    assert_eq!(
        h.remote.take_commands(),
        vec![
            ClientCommand::EditMessage { auth: "tok".into(), message_id: "1".into(), content: "mine!".into() },
            ClientCommand::DeleteMessage { auth: "tok".into(), message_id: "1".into() },
        ]
    );
}

#[test]
fn composer_routes_by_mode() {
    let h = Harness::in_room(Vec::new());
    h.push(r#"{"event":"return_user","data":{"displayName":"ana"}}"#);
    h.push(&message_frame(1, "r1", None, "mine", "ana"));
    let mut composer = Composer::new();

    composer.submit(&h.client, "   ").unwrap();
    assert!(h.remote.take_sent().is_empty());

    composer.start_reply(1);
    composer.submit(&h.client, "agreed").unwrap();
    assert_eq!(composer.mode(), ComposerMode::Message);

    composer.start_edit(1);
    composer.submit(&h.client, "fixed").unwrap();

    assert_eq!(
        h.remote.take_commands(),
        vec![
            ClientCommand::ReplyToMessage {
                token: "tok".into(),
                ref_id: "1".into(),
                content: "agreed".into(),
                sid: "r1".into(),
            },
            ClientCommand::EditMessage { auth: "tok".into(), message_id: "1".into(), content: "fixed".into() },
        ]
    );
}

#[test]
fn composer_keeps_mode_when_not_ready() {
    let h = Harness::in_room(Vec::new());
    h.remote.close("drop");
    h.client.pump();
    // A shut down client does not reconnect.
    h.client.shutdown();

    let mut composer = Composer::new();
    composer.start_reply(7);
    assert_eq!(composer.submit(&h.client, "hello"), Err(SyncError::NotReady));
    assert_eq!(composer.mode(), ComposerMode::Reply(7));
}

#[test]
fn creation_response_joins_and_lists_room() {
    let h = Harness::in_room(Vec::new());
    h.client.create_server("den").unwrap();
    assert_eq!(
        h.remote.take_commands(),
        vec![ClientCommand::CreateServer { auth: "tok".into(), server_name: "den".into() }]
    );

    h.push(r#"{"event":"creation_response","data":{"server":{"serverName":"den","serverID":"s9","ownerID":"u1"},"status":"success"}}"#);
    assert_eq!(
        h.remote.take_commands(),
        vec![ClientCommand::JoinServer { token: "tok".into(), sid: "s9".into() }]
    );
    let servers = h.client.servers();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].name, "den");
}

#[test]
fn failed_invite_and_join_conflict_are_reported() {
    let h = Harness::in_room(Vec::new());
    h.push(r#"{"event":"invite","data":{"failed":"invalid code"}}"#);
    assert_eq!(h.client.last_invite(), Some(Err("invalid code".to_string())));
    assert!(h.remote.take_sent().is_empty());

    h.push(r#"{"event":"server_response","data":{"server":{"status":409,"message":"already a member"}}}"#);
    assert_eq!(h.client.last_error().as_deref(), Some("already a member"));
    assert!(h.client.servers().is_empty());
}
