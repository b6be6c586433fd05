//! Wire protocol: `{ "event": name, "data": payload }` text frames.
//!
//! Outbound commands are a serde adjacently-tagged enum. Inbound frames are
//! decoded in two steps: text into an [`Envelope`], then the envelope into a
//! typed [`ServerEvent`] keyed by event name. Unknown event names survive as
//! [`ServerEvent::Other`] so subscribers can still observe them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::models::{ids, InviteServer, Message, MessageId, PresenceStatus, RoomId, ServerSummary};

/// Event names used on the wire.
pub mod event_names {
    pub const VERIFY_INVITE: &str = "verify_invite";
    pub const JOIN_SERVER: &str = "join_server";
    pub const CREATE_SERVER: &str = "create_server";
    pub const SEND_MESSAGE: &str = "send_message";
    pub const EDIT_MESSAGE: &str = "edit_message";
    pub const DELETE_MESSAGE: &str = "delete_message";
    pub const REPLY_TO_MESSAGE: &str = "reply_to_message";
    pub const UPDATE_STATUS: &str = "update_status";
    pub const GET_USER: &str = "get_user";
    pub const SCHEDULE_NOTIFICATION: &str = "schedule_notification";
    pub const PING: &str = "ping";

    pub const INVITE: &str = "invite";
    pub const CREATION_RESPONSE: &str = "creation_response";
    pub const SERVER_RESPONSE: &str = "server_response";
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_EDITED: &str = "message_edited";
    pub const MESSAGE_DELETED: &str = "message_deleted";
    pub const UPDATE: &str = "update";
    pub const RETURN_USER: &str = "return_user";
    pub const NOTIFICATION: &str = "notification";
    pub const ACK: &str = "ack";
    pub const ERROR: &str = "error";
    pub const PONG: &str = "pong";
}

/// Untyped wire unit. Both fields are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    pub data: Value,
}

impl Envelope {
    /// Parse a text frame. Anything that is not a JSON object with `event`
    /// and `data` is a [`ProtocolError::MalformedFrame`].
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }
}

// --- Client -> server ---

/// Commands sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    VerifyInvite {
        code: String,
    },
    JoinServer {
        token: String,
        sid: RoomId,
    },
    CreateServer {
        auth: String,
        server_name: String,
    },
    SendMessage {
        token: String,
        sid: RoomId,
        message: String,
        #[serde(default)]
        link: Option<String>,
    },
    /// The server expects message ids as strings in commands.
    EditMessage {
        auth: String,
        message_id: String,
        content: String,
    },
    DeleteMessage {
        auth: String,
        message_id: String,
    },
    ReplyToMessage {
        token: String,
        ref_id: String,
        content: String,
        sid: RoomId,
    },
    UpdateStatus {
        auth: String,
        status: PresenceStatus,
    },
    GetUser {
        token: String,
    },
    ScheduleNotification {
        token: String,
        content: String,
        sid: RoomId,
    },
    /// Carries an empty `data` object like every other frame.
    Ping {},
}

impl ClientCommand {
    pub fn event_name(&self) -> &'static str {
        use event_names::*;
        match self {
            ClientCommand::VerifyInvite { .. } => VERIFY_INVITE,
            ClientCommand::JoinServer { .. } => JOIN_SERVER,
            ClientCommand::CreateServer { .. } => CREATE_SERVER,
            ClientCommand::SendMessage { .. } => SEND_MESSAGE,
            ClientCommand::EditMessage { .. } => EDIT_MESSAGE,
            ClientCommand::DeleteMessage { .. } => DELETE_MESSAGE,
            ClientCommand::ReplyToMessage { .. } => REPLY_TO_MESSAGE,
            ClientCommand::UpdateStatus { .. } => UPDATE_STATUS,
            ClientCommand::GetUser { .. } => GET_USER,
            ClientCommand::ScheduleNotification { .. } => SCHEDULE_NOTIFICATION,
            ClientCommand::Ping {} => PING,
        }
    }

    /// Serialize into a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

// --- Server -> client payloads ---

/// Reply to `verify_invite`. A failed lookup carries only `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<InviteServer>,
}

impl InvitePayload {
    /// The invited room, or the failure reason.
    pub fn outcome(&self) -> Result<&InviteServer, &str> {
        match (&self.failed, &self.server) {
            (None, Some(server)) => Ok(server),
            (Some(reason), _) => Err(reason),
            (None, None) => Err("invite response carried no server"),
        }
    }
}

/// Reply to `create_server` and `join_server`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerResponsePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServerResponsePayload {
    /// The room summary, if the server object has one. A join conflict
    /// reuses the `server` key for `{status, message}`.
    pub fn summary(&self) -> Option<ServerSummary> {
        let server = self.server.as_ref()?;
        serde_json::from_value(server.clone()).ok()
    }

    pub fn is_success(&self) -> bool {
        self.response.as_deref() == Some("success") || self.summary().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEditedPayload {
    #[serde(deserialize_with = "ids::required")]
    pub id: MessageId,
    pub content: String,
    #[serde(default, rename = "serverID", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDeletedPayload {
    #[serde(deserialize_with = "ids::required")]
    pub id: MessageId,
    #[serde(default, rename = "serverID", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub update: PresenceUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnUserPayload {
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Sender block of a `notification` event. `token` carries the sender's
/// identity; an event without it is not attributable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSender {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, rename = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(rename = "serverID")]
    pub room_id: RoomId,
    pub sender: NotificationSender,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    #[serde(default)]
    pub message: String,
}

/// Typed inbound events, one payload shape per event name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Invite(InvitePayload),
    CreationResponse(ServerResponsePayload),
    ServerResponse(ServerResponsePayload),
    Message(Message),
    MessageEdited(MessageEditedPayload),
    MessageDeleted(MessageDeletedPayload),
    Update(UpdatePayload),
    ReturnUser(ReturnUserPayload),
    Notification(NotificationPayload),
    Ack(TextPayload),
    Error(TextPayload),
    Pong(Value),
    /// An event name this client has no schema for.
    #[serde(skip_serializing)]
    Other { event: String, data: Value },
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

impl ServerEvent {
    /// Validate an envelope against the schema for its event name.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        use event_names::*;
        let Envelope { event, data } = envelope;
        let name = event.as_str();
        let parsed = match name {
            INVITE => ServerEvent::Invite(payload(name, data)?),
            CREATION_RESPONSE => ServerEvent::CreationResponse(payload(name, data)?),
            SERVER_RESPONSE => ServerEvent::ServerResponse(payload(name, data)?),
            MESSAGE => ServerEvent::Message(payload(name, data)?),
            MESSAGE_EDITED => ServerEvent::MessageEdited(payload(name, data)?),
            MESSAGE_DELETED => ServerEvent::MessageDeleted(payload(name, data)?),
            UPDATE => ServerEvent::Update(payload(name, data)?),
            RETURN_USER => ServerEvent::ReturnUser(payload(name, data)?),
            NOTIFICATION => ServerEvent::Notification(payload(name, data)?),
            ACK => ServerEvent::Ack(payload(name, data)?),
            ERROR => ServerEvent::Error(payload(name, data)?),
            PONG => ServerEvent::Pong(data),
            _ => ServerEvent::Other { event, data },
        };
        Ok(parsed)
    }

    /// Decode a text frame straight into a typed event.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Self::from_envelope(Envelope::decode(text)?)
    }

    pub fn event_name(&self) -> &str {
        use event_names::*;
        match self {
            ServerEvent::Invite(_) => INVITE,
            ServerEvent::CreationResponse(_) => CREATION_RESPONSE,
            ServerEvent::ServerResponse(_) => SERVER_RESPONSE,
            ServerEvent::Message(_) => MESSAGE,
            ServerEvent::MessageEdited(_) => MESSAGE_EDITED,
            ServerEvent::MessageDeleted(_) => MESSAGE_DELETED,
            ServerEvent::Update(_) => UPDATE,
            ServerEvent::ReturnUser(_) => RETURN_USER,
            ServerEvent::Notification(_) => NOTIFICATION,
            ServerEvent::Ack(_) => ACK,
            ServerEvent::Error(_) => ERROR,
            ServerEvent::Pong(_) => PONG,
            ServerEvent::Other { event, .. } => event,
        }
    }

    /// Room the event is scoped to, when the payload names one.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            ServerEvent::Message(msg) => Some(&msg.room_id),
            ServerEvent::MessageEdited(p) => p.room_id.as_ref(),
            ServerEvent::MessageDeleted(p) => p.room_id.as_ref(),
            ServerEvent::Notification(p) => Some(&p.room_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_use_event_data_shape() {
        let cmd = ClientCommand::SendMessage {
            token: "t".into(),
            sid: RoomId::from("r1"),
            message: "hi".into(),
            link: None,
        };
        let value: Value = serde_json::from_str(&cmd.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "send_message", "data": {"token": "t", "sid": "r1", "message": "hi", "link": null}})
        );
        assert_eq!(cmd.event_name(), "send_message");
    }

    #[test]
    fn status_update_serializes_lowercase() {
        let cmd = ClientCommand::UpdateStatus { auth: "t".into(), status: PresenceStatus::Idle };
        let value: Value = serde_json::from_str(&cmd.encode().unwrap()).unwrap();
        assert_eq!(value["data"]["status"], "idle");
        assert_eq!(value["event"], "update_status");
    }

    #[test]
    fn ping_carries_empty_data() {
        let value: Value = serde_json::from_str(&ClientCommand::Ping {}.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"event": "ping", "data": {}}));
        let back: ClientCommand = serde_json::from_value(value).unwrap();
        assert_eq!(back, ClientCommand::Ping {});
    }

    #[test]
    fn envelope_requires_event_and_data() {
        assert!(Envelope::decode("not json").is_err());
        assert!(Envelope::decode(r#"{"event": "message"}"#).is_err());
        assert!(Envelope::decode(r#"{"data": {}}"#).is_err());
        assert!(Envelope::decode(r#"{"event": "x", "data": {}}"#).is_ok());
    }

    #[test]
    fn update_event_decodes() {
        let text = r#"{"event":"update","data":{"update":{"status":"idle","userID":"u1"}}}"#;
        let event = ServerEvent::decode(text).unwrap();
        assert_eq!(
            event,
            ServerEvent::Update(UpdatePayload {
                update: PresenceUpdate { user_id: "u1".into(), status: PresenceStatus::Idle }
            })
        );
        assert_eq!(event.room_id(), None);
    }

    #[test]
    fn deleted_event_ignores_extra_fields() {
        let text = r#"{"event":"message_deleted","data":{"success":true,"message":"Message deleted from chat","id":4}}"#;
        match ServerEvent::decode(text).unwrap() {
            ServerEvent::MessageDeleted(p) => {
                assert_eq!(p.id, 4);
                assert_eq!(p.room_id, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn known_event_with_bad_payload_is_invalid() {
        let text = r#"{"event":"update","data":{"update":{"userID":"u1","status":"away"}}}"#;
        match ServerEvent::decode(text) {
            Err(ProtocolError::InvalidPayload { event, .. }) => assert_eq!(event, "update"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn unknown_event_is_kept() {
        let event = ServerEvent::decode(r#"{"event":"typing","data":{"who":"u2"}}"#).unwrap();
        assert_eq!(event.event_name(), "typing");
        assert!(matches!(event, ServerEvent::Other { .. }));
    }

    #[test]
    fn typed_event_serializes_back_to_frame() {
        let event = ServerEvent::ReturnUser(ReturnUserPayload { display_name: "Ana".into() });
        let text = serde_json::to_string(&event).unwrap();
        assert_eq!(ServerEvent::decode(&text).unwrap(), event);
    }

    #[test]
    fn notification_without_token_still_decodes() {
        let text = r#"{"event":"notification","data":{"serverID":"r2","sender":{"displayName":"bo","message":"hey","picture":"p.png"}}}"#;
        match ServerEvent::decode(text).unwrap() {
            ServerEvent::Notification(p) => {
                assert_eq!(p.sender.token, None);
                assert_eq!(p.room_id, RoomId::from("r2"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn invite_outcome() {
        let ok: InvitePayload = serde_json::from_value(
            json!({"issued_by": "ana", "server": {"sid": "s1", "server_name": "den"}}),
        )
        .unwrap();
        assert_eq!(ok.outcome().unwrap().sid, RoomId::from("s1"));

        let failed: InvitePayload =
            serde_json::from_value(json!({"failed": "The provided server may or may not exist."})).unwrap();
        assert!(failed.outcome().is_err());
    }

    #[test]
    fn join_conflict_has_no_summary() {
        let conflict: ServerResponsePayload =
            serde_json::from_value(json!({"server": {"status": 409, "message": "User is already in server"}}))
                .unwrap();
        assert!(conflict.summary().is_none());
        assert!(!conflict.is_success());

        let joined: ServerResponsePayload =
            serde_json::from_value(json!({"server": {"name": "den", "owner": "u1", "serverID": "s1"}})).unwrap();
        assert_eq!(joined.summary().unwrap().name, "den");
    }
}
