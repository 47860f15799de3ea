//! Event envelopes with deferred content decoding.
//!
//! A sync response carries heterogeneous events whose `content` shape depends
//! on the `type` discriminator. [`OpaqueEvent::decode`] parses the envelope
//! eagerly and keeps `content` as an uninterpreted JSON span; the typed views
//! ([`MessageEvent`], [`ReactionEvent`]) are produced on demand once
//! [`OpaqueEvent::kind`] has matched.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::value::RawValue;

use crate::error::ClientError;

/// Event type of a room message.
pub const EVENT_TYPE_MESSAGE: &str = "m.room.message";
/// Event type of an annotation (reaction) on another event.
pub const EVENT_TYPE_REACTION: &str = "m.reaction";

/// Closed set of event kinds the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Reaction,
    /// Any other type. Routed to the default path, never an error.
    Other,
}

impl EventKind {
    /// Exact-match classification of an event type string.
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type {
            EVENT_TYPE_MESSAGE => Self::Message,
            EVENT_TYPE_REACTION => Self::Reaction,
            _ => Self::Other,
        }
    }
}

/// Envelope fields shared by every event.
#[derive(Debug, Clone, Default)]
pub struct EventMeta {
    pub event_type: String,
    pub event_id: String,
    pub sender: String,
    pub room_id: String,
    /// Present only on state events; an empty string is a valid state key.
    pub state_key: Option<String>,
    /// Milliseconds since the Unix epoch on the originating homeserver.
    pub origin_server_ts: i64,
    pub unsigned: Option<UnsignedData>,
}

/// Metadata added by servers along the way and therefore not signed by the
/// sender.
#[derive(Debug, Clone, Default)]
pub struct UnsignedData {
    /// Milliseconds elapsed since the event was sent.
    pub age: i64,
    /// Echo of the sender's transaction ID, present only for our own sends.
    pub transaction_id: Option<String>,
    pub prev_content: Option<Box<RawValue>>,
    pub redacted_because: Option<Box<OpaqueEvent>>,
}

/// An event whose content has not been interpreted yet.
#[derive(Debug, Clone)]
pub struct OpaqueEvent {
    meta: EventMeta,
    content: Box<RawValue>,
}

#[derive(Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    event_id: String,
    sender: String,
    /// Omitted inside `/sync` timelines; filled in from the room key.
    #[serde(default)]
    room_id: String,
    #[serde(default)]
    state_key: Option<String>,
    origin_server_ts: i64,
    #[serde(default)]
    unsigned: Option<WireUnsigned>,
    content: Box<RawValue>,
}

#[derive(Deserialize)]
struct WireUnsigned {
    #[serde(default)]
    age: i64,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    prev_content: Option<Box<RawValue>>,
    #[serde(default)]
    redacted_because: Option<Box<WireEnvelope>>,
}

impl From<WireEnvelope> for OpaqueEvent {
    fn from(wire: WireEnvelope) -> Self {
        let unsigned = wire.unsigned.map(|unsigned| UnsignedData {
            age: unsigned.age,
            transaction_id: unsigned.transaction_id,
            prev_content: unsigned.prev_content,
            redacted_because: unsigned
                .redacted_because
                .map(|redaction| Box::new(OpaqueEvent::from(*redaction))),
        });

        Self {
            meta: EventMeta {
                event_type: wire.event_type,
                event_id: wire.event_id,
                sender: wire.sender,
                room_id: wire.room_id,
                state_key: wire.state_key,
                origin_server_ts: wire.origin_server_ts,
                unsigned,
            },
            content: wire.content,
        }
    }
}

impl OpaqueEvent {
    /// Parse one event envelope.
    ///
    /// `type`, `event_id`, `sender`, `origin_server_ts` and `content` are
    /// required; `content` must be syntactically valid JSON but its structure
    /// is not checked.
    pub fn decode(raw: &[u8]) -> Result<Self, ClientError> {
        serde_json::from_slice::<WireEnvelope>(raw)
            .map(Self::from)
            .map_err(|err| ClientError::MalformedEnvelope(err.to_string()))
    }

    /// Parse an envelope that was kept as a raw span of a larger document.
    pub fn decode_raw(raw: &RawValue) -> Result<Self, ClientError> {
        Self::decode(raw.get().as_bytes())
    }

    pub fn meta(&self) -> &EventMeta {
        &self.meta
    }

    pub fn event_type(&self) -> &str {
        &self.meta.event_type
    }

    pub fn event_id(&self) -> &str {
        &self.meta.event_id
    }

    pub fn sender(&self) -> &str {
        &self.meta.sender
    }

    pub fn room_id(&self) -> &str {
        &self.meta.room_id
    }

    /// Transaction ID echoed back for events this device sent itself.
    pub fn transaction_id(&self) -> Option<&str> {
        self.meta
            .unsigned
            .as_ref()
            .and_then(|unsigned| unsigned.transaction_id.as_deref())
    }

    /// The undecoded content as JSON text.
    pub fn raw_content(&self) -> &str {
        self.content.get()
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_event_type(&self.meta.event_type)
    }

    /// Fill in the room ID when the envelope omitted it, as `/sync` timelines do.
    pub fn with_room_id(mut self, room_id: &str) -> Self {
        if self.meta.room_id.is_empty() {
            self.meta.room_id = room_id.to_owned();
        }
        self
    }

    /// View this event as a room message.
    ///
    /// Calling this on an event whose kind is not [`EventKind::Message`] is a
    /// contract violation.
    pub fn as_message(&self) -> Result<MessageEvent, ClientError> {
        Ok(MessageEvent {
            meta: self.meta.clone(),
            content: self.typed_content(EventKind::Message)?,
        })
    }

    /// View this event as a reaction.
    ///
    /// Calling this on an event whose kind is not [`EventKind::Reaction`] is a
    /// contract violation.
    pub fn as_reaction(&self) -> Result<ReactionEvent, ClientError> {
        Ok(ReactionEvent {
            meta: self.meta.clone(),
            content: self.typed_content(EventKind::Reaction)?,
        })
    }

    /// Resolve into the tagged variant matching this event's kind.
    pub fn into_typed(self) -> Result<RoomEvent, ClientError> {
        match self.kind() {
            EventKind::Message => self.as_message().map(RoomEvent::Message),
            EventKind::Reaction => self.as_reaction().map(RoomEvent::Reaction),
            EventKind::Other => Ok(RoomEvent::Other(self)),
        }
    }

    fn typed_content<T: DeserializeOwned>(&self, expected: EventKind) -> Result<T, ClientError> {
        if self.kind() != expected {
            return Err(ClientError::contract(format!(
                "event {} has type '{}', not {expected:?}",
                self.meta.event_id, self.meta.event_type
            )));
        }

        serde_json::from_str(self.content.get()).map_err(|source| ClientError::ContentDecode {
            event_type: self.meta.event_type.clone(),
            source,
        })
    }
}

/// A decoded event, tagged by kind.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Message(MessageEvent),
    Reaction(ReactionEvent),
    Other(OpaqueEvent),
}

/// Message type carried in `msgtype`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// `m.text`
    Text,
    /// `m.notice`
    Notice,
    /// `m.emote`
    Emote,
    /// Any other message type (images, files, custom types).
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "m.text",
            Self::Notice => "m.notice",
            Self::Emote => "m.emote",
            Self::Other(value) => value,
        }
    }
}

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "m.text" => Self::Text,
            "m.notice" => Self::Notice,
            "m.emote" => Self::Emote,
            _ => Self::Other(value),
        }
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Other(value) => value,
            known => known.as_str().to_owned(),
        }
    }
}

/// Reference to another event by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReference {
    pub event_id: String,
}

/// `m.relates_to` of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRelation {
    #[serde(rename = "m.in_reply_to", default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<EventReference>,
}

/// Content of an `m.room.message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub msgtype: MessageType,
    pub body: String,
    #[serde(rename = "m.relates_to", default, skip_serializing_if = "Option::is_none")]
    pub relates_to: Option<MessageRelation>,
}

impl MessageContent {
    pub fn new(msgtype: MessageType, body: impl Into<String>) -> Self {
        Self {
            msgtype,
            body: body.into(),
            relates_to: None,
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new(MessageType::Text, body)
    }

    pub fn notice(body: impl Into<String>) -> Self {
        Self::new(MessageType::Notice, body)
    }

    pub fn emote(body: impl Into<String>) -> Self {
        Self::new(MessageType::Emote, body)
    }

    /// Mark the message as a reply to `event_id`.
    pub fn in_reply_to(mut self, event_id: impl Into<String>) -> Self {
        self.relates_to = Some(MessageRelation {
            in_reply_to: Some(EventReference {
                event_id: event_id.into(),
            }),
        });
        self
    }

    pub fn reply_target(&self) -> Option<&str> {
        self.relates_to
            .as_ref()
            .and_then(|relation| relation.in_reply_to.as_ref())
            .map(|reference| reference.event_id.as_str())
    }
}

/// `m.relates_to` of a reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRelation {
    pub rel_type: String,
    pub event_id: String,
    pub key: String,
}

/// Content of an `m.reaction` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionContent {
    #[serde(rename = "m.relates_to")]
    pub relates_to: ReactionRelation,
}

impl ReactionContent {
    /// Annotate `event_id` with `key` (usually an emoji).
    pub fn annotation(event_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            relates_to: ReactionRelation {
                rel_type: "m.annotation".to_owned(),
                event_id: event_id.into(),
                key: key.into(),
            },
        }
    }
}

/// A room message.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub meta: EventMeta,
    pub content: MessageContent,
}

/// A reaction to another event.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub meta: EventMeta,
    pub content: ReactionContent,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn envelope(event_type: &str, content: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": event_type,
            "event_id": "$e1",
            "sender": "@alice:example.org",
            "origin_server_ts": 1_700_000_000_000_i64,
            "unsigned": { "age": 42, "transaction_id": "1700000000001" },
            "content": content,
        }))
        .expect("envelope should serialize")
    }

    #[test]
    fn decodes_envelope_and_defers_content() {
        let raw = envelope("m.room.topic", json!({ "topic": "rust" }));
        let event = OpaqueEvent::decode(&raw).expect("envelope should decode");

        assert_eq!(event.event_type(), "m.room.topic");
        assert_eq!(event.event_id(), "$e1");
        assert_eq!(event.sender(), "@alice:example.org");
        assert_eq!(event.meta().origin_server_ts, 1_700_000_000_000);
        assert_eq!(event.transaction_id(), Some("1700000000001"));
        assert_eq!(event.kind(), EventKind::Other);
        assert_eq!(event.raw_content(), r#"{"topic":"rust"}"#);
    }

    #[test]
    fn rejects_envelope_missing_required_fields() {
        let complete = json!({
            "type": "m.room.message",
            "event_id": "$e",
            "sender": "@alice:example.org",
            "origin_server_ts": 1,
            "content": { "msgtype": "m.text", "body": "hi" }
        });
        OpaqueEvent::decode(complete.to_string().as_bytes()).expect("complete envelope decodes");

        for field in ["type", "event_id", "sender", "origin_server_ts", "content"] {
            let mut partial = complete.clone();
            partial
                .as_object_mut()
                .expect("envelope is an object")
                .remove(field);

            let err = OpaqueEvent::decode(partial.to_string().as_bytes())
                .expect_err("envelope must be rejected");
            assert!(matches!(err, ClientError::MalformedEnvelope(_)), "{field}: {err:?}");
        }

        let truncated = br#"{"type":"m.room.message","content":{"body":"#;
        let err = OpaqueEvent::decode(truncated).expect_err("truncated envelope must be rejected");
        assert!(matches!(err, ClientError::MalformedEnvelope(_)), "{err:?}");
    }

    #[test]
    fn unknown_content_shape_still_decodes_envelope() {
        let raw = envelope(EVENT_TYPE_MESSAGE, json!(["not", "an", "object"]));
        let event = OpaqueEvent::decode(&raw).expect("envelope should decode");
        assert_eq!(event.kind(), EventKind::Message);
    }

    #[test]
    fn classification_is_exact_match() {
        assert_eq!(EventKind::from_event_type("m.room.message"), EventKind::Message);
        assert_eq!(EventKind::from_event_type("m.reaction"), EventKind::Reaction);
        assert_eq!(EventKind::from_event_type("m.room.message "), EventKind::Other);
        assert_eq!(EventKind::from_event_type("M.REACTION"), EventKind::Other);
    }

    #[test]
    fn message_content_survives_decoding() {
        let content = MessageContent::text("hi").in_reply_to("$parent");
        let raw = envelope(
            EVENT_TYPE_MESSAGE,
            serde_json::to_value(&content).expect("content should serialize"),
        );

        let event = OpaqueEvent::decode(&raw)
            .expect("envelope should decode")
            .as_message()
            .expect("message should decode");

        assert_eq!(event.content, content);
        assert_eq!(event.content.reply_target(), Some("$parent"));
        assert_eq!(event.meta.event_id, "$e1");
    }

    #[test]
    fn reaction_content_survives_decoding() {
        let content = ReactionContent::annotation("$target", "👍");
        let raw = envelope(
            EVENT_TYPE_REACTION,
            serde_json::to_value(&content).expect("content should serialize"),
        );

        let event = OpaqueEvent::decode(&raw)
            .expect("envelope should decode")
            .as_reaction()
            .expect("reaction should decode");

        assert_eq!(event.content, content);
        assert_eq!(event.content.relates_to.rel_type, "m.annotation");
    }

    #[test]
    fn nonconforming_content_is_a_decode_error() {
        let raw = envelope(EVENT_TYPE_MESSAGE, json!({ "msgtype": "m.text" }));
        let event = OpaqueEvent::decode(&raw).expect("envelope should decode");

        let err = event.as_message().expect_err("body is required");
        assert!(matches!(err, ClientError::ContentDecode { ref event_type, .. } if event_type == EVENT_TYPE_MESSAGE));
    }

    #[test]
    fn mismatched_view_is_a_contract_violation() {
        let raw = envelope(EVENT_TYPE_REACTION, json!({}));
        let event = OpaqueEvent::decode(&raw).expect("envelope should decode");

        let err = event.as_message().expect_err("reaction is not a message");
        assert_eq!(err.code(), "contract_violation");
    }

    #[test]
    fn unknown_message_types_round_trip() {
        let raw = envelope(
            EVENT_TYPE_MESSAGE,
            json!({ "msgtype": "m.image", "body": "cat.png", "url": "mxc://x/y" }),
        );
        let message = OpaqueEvent::decode(&raw)
            .expect("envelope should decode")
            .as_message()
            .expect("message should decode");

        assert_eq!(message.content.msgtype, MessageType::Other("m.image".into()));
        assert_eq!(
            serde_json::to_value(&message.content.msgtype).expect("msgtype should serialize"),
            json!("m.image")
        );
    }

    #[test]
    fn decodes_nested_redaction() {
        let raw = serde_json::to_vec(&json!({
            "type": EVENT_TYPE_MESSAGE,
            "event_id": "$gone",
            "sender": "@alice:example.org",
            "origin_server_ts": 1,
            "content": {},
            "unsigned": {
                "redacted_because": {
                    "type": "m.room.redaction",
                    "event_id": "$redaction",
                    "sender": "@mod:example.org",
                    "origin_server_ts": 2,
                    "content": { "reason": "spam" }
                }
            }
        }))
        .expect("envelope should serialize");

        let event = OpaqueEvent::decode(&raw).expect("envelope should decode");
        let redaction = event
            .meta()
            .unsigned
            .as_ref()
            .and_then(|unsigned| unsigned.redacted_because.as_ref())
            .expect("redaction should be present");
        assert_eq!(redaction.event_id(), "$redaction");
    }

    #[test]
    fn fills_missing_room_id_only() {
        let raw = envelope("m.room.topic", json!({}));
        let event = OpaqueEvent::decode(&raw)
            .expect("envelope should decode")
            .with_room_id("!a:example.org")
            .with_room_id("!b:example.org");
        assert_eq!(event.room_id(), "!a:example.org");
    }

    #[test]
    fn into_typed_routes_by_kind() {
        let other = OpaqueEvent::decode(&envelope("m.room.name", json!({ "name": "x" })))
            .expect("envelope should decode");
        assert!(matches!(other.into_typed(), Ok(RoomEvent::Other(_))));

        let message = OpaqueEvent::decode(&envelope(
            EVENT_TYPE_MESSAGE,
            json!({ "msgtype": "m.notice", "body": "n" }),
        ))
        .expect("envelope should decode");
        match message.into_typed() {
            Ok(RoomEvent::Message(message)) => {
                assert_eq!(message.content.msgtype, MessageType::Notice)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
