//! Wire model of a `/sync` response.
//!
//! Event lists are kept as raw JSON spans so one malformed event cannot fail
//! the decoding of the whole response; envelopes are decoded per event when
//! a timeline is turned into a [`RoomTimelineBatch`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::value::RawValue;

use crate::{error::ClientError, event::OpaqueEvent};

/// Which rooms a sync subscription dispatches events for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Only the timeline of this joined room.
    Room(String),
    /// Every joined room, visited in room ID order.
    AllJoined,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncResponse {
    /// Continuation token for the next poll. Always present on success.
    pub next_batch: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub account_data: EventBatch,
    #[serde(default, deserialize_with = "null_as_default")]
    pub presence: EventBatch,
    #[serde(default, deserialize_with = "null_as_default")]
    pub to_device: EventBatch,
    #[serde(default, deserialize_with = "null_as_default")]
    pub device_lists: DeviceLists,
    #[serde(default, deserialize_with = "null_as_default")]
    pub device_one_time_keys_count: BTreeMap<String, u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rooms: Rooms,
}

/// An object that only wraps an `events` list. `/sync` has many of those.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventBatch {
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Box<RawValue>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceLists {
    #[serde(default, deserialize_with = "null_as_default")]
    pub changed: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub left: Vec<String>,
}

/// Rooms the client interacted with, grouped by membership.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rooms {
    #[serde(default, deserialize_with = "null_as_default")]
    pub join: BTreeMap<String, JoinedRoom>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub invite: BTreeMap<String, InvitedRoom>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub knock: BTreeMap<String, KnockedRoom>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub leave: BTreeMap<String, LeftRoom>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinedRoom {
    #[serde(default, deserialize_with = "null_as_default")]
    pub account_data: EventBatch,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ephemeral: EventBatch,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: EventBatch,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: RoomSummary,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timeline: Timeline,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unread_notifications: UnreadNotificationCounts,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomSummary {
    #[serde(rename = "m.heroes", default, deserialize_with = "null_as_default")]
    pub heroes: Vec<String>,
    #[serde(rename = "m.invited_member_count", default, deserialize_with = "null_as_default")]
    pub invited_member_count: u64,
    #[serde(rename = "m.joined_member_count", default, deserialize_with = "null_as_default")]
    pub joined_member_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnreadNotificationCounts {
    #[serde(default, deserialize_with = "null_as_default")]
    pub highlight_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notification_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Timeline {
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Box<RawValue>>,
    /// Set when the server dropped events between this batch and the previous one.
    #[serde(default, deserialize_with = "null_as_default")]
    pub limited: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prev_batch: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvitedRoom {
    #[serde(default, deserialize_with = "null_as_default")]
    pub invite_state: EventBatch,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnockedRoom {
    #[serde(default, deserialize_with = "null_as_default")]
    pub knock_state: EventBatch,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeftRoom {
    #[serde(default, deserialize_with = "null_as_default")]
    pub account_data: EventBatch,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: EventBatch,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timeline: Timeline,
}

/// Reads `null` as the type's default. Some homeservers send `null` for empty
/// lists and objects.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decoded timeline of one room for one poll, in server order.
#[derive(Debug, Clone)]
pub struct RoomTimelineBatch {
    pub room_id: String,
    pub events: Vec<OpaqueEvent>,
    pub prev_batch: Option<String>,
    pub limited: bool,
    /// Envelopes that failed to decode; they are excluded from `events`.
    pub malformed: Vec<String>,
}

impl Timeline {
    /// Decode every envelope, filling in `room_id` where it was omitted.
    pub fn decode(&self, room_id: &str) -> RoomTimelineBatch {
        let mut events = Vec::with_capacity(self.events.len());
        let mut malformed = Vec::new();

        for raw in &self.events {
            match OpaqueEvent::decode_raw(raw) {
                Ok(event) => events.push(event.with_room_id(room_id)),
                Err(ClientError::MalformedEnvelope(reason)) => malformed.push(reason),
                Err(other) => malformed.push(other.to_string()),
            }
        }

        RoomTimelineBatch {
            room_id: room_id.to_owned(),
            events,
            prev_batch: self.prev_batch.clone(),
            limited: self.limited,
            malformed,
        }
    }
}

impl SyncResponse {
    /// Joined-room timelines selected by `scope`.
    pub fn timeline_batches(&self, scope: &SyncScope) -> Vec<RoomTimelineBatch> {
        match scope {
            SyncScope::Room(room_id) => self
                .rooms
                .join
                .get(room_id)
                .map(|room| vec![room.timeline.decode(room_id)])
                .unwrap_or_default(),
            SyncScope::AllJoined => self
                .rooms
                .join
                .iter()
                .map(|(room_id, room)| room.timeline.decode(room_id))
                .collect(),
        }
    }
}
