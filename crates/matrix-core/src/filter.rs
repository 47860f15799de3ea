//! Filter definitions accepted by `POST /user/{userId}/filter`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "EventFilter::is_empty")]
    pub account_data: EventFilter,
    #[serde(rename = "event_fields", default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(rename = "event_format", default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "EventFilter::is_empty")]
    pub presence: EventFilter,
    #[serde(default)]
    pub room: RoomFilter,
}

/// Filter for non-room events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_senders: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub senders: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
}

impl EventFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomFilter {
    #[serde(default, skip_serializing_if = "RoomEventFilter::is_empty")]
    pub account_data: RoomEventFilter,
    #[serde(default, skip_serializing_if = "RoomEventFilter::is_empty")]
    pub ephemeral: RoomEventFilter,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_leave: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_rooms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rooms: Vec<String>,
    #[serde(default, skip_serializing_if = "RoomEventFilter::is_empty")]
    pub state: RoomEventFilter,
    #[serde(default, skip_serializing_if = "RoomEventFilter::is_empty")]
    pub timeline: RoomEventFilter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEventFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains_url: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_redundant_members: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub lazy_load_members: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_senders: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub senders: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_rooms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rooms: Vec<String>,
}

impl RoomEventFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl Filter {
    /// Restrict sync to the timeline of `room_id`, carrying only `event_types`.
    pub fn room_timeline(room_id: impl Into<String>, event_types: &[&str]) -> Self {
        Self {
            room: RoomFilter {
                rooms: vec![room_id.into()],
                timeline: RoomEventFilter {
                    types: event_types.iter().map(|t| (*t).to_owned()).collect(),
                    ..RoomEventFilter::default()
                },
                ..RoomFilter::default()
            },
            ..Self::default()
        }
    }
}
