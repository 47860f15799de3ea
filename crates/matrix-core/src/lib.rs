//! I/O-free Matrix client model shared by the sync loop and the sender.
//!
//! This crate defines the error taxonomy, the opaque event envelope and its
//! typed views, the transaction ID generator, the sync cursor state machine,
//! the retry policy and the `/sync` response wire model.

/// Opaque event envelope decoding and typed event views.
pub mod event;
/// Stable client error types and HTTP classification helpers.
pub mod error;
/// Filter definitions accepted by the filter registration endpoint.
pub mod filter;
/// Backoff policy used by the sync loop.
pub mod retry;
/// Sync cursor state machine (continuation token ownership).
pub mod cursor;
/// Sync status updates emitted by a running sync loop.
pub mod status;
/// `/sync` response wire model.
pub mod sync;
/// Per-session transaction ID generator.
pub mod txid;

pub use cursor::{SyncCursor, SyncState};
pub use error::{ClientError, ErrorCategory, ServerError, TransportError, classify_http_status};
pub use event::{
    EVENT_TYPE_MESSAGE, EVENT_TYPE_REACTION, EventKind, EventMeta, EventReference,
    MessageContent, MessageEvent, MessageRelation, MessageType, OpaqueEvent, ReactionContent,
    ReactionEvent, ReactionRelation, RoomEvent, UnsignedData,
};
pub use filter::{EventFilter, Filter, RoomEventFilter, RoomFilter};
pub use retry::RetryPolicy;
pub use status::SyncStatus;
pub use sync::{RoomTimelineBatch, SyncResponse, SyncScope};
pub use txid::TxnIdGenerator;
