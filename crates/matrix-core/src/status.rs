use serde::{Deserialize, Serialize};

/// Progress reported by a running sync loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncStatus {
    /// A long-poll is being issued with this `since` token.
    Polling { since: Option<String> },
    /// A poll succeeded; `events` counts dispatched events.
    Synced { next_batch: String, events: usize },
    /// A poll failed and the loop waits `delay_ms` before retrying.
    BackingOff { delay_ms: u64, error_code: String },
    /// The loop has terminated.
    Stopped,
}
