use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// Generates transaction IDs for outbound events.
///
/// The homeserver deduplicates writes on `(device, transaction ID)`, so every
/// send path of one device session must share a single generator. IDs are
/// decimal, strictly increasing and unique for the lifetime of the generator.
/// The seed is the wall clock in milliseconds so a restarted process does not
/// reuse IDs from a previous run.
#[derive(Debug)]
pub struct TxnIdGenerator {
    last: AtomicU64,
}

impl TxnIdGenerator {
    pub fn new() -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        Self::with_seed(now_ms)
    }

    /// Start after `seed`; the first issued ID is `seed + 1`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            last: AtomicU64::new(seed),
        }
    }

    pub fn next_id(&self) -> String {
        let previous = self.last.fetch_add(1, Ordering::Relaxed);
        previous.wrapping_add(1).to_string()
    }
}

impl Default for TxnIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
