use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// State of a sync loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncState {
    /// Ready to issue (or issuing) a long-poll.
    Polling,
    /// Waiting out the retry delay after a failed poll.
    BackoffWaiting,
    /// Cancelled by the caller or stopped on a permanent error.
    Stopped,
}

/// Owns the continuation token of one sync subscription and the loop state.
///
/// The token only moves forward on a successful poll, and it always moves on
/// one, even when the batch was empty. Failures leave it untouched so the
/// retry resumes from the same position.
#[derive(Debug, Clone)]
pub struct SyncCursor {
    state: SyncState,
    since: Option<String>,
    failed_attempts: u32,
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SyncCursor {
    /// Start polling from `since`, or from the live edge when `None`/empty.
    pub fn new(since: Option<String>) -> Self {
        Self {
            state: SyncState::Polling,
            since: since.filter(|token| !token.is_empty()),
            failed_attempts: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Token to pass as `since` on the next poll.
    pub fn since(&self) -> Option<&str> {
        self.since.as_deref()
    }

    /// Consecutive failed polls since the last success.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn on_poll_success(&mut self, next_batch: String) -> Result<(), ClientError> {
        self.expect_state(SyncState::Polling, "on_poll_success")?;
        self.since = Some(next_batch);
        self.failed_attempts = 0;
        Ok(())
    }

    /// Record a failed poll and return the zero-based retry attempt number.
    pub fn on_poll_failure(&mut self) -> Result<u32, ClientError> {
        self.expect_state(SyncState::Polling, "on_poll_failure")?;
        let attempt = self.failed_attempts;
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.state = SyncState::BackoffWaiting;
        Ok(attempt)
    }

    pub fn on_backoff_elapsed(&mut self) -> Result<(), ClientError> {
        self.expect_state(SyncState::BackoffWaiting, "on_backoff_elapsed")?;
        self.state = SyncState::Polling;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.state = SyncState::Stopped;
    }

    fn expect_state(&self, expected: SyncState, action: &str) -> Result<(), ClientError> {
        if self.state != expected {
            return Err(ClientError::contract(format!(
                "cannot run '{action}' while sync is in state {:?}",
                self.state
            )));
        }
        Ok(())
    }
}
