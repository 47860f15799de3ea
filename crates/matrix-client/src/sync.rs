//! Long-poll sync loop.
//!
//! The loop alternates between two states. In `Polling` it issues `/sync`
//! with the current `since` token and a server-side wait budget, bounded on
//! the client side by that budget plus a margin. A successful poll always
//! advances the token, then its timeline events are dispatched in order. A
//! failed poll keeps the token and moves to `BackoffWaiting` for the retry
//! delay. Failures are retried forever unless the caller opts into stopping on
//! permanent (authentication) errors. Cancellation is observed before each
//! poll, during the poll itself, and during the backoff wait.

use std::time::Duration;

use matrix_core::{
    ClientError, EventKind, OpaqueEvent, RetryPolicy, SyncCursor, SyncResponse, SyncScope,
    SyncState, SyncStatus,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::form_urlencoded;

use crate::{
    client::{MatrixClient, client_path},
    handler::EventHandler,
};

/// Server-side wait budget of one long-poll.
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(60);
/// Extra client-side time granted on top of the server budget.
pub const DEFAULT_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);
const STATUS_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub server_timeout: Duration,
    pub timeout_margin: Duration,
    pub retry: RetryPolicy,
    /// Filter ID from filter registration.
    pub filter: Option<String>,
    /// Token to resume from; `None` starts at the live edge.
    pub since: Option<String>,
    /// Stop instead of retrying when the homeserver rejects the credential.
    pub stop_on_permanent_error: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_timeout: DEFAULT_SERVER_TIMEOUT,
            timeout_margin: DEFAULT_TIMEOUT_MARGIN,
            retry: RetryPolicy::default(),
            filter: None,
            since: None,
            stop_on_permanent_error: false,
        }
    }
}

impl SyncConfig {
    /// Client-side deadline of one long-poll exchange.
    pub fn request_deadline(&self) -> Duration {
        self.server_timeout + self.timeout_margin
    }
}

/// `/sync` path with its query string.
pub fn sync_path(since: Option<&str>, server_timeout: Duration, filter: Option<&str>) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("timeout", &server_timeout.as_millis().to_string());
    if let Some(since) = since {
        query.append_pair("since", since);
    }
    if let Some(filter) = filter {
        query.append_pair("filter", filter);
    }
    format!("{}?{}", client_path(&["sync"]), query.finish())
}

/// One sync subscription. Owns its continuation token exclusively; running
/// two loops over the same token lineage duplicates or skips events.
pub struct SyncLoop<H> {
    client: MatrixClient,
    scope: SyncScope,
    config: SyncConfig,
    handler: H,
    cursor: SyncCursor,
    status_tx: broadcast::Sender<SyncStatus>,
}

impl<H: EventHandler> SyncLoop<H> {
    pub fn new(client: MatrixClient, scope: SyncScope, config: SyncConfig, handler: H) -> Self {
        let cursor = SyncCursor::new(config.since.clone());
        let (status_tx, _) = broadcast::channel(STATUS_BUFFER);

        Self {
            client,
            scope,
            config,
            handler,
            cursor,
            status_tx,
        }
    }

    /// Subscribe to status updates. Emission is best-effort.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Token the next poll would use. Persist it to resume later.
    pub fn since(&self) -> Option<&str> {
        self.cursor.since()
    }

    pub fn state(&self) -> SyncState {
        self.cursor.state()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Poll until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation. Returns an error only for a
    /// permanent failure when `stop_on_permanent_error` is set.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<(), ClientError> {
        info!(scope = ?self.scope, since = ?self.cursor.since(), "sync loop started");
        let outcome = self.poll_until_cancelled(cancel).await;

        self.cursor.stop();
        self.emit(SyncStatus::Stopped);
        match &outcome {
            Ok(()) => info!(since = ?self.cursor.since(), "sync loop stopped"),
            Err(err) => error!(error = %err, since = ?self.cursor.since(), "sync loop aborted"),
        }
        outcome
    }

    async fn poll_until_cancelled(&mut self, cancel: &CancellationToken) -> Result<(), ClientError> {
        while !cancel.is_cancelled() {
            let since = self.cursor.since().map(str::to_owned);
            self.emit(SyncStatus::Polling {
                since: since.clone(),
            });

            let err = match poll(&self.client, &self.config, since.as_deref(), cancel).await {
                Ok(response) => {
                    self.cursor.on_poll_success(response.next_batch.clone())?;
                    let events = self.dispatch(&response);
                    trace!(next_batch = %response.next_batch, events, "sync batch processed");
                    self.emit(SyncStatus::Synced {
                        next_batch: response.next_batch,
                        events,
                    });
                    continue;
                }
                Err(ClientError::Cancelled) => return Ok(()),
                Err(err) => err,
            };

            if self.config.stop_on_permanent_error && err.is_permanent() {
                return Err(err);
            }

            let attempt = self.cursor.on_poll_failure()?;
            let delay = self
                .config
                .retry
                .delay_for_attempt(attempt, err.retry_after_ms());
            warn!(
                error = %err,
                attempt,
                delay_ms = delay.as_millis() as u64,
                since = ?since,
                "sync poll failed, backing off"
            );
            self.emit(SyncStatus::BackingOff {
                delay_ms: delay.as_millis() as u64,
                error_code: err.code().to_owned(),
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
            self.cursor.on_backoff_elapsed()?;
        }

        Ok(())
    }

    fn dispatch(&mut self, response: &SyncResponse) -> usize {
        let mut dispatched = 0;

        for batch in response.timeline_batches(&self.scope) {
            for reason in &batch.malformed {
                warn!(room_id = %batch.room_id, %reason, "skipping malformed event");
            }
            if batch.limited {
                debug!(
                    room_id = %batch.room_id,
                    prev_batch = ?batch.prev_batch,
                    "timeline limited, older events were not delivered"
                );
            }

            for event in batch.events {
                if dispatch_event(&mut self.handler, event) {
                    dispatched += 1;
                }
            }
        }

        dispatched
    }

    fn emit(&self, status: SyncStatus) {
        let _ = self.status_tx.send(status);
    }
}

impl<H: EventHandler + 'static> SyncLoop<H> {
    /// Run the loop on its own task.
    pub fn spawn(mut self) -> SyncHandle {
        let cancel = CancellationToken::new();
        let child = cancel.child_token();
        let task = tokio::spawn(async move {
            self.run(&child).await?;
            Ok(self.cursor.since().map(str::to_owned))
        });

        SyncHandle { cancel, task }
    }
}

/// Handle to a loop started with [`SyncLoop::spawn`].
#[derive(Debug)]
pub struct SyncHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<Option<String>, ClientError>>,
}

impl SyncHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it; yields the last continuation token.
    pub async fn stop(self) -> Result<Option<String>, ClientError> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the loop to end on its own (permanent error). A panic in the
    /// handler is resumed on the caller.
    pub async fn join(self) -> Result<Option<String>, ClientError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                error!("sync task panicked");
                std::panic::resume_unwind(err.into_panic())
            }
            Err(err) => {
                error!(error = %err, "sync task ended abnormally");
                Err(ClientError::Cancelled)
            }
        }
    }
}

/// Issue one long-poll bounded by the client-side deadline and `cancel`.
async fn poll(
    client: &MatrixClient,
    config: &SyncConfig,
    since: Option<&str>,
    cancel: &CancellationToken,
) -> Result<SyncResponse, ClientError> {
    let path = sync_path(since, config.server_timeout, config.filter.as_deref());
    let deadline = config.request_deadline();
    debug!(since = ?since, "polling sync");

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        result = tokio::time::timeout(deadline, client.get::<SyncResponse>(&path)) => {
            match result {
                Ok(response) => response,
                Err(_) => Err(ClientError::Timeout { after: deadline }),
            }
        }
    }
}

/// Decode and hand one event to the handler. Returns whether it was delivered.
fn dispatch_event<H: EventHandler>(handler: &mut H, event: OpaqueEvent) -> bool {
    let delivered = match event.kind() {
        EventKind::Message => event.as_message().map(|message| handler.on_message(message)),
        EventKind::Reaction => event
            .as_reaction()
            .map(|reaction| handler.on_reaction(reaction)),
        EventKind::Other => {
            handler.on_other(&event);
            Ok(())
        }
    };

    match delivered {
        Ok(()) => true,
        Err(err) => {
            warn!(
                event_id = event.event_id(),
                event_type = event.event_type(),
                error = %err,
                "skipping undecodable event"
            );
            false
        }
    }
}
