mod bot;
mod logging;

use std::{process::ExitCode, sync::Arc};

use matrix_client::{
    ClientConfig, Credentials, Exchange, HttpExchange, MatrixClient, Session, SyncLoop, login,
};
use matrix_core::{
    ClientError, EVENT_TYPE_MESSAGE, EVENT_TYPE_REACTION, Filter, SyncScope, SyncStatus,
};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bot::EchoHandler;

const DEVICE_DISPLAY_NAME: &str = "matrix-echo";
const REPLY_BUFFER: usize = 32;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, code = err.code(), "matrix-echo stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ClientConfig) -> Result<(), ClientError> {
    let exchange: Arc<dyn Exchange> = Arc::new(HttpExchange::new(&config.homeserver)?);
    let session = match &config.credentials {
        Credentials::AccessToken(token) => Session::from_access_token(token.clone()),
        Credentials::Password { user, password } => {
            login(exchange.as_ref(), user, password, Some(DEVICE_DISPLAY_NAME)).await?
        }
    };
    let client = MatrixClient::new(exchange, session)?.identified().await?;
    let own_user_id = client.user_id().unwrap_or_default().to_owned();
    info!(user_id = %own_user_id, homeserver = %config.homeserver, "session ready");

    let scope = match &config.room {
        Some(room) => SyncScope::Room(client.join_room(room).await?),
        None => SyncScope::AllJoined,
    };

    let mut sync_config = config.sync_config();
    if sync_config.filter.is_none()
        && let SyncScope::Room(room_id) = &scope
    {
        let filter = Filter::room_timeline(room_id, &[EVENT_TYPE_MESSAGE, EVENT_TYPE_REACTION]);
        match client.register_filter(&filter).await {
            Ok(filter_id) => sync_config.filter = Some(filter_id),
            Err(err) => warn!(error = %err, "filter registration failed, syncing unfiltered"),
        }
    }

    let (replies_tx, replies_rx) = mpsc::channel(REPLY_BUFFER);
    let sender = tokio::spawn(bot::send_replies(client.clone(), replies_rx));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let mut sync = SyncLoop::new(
        client,
        scope,
        sync_config,
        EchoHandler::new(own_user_id, replies_tx),
    );
    tokio::spawn(log_status(sync.subscribe()));

    let result = sync.run(&cancel).await;
    if let Some(since) = sync.since() {
        info!(%since, "last sync token");
    }

    // Closing the handler's queue lets the sender drain and exit.
    drop(sync);
    if let Err(err) = sender.await {
        error!(error = %err, "reply sender ended abnormally");
    }
    result
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("interrupt received, shutting down");
            cancel.cancel();
        }
        Err(err) => error!(error = %err, "cannot listen for interrupt"),
    }
}

async fn log_status(mut status: broadcast::Receiver<SyncStatus>) {
    loop {
        match status.recv().await {
            Ok(SyncStatus::BackingOff {
                delay_ms,
                error_code,
            }) => info!(delay_ms, %error_code, "sync backing off"),
            Ok(SyncStatus::Stopped) | Err(broadcast::error::RecvError::Closed) => break,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
    }
}
