use matrix_core::{
    ClientError, EVENT_TYPE_MESSAGE, EVENT_TYPE_REACTION, MessageContent, ReactionContent,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{MatrixClient, client_path};

#[derive(Debug, Deserialize)]
struct SendResponse {
    event_id: String,
}

impl MatrixClient {
    /// Send one event to a room and return its event ID.
    ///
    /// A fresh transaction ID is drawn for the call. The exchange is issued
    /// once; on failure the error is returned and nothing is retried. Use
    /// [`MatrixClient::send_with_txn_id`] to retry a write under the same
    /// transaction ID.
    pub async fn send<C>(
        &self,
        room_id: &str,
        event_type: &str,
        content: &C,
    ) -> Result<String, ClientError>
    where
        C: Serialize + ?Sized + Sync,
    {
        let body = validate_send(room_id, event_type, content)?;
        let txn_id = self.next_txn_id();
        self.put_event(room_id, event_type, &txn_id, &body).await
    }

    /// Send under a caller-chosen transaction ID. Repeating the call with the
    /// same `(room_id, event_type, txn_id)` does not duplicate the event.
    pub async fn send_with_txn_id<C>(
        &self,
        room_id: &str,
        event_type: &str,
        txn_id: &str,
        content: &C,
    ) -> Result<String, ClientError>
    where
        C: Serialize + ?Sized + Sync,
    {
        let body = validate_send(room_id, event_type, content)?;
        if txn_id.trim().is_empty() {
            return Err(ClientError::contract("transaction id must not be empty"));
        }
        self.put_event(room_id, event_type, txn_id, &body).await
    }

    pub async fn send_message(
        &self,
        room_id: &str,
        content: &MessageContent,
    ) -> Result<String, ClientError> {
        self.send(room_id, EVENT_TYPE_MESSAGE, content).await
    }

    pub async fn send_reaction(
        &self,
        room_id: &str,
        content: &ReactionContent,
    ) -> Result<String, ClientError> {
        self.send(room_id, EVENT_TYPE_REACTION, content).await
    }

    async fn put_event(
        &self,
        room_id: &str,
        event_type: &str,
        txn_id: &str,
        body: &serde_json::Value,
    ) -> Result<String, ClientError> {
        let path = client_path(&["rooms", room_id, "send", event_type, txn_id]);
        debug!(room_id, event_type, txn_id, "sending event");

        match self.put::<_, SendResponse>(&path, body).await {
            Ok(response) => Ok(response.event_id),
            Err(err) => {
                warn!(room_id, event_type, txn_id, error = %err, "send failed");
                Err(err)
            }
        }
    }
}

fn validate_send<C>(
    room_id: &str,
    event_type: &str,
    content: &C,
) -> Result<serde_json::Value, ClientError>
where
    C: Serialize + ?Sized,
{
    if room_id.trim().is_empty() {
        return Err(ClientError::contract("room id must not be empty"));
    }
    if event_type.trim().is_empty() {
        return Err(ClientError::contract("event type must not be empty"));
    }

    let body = serde_json::to_value(content)?;
    if body.is_null() {
        return Err(ClientError::contract("event content must not be null"));
    }
    Ok(body)
}
