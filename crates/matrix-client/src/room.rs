use matrix_core::ClientError;
use serde::Deserialize;
use tracing::info;

use crate::client::{MatrixClient, client_path};

#[derive(Debug, Deserialize)]
struct JoinResponse {
    room_id: String,
}

#[derive(Debug, Deserialize)]
struct JoinedRoomsResponse {
    joined_rooms: Vec<String>,
}

impl MatrixClient {
    /// Join a room by ID or alias; returns the room ID.
    pub async fn join_room(&self, room_id_or_alias: &str) -> Result<String, ClientError> {
        if room_id_or_alias.trim().is_empty() {
            return Err(ClientError::contract("room id must not be empty"));
        }

        let response: JoinResponse = self
            .post(
                &client_path(&["join", room_id_or_alias]),
                &serde_json::json!({}),
            )
            .await?;
        info!(room_id = %response.room_id, "joined room");
        Ok(response.room_id)
    }

    pub async fn joined_rooms(&self) -> Result<Vec<String>, ClientError> {
        let response: JoinedRoomsResponse = self.get(&client_path(&["joined_rooms"])).await?;
        Ok(response.joined_rooms)
    }
}
