use matrix_core::ClientError;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    client::{MatrixClient, Session, client_path, perform},
    transport::{Exchange, Method},
};

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "type")]
    login_type: &'static str,
    identifier: UserIdentifier<'a>,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    initial_device_display_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UserIdentifier<'a> {
    #[serde(rename = "type")]
    id_type: &'static str,
    user: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user_id: String,
    access_token: String,
    device_id: String,
}

/// Owner of an access token as reported by the homeserver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WhoAmI {
    pub user_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Password login. Creates a new device unless the homeserver reuses one.
pub async fn login(
    exchange: &dyn Exchange,
    user: &str,
    password: &str,
    device_display_name: Option<&str>,
) -> Result<Session, ClientError> {
    if user.trim().is_empty() {
        return Err(ClientError::contract("user must not be empty"));
    }

    let request = LoginRequest {
        login_type: "m.login.password",
        identifier: UserIdentifier {
            id_type: "m.id.user",
            user,
        },
        password,
        initial_device_display_name: device_display_name,
    };
    let body = serde_json::to_vec(&request)?;
    let response: LoginResponse =
        perform(exchange, Method::Post, &client_path(&["login"]), Some(body), None).await?;
    info!(user_id = %response.user_id, device_id = %response.device_id, "logged in");

    Ok(Session {
        user_id: Some(response.user_id),
        device_id: Some(response.device_id),
        access_token: response.access_token,
    })
}

impl MatrixClient {
    pub async fn whoami(&self) -> Result<WhoAmI, ClientError> {
        self.get(&client_path(&["account", "whoami"])).await
    }

    /// Fill in the user and device IDs from `whoami` when the session was
    /// built from a bare access token.
    pub async fn identified(self) -> Result<Self, ClientError> {
        if self.user_id().is_some() {
            return Ok(self);
        }

        let who = self.whoami().await?;
        info!(user_id = %who.user_id, "resolved session owner");
        Ok(self.with_identity(who.user_id, who.device_id))
    }
}
