use std::sync::Arc;

use matrix_core::{ClientError, ServerError, TxnIdGenerator};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::form_urlencoded;

use crate::transport::{Exchange, ExchangeRequest, ExchangeResponse, HttpExchange, Method};

/// Path prefix of the client-server API.
pub const CLIENT_API_PREFIX: &str = "/_matrix/client/v3";

/// Credentials of one logged-in device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub access_token: String,
}

impl Session {
    pub fn from_access_token(access_token: impl Into<String>) -> Self {
        Self {
            user_id: None,
            device_id: None,
            access_token: access_token.into(),
        }
    }
}

/// Authenticated handle to one homeserver for one device session.
///
/// Clones share the exchange and the transaction ID generator, so every send
/// path of the session draws from the same ID sequence.
#[derive(Clone)]
pub struct MatrixClient {
    exchange: Arc<dyn Exchange>,
    session: Arc<Session>,
    txn_ids: Arc<TxnIdGenerator>,
}

impl std::fmt::Debug for MatrixClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixClient")
            .field("user_id", &self.session.user_id)
            .field("device_id", &self.session.device_id)
            .finish_non_exhaustive()
    }
}

impl MatrixClient {
    pub fn new(exchange: Arc<dyn Exchange>, session: Session) -> Result<Self, ClientError> {
        if session.access_token.trim().is_empty() {
            return Err(ClientError::contract("access token must not be empty"));
        }

        Ok(Self {
            exchange,
            session: Arc::new(session),
            txn_ids: Arc::new(TxnIdGenerator::new()),
        })
    }

    /// Client talking to `homeserver` over HTTPS.
    pub fn connect(homeserver: &str, session: Session) -> Result<Self, ClientError> {
        Self::new(Arc::new(HttpExchange::new(homeserver)?), session)
    }

    /// Replace the transaction ID generator, for example with a fixed seed.
    pub fn with_txn_ids(mut self, txn_ids: Arc<TxnIdGenerator>) -> Self {
        self.txn_ids = txn_ids;
        self
    }

    pub(crate) fn with_identity(mut self, user_id: String, device_id: Option<String>) -> Self {
        let session = Arc::make_mut(&mut self.session);
        session.user_id = Some(user_id);
        if device_id.is_some() {
            session.device_id = device_id;
        }
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.user_id.as_deref()
    }

    pub fn next_txn_id(&self) -> String {
        self.txn_ids.next_id()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(Method::Get, path, None).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.request(Method::Post, path, Some(serde_json::to_vec(body)?))
            .await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.request(Method::Put, path, Some(serde_json::to_vec(body)?))
            .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T, ClientError> {
        perform(
            self.exchange.as_ref(),
            method,
            path,
            body,
            Some(&self.session.access_token),
        )
        .await
    }
}

/// Run one exchange and decode a successful response into `T`.
pub(crate) async fn perform<T: DeserializeOwned>(
    exchange: &dyn Exchange,
    method: Method,
    path: &str,
    body: Option<Vec<u8>>,
    access_token: Option<&str>,
) -> Result<T, ClientError> {
    let response = exchange
        .exchange(ExchangeRequest {
            method,
            path: path.to_owned(),
            body,
            access_token: access_token.map(str::to_owned),
        })
        .await?;

    check_response(&response)?;
    Ok(serde_json::from_slice(&response.body)?)
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddedError {
    errcode: Option<String>,
    error: Option<String>,
    retry_after_ms: Option<u64>,
}

/// Fail on a non-success status or an `{errcode, error}` pair in the body.
pub(crate) fn check_response(response: &ExchangeResponse) -> Result<(), ServerError> {
    let embedded = serde_json::from_slice::<EmbeddedError>(&response.body).unwrap_or_default();
    let success = (200..300).contains(&response.status);
    if success && embedded.errcode.is_none() && embedded.error.is_none() {
        return Ok(());
    }

    Err(ServerError {
        status: response.status,
        errcode: embedded.errcode.unwrap_or_else(|| "M_UNKNOWN".to_owned()),
        message: embedded
            .error
            .unwrap_or_else(|| format!("HTTP status {}", response.status)),
        retry_after_ms: embedded.retry_after_ms,
    })
}

/// Percent-encode one path segment.
pub(crate) fn encode_segment(segment: &str) -> String {
    // form encoding writes spaces as '+' and escapes literal '+'
    form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Client-server API path built from unencoded segments.
pub(crate) fn client_path(segments: &[&str]) -> String {
    let mut path = String::from(CLIENT_API_PREFIX);
    for segment in segments {
        path.push('/');
        path.push_str(&encode_segment(segment));
    }
    path
}
