use async_trait::async_trait;
use matrix_core::TransportError;
use tracing::trace;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

/// One request to the homeserver. `path` is relative to the homeserver base
/// URL and already percent-encoded, query included.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub method: Method,
    pub path: String,
    /// JSON request body.
    pub body: Option<Vec<u8>>,
    /// Bearer credential; `None` for unauthenticated calls such as login.
    pub access_token: Option<String>,
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone)]
pub struct ExchangeResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Performs one request/response exchange with the homeserver.
///
/// Implementations release any network resources they hold before returning,
/// whatever the outcome. Dropping the returned future abandons the exchange.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(&self, request: ExchangeRequest) -> Result<ExchangeResponse, TransportError>;
}

/// [`Exchange`] over HTTPS using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    http: reqwest::Client,
    homeserver: String,
}

impl HttpExchange {
    /// Build an exchange for the given homeserver base URL.
    ///
    /// No request timeout is configured here; callers bound each exchange
    /// themselves since long-polls legitimately stay open for a minute.
    pub fn new(homeserver: &str) -> Result<Self, TransportError> {
        let homeserver = normalize_homeserver(homeserver)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("matrix-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;

        Ok(Self { http, homeserver })
    }

    pub fn homeserver(&self) -> &str {
        &self.homeserver
    }
}

#[async_trait]
impl Exchange for HttpExchange {
    async fn exchange(&self, request: ExchangeRequest) -> Result<ExchangeResponse, TransportError> {
        let url = format!("{}{}", self.homeserver, request.path);
        trace!(method = ?request.method, %url, "http exchange");

        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Put => self.http.put(&url),
        };
        if let Some(token) = &request.access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(ExchangeResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn normalize_homeserver(homeserver: &str) -> Result<String, TransportError> {
    let parsed = Url::parse(homeserver.trim())
        .map_err(|err| TransportError::InvalidUrl(format!("{homeserver}: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(TransportError::InvalidUrl(format!(
            "{homeserver}: unsupported scheme '{}'",
            parsed.scheme()
        )));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_owned())
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::TimedOut
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slashes_from_homeserver() {
        assert_eq!(
            normalize_homeserver("https://matrix.example.org/").expect("valid url"),
            "https://matrix.example.org"
        );
        assert_eq!(
            normalize_homeserver(" https://example.org/matrix// ").expect("valid url"),
            "https://example.org/matrix"
        );
    }

    #[test]
    fn rejects_unusable_homeserver_urls() {
        assert!(matches!(
            normalize_homeserver("matrix.example.org"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            normalize_homeserver("ftp://matrix.example.org"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn builds_http_exchange_for_valid_homeserver() {
        let exchange = HttpExchange::new("http://localhost:8008/").expect("client should build");
        assert_eq!(exchange.homeserver(), "http://localhost:8008");
    }
}
