use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error category used for retry decisions and logging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network failure, unreachable homeserver, or client-side timeout.
    Transport,
    /// Authentication/authorization failure.
    Auth,
    /// Rate-limited by homeserver.
    RateLimited,
    /// Invalid request as judged by the homeserver.
    Config,
    /// Homeserver-side failure.
    Server,
    /// Malformed envelope, content, or response body.
    Decode,
    /// The caller broke a documented precondition.
    Contract,
    /// The operation was cancelled by the caller.
    Cancelled,
}

/// Map HTTP status codes to error categories.
pub fn classify_http_status(status: u16) -> ErrorCategory {
    match status {
        401 | 403 => ErrorCategory::Auth,
        408 | 429 => ErrorCategory::RateLimited,
        400..=499 => ErrorCategory::Config,
        _ => ErrorCategory::Server,
    }
}

/// Failure of the underlying request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The homeserver URL could not be used to build a request.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// No connection could be established.
    #[error("connection failed: {0}")]
    Connect(String),
    /// The exchange timed out inside the transport.
    #[error("request timed out")]
    TimedOut,
    /// Any other failure while sending or reading the exchange.
    #[error("request failed: {0}")]
    Request(String),
}

/// Error reported by the homeserver, either through a non-success status or
/// an `{errcode, error}` pair embedded in an otherwise successful body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("homeserver error (status {status}): {errcode}: {message}")]
pub struct ServerError {
    /// HTTP status of the exchange.
    pub status: u16,
    /// Matrix error code, for example `M_FORBIDDEN`.
    pub errcode: String,
    /// Human-readable message from the homeserver.
    pub message: String,
    /// Retry hint attached to `M_LIMIT_EXCEEDED`.
    pub retry_after_ms: Option<u64>,
}

impl ServerError {
    /// Category derived from the error code first and the HTTP status second.
    pub fn category(&self) -> ErrorCategory {
        match self.errcode.as_str() {
            "M_UNKNOWN_TOKEN" | "M_MISSING_TOKEN" | "M_FORBIDDEN" => ErrorCategory::Auth,
            "M_LIMIT_EXCEEDED" => ErrorCategory::RateLimited,
            _ if (200..300).contains(&self.status) => ErrorCategory::Server,
            _ => classify_http_status(self.status),
        }
    }
}

/// Error returned by every client operation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The exchange never produced a response.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    /// The client-side deadline elapsed before the homeserver answered.
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },
    /// The homeserver answered with an error.
    #[error(transparent)]
    Protocol(#[from] ServerError),
    /// An event envelope lacked required fields or was not valid JSON.
    #[error("malformed event envelope: {0}")]
    MalformedEnvelope(String),
    /// Event content did not match the shape its type announces.
    #[error("cannot decode {event_type} content: {source}")]
    ContentDecode {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
    /// A documented precondition was broken by the caller.
    #[error("caller contract violated: {0}")]
    ContractViolation(String),
    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
    /// A request or response body could not be (de)serialized.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Build a contract violation error.
    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => ErrorCategory::Transport,
            Self::Protocol(err) => err.category(),
            Self::MalformedEnvelope(_) | Self::ContentDecode { .. } | Self::Serialization(_) => {
                ErrorCategory::Decode
            }
            Self::ContractViolation(_) => ErrorCategory::Contract,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Stable machine-readable code, the Matrix `errcode` for protocol errors.
    pub fn code(&self) -> &str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Timeout { .. } => "timeout",
            Self::Protocol(err) => &err.errcode,
            Self::MalformedEnvelope(_) => "malformed_envelope",
            Self::ContentDecode { .. } => "content_decode_error",
            Self::ContractViolation(_) => "contract_violation",
            Self::Cancelled => "cancelled",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Whether retrying the same request cannot succeed without caller action.
    ///
    /// Only authentication failures qualify; everything else the homeserver
    /// reports may clear up on its own.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Protocol(_)) && self.category() == ErrorCategory::Auth
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Protocol(err) => err.retry_after_ms,
            _ => None,
        }
    }
}
