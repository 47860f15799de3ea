//! Environment-backed client configuration.

use std::{env, error::Error, fmt, time::Duration};

use matrix_core::RetryPolicy;

use crate::sync::{DEFAULT_SERVER_TIMEOUT, DEFAULT_TIMEOUT_MARGIN, SyncConfig};

const DEFAULT_RETRY_DELAY_MS: u64 = 10_000;

/// How the client authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Reuse an existing device session.
    AccessToken(String),
    /// Log in and create a device.
    Password { user: String, password: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken(..)"),
            Self::Password { user, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .finish_non_exhaustive(),
        }
    }
}

/// Runtime configuration of a client and its sync loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Homeserver base URL, for example `https://matrix.example.org`.
    pub homeserver: String,
    pub credentials: Credentials,
    /// Room to join and subscribe to; every joined room when unset.
    pub room: Option<String>,
    pub sync_timeout_ms: u64,
    pub sync_timeout_margin_ms: u64,
    pub sync_retry_delay_ms: u64,
    /// Previously registered filter ID.
    pub sync_filter: Option<String>,
    pub stop_on_auth_error: bool,
}

impl ClientConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let homeserver = required_env("MATRIX_HOMESERVER", &mut lookup)?;

        let credentials = match optional_trimmed_env("MATRIX_ACCESS_TOKEN", &mut lookup) {
            Some(token) => Credentials::AccessToken(token),
            None => Credentials::Password {
                user: required_env("MATRIX_USER", &mut lookup)?,
                password: required_env("MATRIX_PASSWORD", &mut lookup)?,
            },
        };

        let room = optional_trimmed_env("MATRIX_ROOM", &mut lookup);
        let sync_timeout_ms = parse_u64_with_default(
            "MATRIX_SYNC_TIMEOUT_MS",
            DEFAULT_SERVER_TIMEOUT.as_millis() as u64,
            &mut lookup,
        )?;
        let sync_timeout_margin_ms = parse_u64_with_default(
            "MATRIX_SYNC_TIMEOUT_MARGIN_MS",
            DEFAULT_TIMEOUT_MARGIN.as_millis() as u64,
            &mut lookup,
        )?;
        let sync_retry_delay_ms = parse_u64_with_default(
            "MATRIX_SYNC_RETRY_DELAY_MS",
            DEFAULT_RETRY_DELAY_MS,
            &mut lookup,
        )?;
        let sync_filter = optional_trimmed_env("MATRIX_SYNC_FILTER", &mut lookup);
        let stop_on_auth_error = parse_bool("MATRIX_SYNC_STOP_ON_AUTH_ERROR", &mut lookup)?;

        if sync_timeout_margin_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MATRIX_SYNC_TIMEOUT_MARGIN_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            homeserver,
            credentials,
            room,
            sync_timeout_ms,
            sync_timeout_margin_ms,
            sync_retry_delay_ms,
            sync_filter,
            stop_on_auth_error,
        })
    }

    /// Sync loop settings derived from this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            server_timeout: Duration::from_millis(self.sync_timeout_ms),
            timeout_margin: Duration::from_millis(self.sync_timeout_margin_ms),
            retry: RetryPolicy::fixed(Duration::from_millis(self.sync_retry_delay_ms)),
            filter: self.sync_filter.clone(),
            since: None,
            stop_on_permanent_error: self.stop_on_auth_error,
        }
    }
}

/// Errors produced while parsing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is unset or blank.
    Missing { key: &'static str },
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { key } => write!(f, "missing required {key}"),
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required_env<F>(key: &'static str, lookup: &mut F) -> Result<String, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    optional_trimmed_env(key, lookup).ok_or(ConfigError::Missing { key })
}

fn parse_u64_with_default<F>(
    key: &'static str,
    default: u64,
    lookup: &mut F,
) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_bool<F>(key: &'static str, lookup: &mut F) -> Result<bool, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected a boolean".to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from_pairs(pairs: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let map = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        ClientConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn parses_token_config_with_defaults() {
        let cfg = config_from_pairs(&[
            ("MATRIX_HOMESERVER", "https://matrix.example.org"),
            ("MATRIX_ACCESS_TOKEN", " syt_abc "),
        ])
        .expect("config should parse");

        assert_eq!(cfg.homeserver, "https://matrix.example.org");
        assert_eq!(cfg.credentials, Credentials::AccessToken("syt_abc".into()));
        assert_eq!(cfg.room, None);

        let sync = cfg.sync_config();
        assert_eq!(sync.server_timeout, Duration::from_secs(60));
        assert_eq!(sync.request_deadline(), Duration::from_secs(70));
        assert_eq!(
            sync.retry.delay_for_attempt(3, None),
            Duration::from_secs(10)
        );
        assert!(!sync.stop_on_permanent_error);
    }

    #[test]
    fn falls_back_to_password_credentials() {
        let cfg = config_from_pairs(&[
            ("MATRIX_HOMESERVER", "https://matrix.example.org"),
            ("MATRIX_USER", "@bot:example.org"),
            ("MATRIX_PASSWORD", "secret"),
            ("MATRIX_ROOM", "!room:example.org"),
        ])
        .expect("config should parse");

        assert_eq!(
            cfg.credentials,
            Credentials::Password {
                user: "@bot:example.org".into(),
                password: "secret".into(),
            }
        );
        assert_eq!(cfg.room.as_deref(), Some("!room:example.org"));
    }

    #[test]
    fn reports_missing_required_values() {
        let err = config_from_pairs(&[]).expect_err("homeserver is required");
        assert_eq!(
            err,
            ConfigError::Missing {
                key: "MATRIX_HOMESERVER"
            }
        );

        let err = config_from_pairs(&[
            ("MATRIX_HOMESERVER", "https://matrix.example.org"),
            ("MATRIX_USER", "@bot:example.org"),
        ])
        .expect_err("password is required without a token");
        assert_eq!(
            err,
            ConfigError::Missing {
                key: "MATRIX_PASSWORD"
            }
        );
    }

    #[test]
    fn parses_sync_tuning() {
        let cfg = config_from_pairs(&[
            ("MATRIX_HOMESERVER", "https://matrix.example.org"),
            ("MATRIX_ACCESS_TOKEN", "t"),
            ("MATRIX_SYNC_TIMEOUT_MS", "30000"),
            ("MATRIX_SYNC_TIMEOUT_MARGIN_MS", "5000"),
            ("MATRIX_SYNC_RETRY_DELAY_MS", "2500"),
            ("MATRIX_SYNC_FILTER", "f1"),
            ("MATRIX_SYNC_STOP_ON_AUTH_ERROR", "yes"),
        ])
        .expect("config should parse");

        let sync = cfg.sync_config();
        assert_eq!(sync.request_deadline(), Duration::from_secs(35));
        assert_eq!(
            sync.retry.delay_for_attempt(0, None),
            Duration::from_millis(2_500)
        );
        assert_eq!(sync.filter.as_deref(), Some("f1"));
        assert!(sync.stop_on_permanent_error);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = config_from_pairs(&[
            ("MATRIX_HOMESERVER", "https://matrix.example.org"),
            ("MATRIX_ACCESS_TOKEN", "t"),
            ("MATRIX_SYNC_TIMEOUT_MS", "soon"),
        ])
        .expect_err("invalid timeout should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "MATRIX_SYNC_TIMEOUT_MS",
                ..
            }
        ));

        let err = config_from_pairs(&[
            ("MATRIX_HOMESERVER", "https://matrix.example.org"),
            ("MATRIX_ACCESS_TOKEN", "t"),
            ("MATRIX_SYNC_STOP_ON_AUTH_ERROR", "maybe"),
        ])
        .expect_err("invalid bool should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "MATRIX_SYNC_STOP_ON_AUTH_ERROR",
                ..
            }
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let creds = Credentials::Password {
            user: "@bot:example.org".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
        assert!(!format!("{:?}", Credentials::AccessToken("syt_x".into())).contains("syt_x"));
    }
}
