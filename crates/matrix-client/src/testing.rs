//! Scripted [`Exchange`] for driving the client without a homeserver.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use matrix_core::{TransportError, TxnIdGenerator};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    client::{MatrixClient, Session},
    transport::{Exchange, ExchangeRequest, ExchangeResponse, Method},
};

pub(crate) enum Step {
    Respond(u16, String),
    Fail(TransportError),
    /// Never answer.
    Hang,
}

impl Step {
    pub(crate) fn json(status: u16, body: serde_json::Value) -> Self {
        Self::Respond(status, body.to_string())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub access_token: Option<String>,
    pub at: Instant,
}

/// Answers requests from a fixed script. Once the script runs out it fires
/// [`ScriptedExchange::exhausted`] and leaves the request pending.
pub(crate) struct ScriptedExchange {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<Recorded>>,
    exhausted: CancellationToken,
}

impl ScriptedExchange {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            exhausted: CancellationToken::new(),
        })
    }

    pub(crate) fn exhausted(&self) -> CancellationToken {
        self.exhausted.clone()
    }

    pub(crate) fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub(crate) fn client(self: &Arc<Self>) -> MatrixClient {
        let session = Session {
            user_id: Some("@bot:example.org".to_owned()),
            device_id: Some("DEVICE".to_owned()),
            access_token: "syt_token".to_owned(),
        };
        MatrixClient::new(self.clone(), session)
            .expect("client should build")
            .with_txn_ids(Arc::new(TxnIdGenerator::with_seed(100)))
    }
}

#[async_trait]
impl Exchange for ScriptedExchange {
    async fn exchange(&self, request: ExchangeRequest) -> Result<ExchangeResponse, TransportError> {
        self.requests.lock().expect("requests lock").push(Recorded {
            method: request.method,
            path: request.path,
            body: request
                .body
                .map(|body| serde_json::from_slice(&body).expect("request body is json")),
            access_token: request.access_token,
            at: Instant::now(),
        });

        let step = self.steps.lock().expect("steps lock").pop_front();
        match step {
            Some(Step::Respond(status, body)) => Ok(ExchangeResponse {
                status,
                body: body.into_bytes(),
            }),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hang) => std::future::pending().await,
            None => {
                self.exhausted.cancel();
                std::future::pending().await
            }
        }
    }
}
