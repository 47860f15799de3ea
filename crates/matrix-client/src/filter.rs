use matrix_core::{ClientError, Filter};
use serde::Deserialize;

use crate::client::{MatrixClient, client_path};

#[derive(Debug, Deserialize)]
struct FilterResponse {
    filter_id: String,
}

impl MatrixClient {
    /// Upload `filter` for the session's user and return its ID for use as
    /// [`SyncConfig::filter`](crate::SyncConfig::filter).
    pub async fn register_filter(&self, filter: &Filter) -> Result<String, ClientError> {
        let Some(user_id) = self.user_id() else {
            return Err(ClientError::contract(
                "filter registration needs a session with a user id",
            ));
        };

        let path = client_path(&["user", user_id, "filter"]);
        let response: FilterResponse = self.post(&path, filter).await?;
        Ok(response.filter_id)
    }
}

#[cfg(test)]
mod tests {
    use matrix_core::{EVENT_TYPE_MESSAGE, EVENT_TYPE_REACTION};
    use serde_json::json;

    use super::*;
    use crate::{
        client::Session,
        testing::{ScriptedExchange, Step},
    };

    #[tokio::test]
    async fn uploads_filter_for_session_user() {
        let exchange = ScriptedExchange::new([Step::json(200, json!({ "filter_id": "66" }))]);
        let filter = Filter::room_timeline(
            "!room:example.org",
            &[EVENT_TYPE_MESSAGE, EVENT_TYPE_REACTION],
        );

        let filter_id = exchange
            .client()
            .register_filter(&filter)
            .await
            .expect("filter upload should succeed");

        assert_eq!(filter_id, "66");
        let requests = exchange.requests();
        assert_eq!(
            requests[0].path,
            "/_matrix/client/v3/user/%40bot%3Aexample.org/filter"
        );
        assert_eq!(
            requests[0].body,
            Some(serde_json::to_value(&filter).expect("filter serializes"))
        );
    }

    #[tokio::test]
    async fn requires_known_user() {
        let exchange = ScriptedExchange::new(Vec::<Step>::new());
        let client = MatrixClient::new(exchange.clone(), Session::from_access_token("syt_x"))
            .expect("client should build");

        let err = client
            .register_filter(&Filter::default())
            .await
            .expect_err("anonymous session must be rejected");

        assert_eq!(err.code(), "contract_violation");
        assert!(exchange.requests().is_empty());
    }
}
