//! REST transport: executes calls against a node's control plane (spec
//! §4.3, §6).
//!
//! The teacher's `http.rs` only *builds* `http::Request` values for an
//! external caller to execute. Our node session has to perform the calls
//! itself, so this module owns a `reqwest::Client` and turns each named
//! operation into a future that resolves to the declared result type or a
//! [`NodeError`]. Grounded on `examples/appujet-baja/src/common/http.rs`
//! (owns a `reqwest::Client` with a per-node timeout) and the JSON error
//! envelope shape in `examples/appujet-baja/src/common/errors.rs`.

use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use reqwest::{header::AUTHORIZATION, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::{
    error::{NodeError, RestError},
    model::{Info, LoadResult, PlayerData, PlayerUpdate},
};

/// Thin wrapper around a `reqwest::Client` scoped to one node's REST base
/// URL and authentication secret.
///
/// Owned by [`Node`][crate::node::Node]; built once at `Node::connect` and
/// dropped at `close` (spec §5 "HTTP connection pool ... owned by the node
/// and evicted/shut down in `close`").
#[derive(Debug)]
pub struct RestClient {
    client: Client,
    http_url: String,
    authorization: String,
}

impl RestClient {
    /// Build a client scoped to one node's base URL and secret, with a
    /// per-request timeout (spec §5 "per-node HTTP connection pool").
    pub fn new(http_url: String, authorization: String, request_timeout: Duration) -> Self {
        let client =
            Client::builder().timeout(request_timeout).build().expect("valid reqwest client");

        Self { client, http_url, authorization }
    }

    fn players_path(&self, session_id: &str, guild: u64) -> String {
        format!("{}/v4/sessions/{session_id}/players/{guild}", self.http_url)
    }

    /// `GET /v4/sessions/{session_id}/players/{guild}`.
    pub async fn get_player(&self, session_id: &str, guild: u64) -> Result<PlayerData, NodeError> {
        self.request(Method::GET, self.players_path(session_id, guild), None::<&()>).await
    }

    /// `PATCH /v4/sessions/{session_id}/players/{guild}?noReplace={no_replace}`.
    pub async fn update_player(
        &self,
        session_id: &str,
        guild: u64,
        update: &PlayerUpdate,
        no_replace: bool,
    ) -> Result<PlayerData, NodeError> {
        let url = format!("{}?noReplace={no_replace}", self.players_path(session_id, guild));
        self.request(Method::PATCH, url, Some(update)).await
    }

    /// `DELETE /v4/sessions/{session_id}/players/{guild}`.
    pub async fn destroy_player(&self, session_id: &str, guild: u64) -> Result<(), NodeError> {
        self.request_no_content(Method::DELETE, self.players_path(session_id, guild)).await
    }

    /// `GET /v4/loadtracks?identifier={identifier}`.
    pub async fn load_item(&self, identifier: &str) -> Result<LoadResult, NodeError> {
        let encoded = percent_encode(identifier.as_bytes(), NON_ALPHANUMERIC);
        let url = format!("{}/v4/loadtracks?identifier={encoded}", self.http_url);
        self.request(Method::GET, url, None::<&()>).await
    }

    /// `GET /v4/info`.
    pub async fn get_info(&self) -> Result<Info, NodeError> {
        let url = format!("{}/v4/info", self.http_url);
        self.request(Method::GET, url, None::<&()>).await
    }

    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<&B>,
    ) -> Result<T, NodeError> {
        let mut builder = self.client.request(method, url).header(AUTHORIZATION, &self.authorization);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response =
            builder.send().await.map_err(|err| NodeError::Transport(Box::new(err)))?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|err| NodeError::Transport(Box::new(err)))
        } else {
            Err(NodeError::Rest(parse_rest_error(status, response).await))
        }
    }

    async fn request_no_content(&self, method: Method, url: String) -> Result<(), NodeError> {
        let response = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(|err| NodeError::Transport(Box::new(err)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NodeError::Rest(parse_rest_error(status, response).await))
        }
    }
}

async fn parse_rest_error(status: StatusCode, response: reqwest::Response) -> RestError {
    #[derive(serde::Deserialize)]
    struct Body {
        message: Option<String>,
        #[serde(default)]
        #[allow(dead_code)]
        rest: Value,
    }

    let message = match response.json::<Body>().await {
        Ok(body) => body.message.unwrap_or_default(),
        Err(_) => String::new(),
    };

    RestError { status: status.as_u16(), message }
}

#[cfg(test)]
mod tests {
    use super::RestClient;
    use crate::model::{PlayerUpdate, UpdatePlayerTrack};
    use std::time::Duration;
    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn player_json() -> serde_json::Value {
        serde_json::json!({
            "guildId": "123",
            "track": null,
            "volume": 100,
            "paused": false,
            "state": { "time": 0, "position": 0, "connected": false, "ping": -1 },
            "voice": { "token": null, "endpoint": null, "sessionId": null },
            "filters": {}
        })
    }

    #[tokio::test]
    async fn get_player_sends_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/sessions/s1/players/123"))
            .and(header("Authorization", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(player_json()))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri(), "secret".into(), Duration::from_secs(5));
        let player = client.get_player("s1", 123).await.unwrap();
        assert_eq!(player.guild_id.get(), 123);
    }

    #[tokio::test]
    async fn load_item_url_encodes_the_identifier() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/loadtracks"))
            .and(query_param("identifier", "dQw4w9WgXcQ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "loadType": "empty",
                "data": {}
            })))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri(), "secret".into(), Duration::from_secs(5));
        client.load_item("dQw4w9WgXcQ").await.unwrap();
    }

    #[tokio::test]
    async fn update_player_patches_with_no_replace_query() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v4/sessions/s1/players/123"))
            .and(query_param("noReplace", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(player_json()))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri(), "secret".into(), Duration::from_secs(5));
        let mut update = PlayerUpdate::default();
        update.set_track(UpdatePlayerTrack { encoded: Some("abc".into()), identifier: None });

        client.update_player("s1", 123, &update, false).await.unwrap();
    }

    #[tokio::test]
    async fn non_2xx_responses_surface_as_rest_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v4/sessions/s1/players/404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "status": 404,
                "message": "no such player"
            })))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri(), "secret".into(), Duration::from_secs(5));
        let err = client.destroy_player("s1", 404).await.unwrap_err();

        match err {
            crate::error::NodeError::Rest(rest) => {
                assert!(rest.is_not_found());
                assert_eq!(rest.message, "no such player");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
