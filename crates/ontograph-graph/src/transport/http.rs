//! JSON-over-HTTP transport for the Gremlin Server REST endpoint

use async_trait::async_trait;
use ontograph_core::{OntographError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{GremlinTransport, RemoteEndpoint};
use crate::graphson;

#[derive(Debug, Serialize)]
struct GremlinRequest<'a> {
    gremlin: &'a str,
}

#[derive(Debug, Deserialize)]
struct GremlinResponse {
    #[serde(default)]
    status: Option<ResponseStatus>,
    #[serde(default)]
    result: Option<ResponseResult>,
}

#[derive(Debug, Deserialize)]
struct ResponseStatus {
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponseResult {
    #[serde(default)]
    data: Value,
}

/// Gremlin Server HTTP client
pub struct HttpTransport {
    client: Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            username: None,
            password: None,
        }
    }

    /// Create from a remote endpoint
    pub fn from_endpoint(endpoint: &RemoteEndpoint) -> Result<Self> {
        let client = Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| OntographError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: endpoint.http_url.clone(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
        })
    }

    /// Set basic-auth credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

#[async_trait]
impl GremlinTransport for HttpTransport {
    async fn submit(&self, query: &str) -> Result<Vec<Value>> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&GremlinRequest { gremlin: query });

        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| OntographError::transport(format!("Request failed: {e}"), query))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(OntographError::transport(
                format!("Gremlin Server returned {status}: {error_text}"),
                query,
            ));
        }

        let body: GremlinResponse = response
            .json()
            .await
            .map_err(|e| OntographError::transport(format!("Failed to parse response: {e}"), query))?;

        if let Some(status) = &body.status {
            if !matches!(status.code, 200 | 204 | 206) {
                return Err(OntographError::transport(
                    format!("Gremlin error {}: {}", status.code, status.message),
                    query,
                ));
            }
        }

        let rows = body
            .result
            .map(|r| graphson::into_rows(r.data))
            .unwrap_or_default();
        debug!(rows = rows.len(), "HTTP query complete");
        Ok(rows)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_submit_posts_gremlin_and_normalizes() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_json(json!({"gremlin": "g.V().count()"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "requestId": "a",
                "status": {"code": 200, "message": ""},
                "result": {"data": {"@type": "g:List", "@value": [{"@type": "g:Int64", "@value": 4}]}, "meta": {}}
            })))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(mock_server.uri());
        let rows = transport.submit("g.V().count()").await.unwrap();

        assert_eq!(rows, vec![json!(4)]);
    }

    #[tokio::test]
    async fn test_submit_sends_basic_auth() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(header("Authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": {"code": 204, "message": ""},
                "result": {"data": null}
            })))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(mock_server.uri()).with_credentials("user", "pass");
        assert!(transport.submit("g.V().drop()").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_carries_query() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(mock_server.uri());
        let err = transport.submit("g.V().bad()").await.unwrap_err();

        match err {
            OntographError::TransportError { message, query } => {
                assert!(message.contains("500"));
                assert_eq!(query, "g.V().bad()");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_status_code_in_body_is_checked() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": {"code": 597, "message": "No such property"},
                "result": {"data": null}
            })))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(mock_server.uri());
        let err = transport.submit("g.V().foo()").await.unwrap_err();
        assert!(err.to_string().contains("No such property"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let transport = HttpTransport::new("http://127.0.0.1:1");
        let err = transport.submit("g.V()").await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
