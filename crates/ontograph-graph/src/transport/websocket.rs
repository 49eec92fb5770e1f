//! Gremlin driver protocol over WebSocket
//!
//! Requests are binary frames prefixed with the serializer mime type.
//! Responses may arrive in several `206` partial frames before the final
//! `200`/`204`. A `407` challenge is answered with SASL PLAIN using the
//! same request ID.
//!
//! Author: hephaex@gmail.com

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use ontograph_core::{OntographError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{GremlinTransport, RemoteEndpoint};
use crate::graphson;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DriverRequest<'a> {
    request_id: &'a str,
    op: &'a str,
    processor: &'a str,
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriverResponse {
    #[serde(default)]
    request_id: Option<String>,
    status: DriverStatus,
    #[serde(default)]
    result: Option<DriverResult>,
}

#[derive(Debug, Deserialize)]
struct DriverStatus {
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DriverResult {
    #[serde(default)]
    data: Value,
}

/// Prefix a payload with its mime type as the driver protocol requires
pub fn encode_frame(mime_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + mime_type.len() + payload.len());
    frame.push(mime_type.len() as u8);
    frame.extend_from_slice(mime_type.as_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// SASL PLAIN token: `\0username\0password`, base64 encoded
pub fn sasl_plain(username: &str, password: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("\0{username}\0{password}"))
}

/// WebSocket client for Gremlin Server and Cosmos DB
pub struct WebSocketTransport {
    socket: Mutex<Option<Socket>>,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
    mime_type: &'static str,
}

impl WebSocketTransport {
    /// Open a connection to the endpoint
    pub async fn connect(endpoint: &RemoteEndpoint) -> Result<Self> {
        let url = endpoint.websocket_url.as_str();
        let (socket, _response) = tokio::time::timeout(endpoint.timeout, connect_async(url))
            .await
            .map_err(|_| OntographError::transport(format!("Connection to {url} timed out"), ""))?
            .map_err(|e| OntographError::transport(format!("WebSocket connection failed: {e}"), ""))?;

        debug!(url, "WebSocket connected");

        Ok(Self {
            socket: Mutex::new(Some(socket)),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            timeout: endpoint.timeout,
            mime_type: endpoint.mime_type,
        })
    }

    async fn send(&self, socket: &mut Socket, request: &DriverRequest<'_>, query: &str) -> Result<()> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| OntographError::transport(format!("Failed to encode request: {e}"), query))?;
        socket
            .send(Message::binary(encode_frame(self.mime_type, &payload)))
            .await
            .map_err(|e| OntographError::transport(format!("Failed to send request: {e}"), query))
    }

    async fn authenticate(&self, socket: &mut Socket, request_id: &str, query: &str) -> Result<()> {
        let (Some(username), Some(password)) = (&self.username, &self.password) else {
            return Err(OntographError::transport(
                "Server requires authentication but no credentials are configured",
                query,
            ));
        };

        let request = DriverRequest {
            request_id,
            op: "authentication",
            processor: "",
            args: json!({
                "sasl": sasl_plain(username, password),
                "saslMechanism": "PLAIN",
            }),
        };
        self.send(socket, &request, query).await
    }

    async fn exchange(&self, socket: &mut Socket, query: &str) -> Result<Vec<Value>> {
        let request_id = Uuid::new_v4().to_string();
        let request = DriverRequest {
            request_id: &request_id,
            op: "eval",
            processor: "",
            args: json!({
                "gremlin": query,
                "bindings": {},
                "language": "gremlin-groovy",
            }),
        };
        self.send(socket, &request, query).await?;

        let mut rows = Vec::new();
        let mut authenticated = false;

        loop {
            let message = socket
                .next()
                .await
                .ok_or_else(|| OntographError::transport("Connection closed", query))?
                .map_err(|e| OntographError::transport(format!("Failed to read response: {e}"), query))?;

            let response: DriverResponse = match message {
                Message::Text(text) => serde_json::from_str(&text),
                Message::Binary(data) => serde_json::from_slice(&data),
                Message::Ping(payload) => {
                    socket
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| OntographError::transport(format!("Failed to answer ping: {e}"), query))?;
                    continue;
                }
                Message::Close(frame) => {
                    return Err(OntographError::transport(
                        format!("Connection closed by server: {frame:?}"),
                        query,
                    ))
                }
                _ => continue,
            }
            .map_err(|e| OntographError::transport(format!("Failed to parse response: {e}"), query))?;

            if response
                .request_id
                .as_deref()
                .is_some_and(|id| id != request_id)
            {
                warn!(request_id = ?response.request_id, "Ignoring response for another request");
                continue;
            }

            match response.status.code {
                200 | 206 => {
                    if let Some(result) = response.result {
                        rows.extend(graphson::into_rows(result.data));
                    }
                    if response.status.code == 200 {
                        return Ok(rows);
                    }
                }
                204 => return Ok(rows),
                407 if !authenticated => {
                    debug!("Authentication challenge received");
                    self.authenticate(socket, &request_id, query).await?;
                    authenticated = true;
                }
                code => {
                    return Err(OntographError::transport(
                        format!("Gremlin error {code}: {}", response.status.message),
                        query,
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl GremlinTransport for WebSocketTransport {
    async fn submit(&self, query: &str) -> Result<Vec<Value>> {
        let mut guard = self.socket.lock().await;
        let socket = guard.as_mut().ok_or(OntographError::NotConnected)?;

        tokio::time::timeout(self.timeout, self.exchange(socket, query))
            .await
            .map_err(|_| {
                OntographError::transport(format!("Request timed out after {:?}", self.timeout), query)
            })?
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.socket.lock().await;
        if let Some(mut socket) = guard.take() {
            socket
                .close(None)
                .await
                .map_err(|e| OntographError::transport(format!("Failed to close connection: {e}"), ""))?;
            debug!("WebSocket closed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::GRAPHSON_V2;
    use ontograph_core::TransportKind;
    use tokio::net::TcpListener;

    fn decode(message: Message) -> (String, Value) {
        let Message::Binary(data) = message else {
            panic!("expected binary frame");
        };
        let len = data[0] as usize;
        let mime = String::from_utf8(data[1..1 + len].to_vec()).unwrap();
        let body = serde_json::from_slice(&data[1 + len..]).unwrap();
        (mime, body)
    }

    fn endpoint(url: String) -> RemoteEndpoint {
        RemoteEndpoint {
            transport: TransportKind::WebSocket,
            http_url: String::new(),
            websocket_url: url,
            username: Some("/dbs/db/colls/graph".to_string()),
            password: Some("secret".to_string()),
            timeout: Duration::from_secs(5),
            mime_type: GRAPHSON_V2,
        }
    }

    #[test]
    fn test_frame_and_sasl_encoding() {
        let frame = encode_frame("ab", b"{}");
        assert_eq!(frame, vec![2, b'a', b'b', b'{', b'}']);
        assert_eq!(sasl_plain("user", "pass"), "AHVzZXIAcGFzcw==");
    }

    #[tokio::test]
    async fn test_auth_challenge_and_partial_results() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let (mime, eval) = decode(ws.next().await.unwrap().unwrap());
            assert_eq!(mime, GRAPHSON_V2);
            assert_eq!(eval["op"], "eval");
            assert_eq!(eval["args"]["gremlin"], "g.V().values('key')");
            let request_id = eval["requestId"].as_str().unwrap().to_string();

            let challenge = json!({"requestId": request_id, "status": {"code": 407, "message": ""}});
            ws.send(Message::text(challenge.to_string())).await.unwrap();

            let (_, auth) = decode(ws.next().await.unwrap().unwrap());
            assert_eq!(auth["op"], "authentication");
            assert_eq!(auth["requestId"], request_id.as_str());
            assert_eq!(auth["args"]["saslMechanism"], "PLAIN");
            assert_eq!(auth["args"]["sasl"], sasl_plain("/dbs/db/colls/graph", "secret"));

            let partial = json!({
                "requestId": request_id,
                "status": {"code": 206, "message": ""},
                "result": {"data": ["A_1"]}
            });
            ws.send(Message::text(partial.to_string())).await.unwrap();
            let last = json!({
                "requestId": request_id,
                "status": {"code": 200, "message": ""},
                "result": {"data": ["B_1"]}
            });
            ws.send(Message::text(last.to_string())).await.unwrap();
        });

        let transport = WebSocketTransport::connect(&endpoint(format!("ws://{addr}/gremlin")))
            .await
            .unwrap();
        let rows = transport.submit("g.V().values('key')").await.unwrap();

        assert_eq!(rows, vec![json!("A_1"), json!("B_1")]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (_, eval) = decode(ws.next().await.unwrap().unwrap());
            let reply = json!({
                "requestId": eval["requestId"],
                "status": {"code": 429, "message": "Request rate is large"}
            });
            ws.send(Message::text(reply.to_string())).await.unwrap();
            let _ = ws.next().await;
        });

        let transport = WebSocketTransport::connect(&endpoint(format!("ws://{addr}/gremlin")))
            .await
            .unwrap();
        let err = transport.submit("g.V()").await.unwrap_err();
        assert!(err.to_string().contains("Request rate is large"));

        transport.close().await.unwrap();
        assert!(matches!(
            transport.submit("g.V()").await.unwrap_err(),
            OntographError::NotConnected
        ));
    }
}
