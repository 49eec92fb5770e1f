//! Query transports
//!
//! A transport submits Gremlin text and returns normalized result rows.
//! Client-library errors are mapped to `TransportError` here and never
//! cross this boundary.

pub mod embedded;
pub mod http;
pub mod websocket;

pub use embedded::EmbeddedTransport;
pub use http::HttpTransport;
pub use websocket::WebSocketTransport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ontograph_core::{GraphConfig, Result, TransportKind};
use serde_json::Value;

/// Submits query text to one backend connection
#[async_trait]
pub trait GremlinTransport: Send + Sync {
    /// Execute a query and return its rows
    async fn submit(&self, query: &str) -> Result<Vec<Value>>;

    /// Release the connection
    async fn close(&self) -> Result<()>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// GraphSON serializer negotiated on the WebSocket transport
pub const GRAPHSON_V2: &str = "application/vnd.gremlin-v2.0+json";
pub const GRAPHSON_V3: &str = "application/vnd.gremlin-v3.0+json";

/// Connection settings for a remote Gremlin endpoint
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    pub transport: TransportKind,
    pub http_url: String,
    pub websocket_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub mime_type: &'static str,
}

impl RemoteEndpoint {
    /// Create from config
    pub fn from_config(config: &GraphConfig) -> Self {
        Self {
            transport: config.transport,
            http_url: config.http_url(),
            websocket_url: config.websocket_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
            mime_type: GRAPHSON_V3,
        }
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_mime_type(mut self, mime_type: &'static str) -> Self {
        self.mime_type = mime_type;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Open a transport of the configured kind
    pub async fn connect(&self) -> Result<Arc<dyn GremlinTransport>> {
        match self.transport {
            TransportKind::Http => Ok(Arc::new(HttpTransport::from_endpoint(self)?)),
            TransportKind::WebSocket => Ok(Arc::new(WebSocketTransport::connect(self).await?)),
        }
    }
}
