//! Generic Gremlin Server variant

use std::sync::Arc;

use async_trait::async_trait;
use ontograph_core::{GraphConfig, Result};

use crate::service::GraphBackend;
use crate::transport::{GremlinTransport, RemoteEndpoint};
use crate::{BackendKind, Capabilities};

pub struct GremlinServerBackend {
    endpoint: RemoteEndpoint,
}

impl GremlinServerBackend {
    pub fn new(endpoint: RemoteEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(RemoteEndpoint::from_config(config))
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl GraphBackend for GremlinServerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::GremlinServer
    }

    fn default_capabilities(&self) -> Capabilities {
        Capabilities::GREMLIN_SERVER
    }

    async fn connect(&self) -> Result<Arc<dyn GremlinTransport>> {
        self.endpoint.connect().await
    }
}
