//! Azure Cosmos DB (Gremlin API) variant
//!
//! Always speaks the WebSocket driver protocol with GraphSON v2 and SASL
//! credentials of the form `/dbs/<database>/colls/<collection>`. Drops are
//! capped server-side, so deletes run as repeated `limit(1000).drop()`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ontograph_core::{GraphConfig, OntographError, Result, TransportKind};

use crate::service::GraphBackend;
use crate::transport::{GremlinTransport, RemoteEndpoint, GRAPHSON_V2};
use crate::{BackendKind, Capabilities};

/// Maximum elements Cosmos DB drops per request
pub const DROP_BATCH_LIMIT: usize = 1000;

pub struct CosmosDbBackend {
    endpoint: RemoteEndpoint,
}

impl CosmosDbBackend {
    pub fn new(endpoint: RemoteEndpoint) -> Self {
        Self { endpoint }
    }

    /// Create from config. Database, collection and key are required.
    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        let database = config
            .database
            .as_deref()
            .ok_or_else(|| OntographError::ConfigError("Cosmos DB requires GRAPH_DATABASE".to_string()))?;
        let collection = config
            .collection
            .as_deref()
            .ok_or_else(|| OntographError::ConfigError("Cosmos DB requires GRAPH_COLLECTION".to_string()))?;
        if config.password.is_none() {
            return Err(OntographError::ConfigError(
                "Cosmos DB requires GRAPH_PASSWORD (the account key)".to_string(),
            ));
        }

        let endpoint = RemoteEndpoint::from_config(config)
            .with_transport(TransportKind::WebSocket)
            .with_mime_type(GRAPHSON_V2)
            .with_username(format!("/dbs/{database}/colls/{collection}"));

        Ok(Self::new(endpoint))
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl GraphBackend for CosmosDbBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::CosmosDb
    }

    fn default_capabilities(&self) -> Capabilities {
        Capabilities::COSMOSDB
    }

    async fn connect(&self) -> Result<Arc<dyn GremlinTransport>> {
        self.endpoint.connect().await
    }

    fn delete_batch_limit(&self) -> Option<usize> {
        Some(DROP_BATCH_LIMIT)
    }

    async fn serialize_graph(&self, _transport: &dyn GremlinTransport, path: &Path) -> Result<()> {
        Err(OntographError::QueryError(format!(
            "Cosmos DB does not support graph export (requested {})",
            path.display()
        )))
    }
}
