//! Embedded TinkerGraph variant
//!
//! The graph lives in process memory. When a graph location is configured
//! the first connection restores it from that snapshot file, and
//! `serialize_graph` writes JSON snapshots any caller can restore from.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ontograph_core::{keys, OntographError, Result};
use tracing::{debug, info, warn};

use crate::factory::SharedGraph;
use crate::service::GraphBackend;
use crate::tinkergraph::GraphSnapshot;
use crate::transport::{EmbeddedTransport, GremlinTransport};
use crate::{BackendKind, Capabilities, TinkerGraph};

/// Vertex properties indexed by the embedded schema
pub const INDEXED_KEYS: [&str; 4] = [keys::IRI, keys::ONTOLOGY_ID, keys::KEY, keys::VERTEX_ID];

pub struct TinkerGraphBackend {
    graph: SharedGraph,
    location: Option<PathBuf>,
}

impl TinkerGraphBackend {
    pub fn new(graph: SharedGraph) -> Self {
        Self { graph, location: None }
    }

    /// Restore from this snapshot file on first connection
    pub fn with_location(mut self, location: Option<PathBuf>) -> Self {
        self.location = location;
        self
    }

    async fn restore(&self, location: &Path) -> Result<()> {
        let mut graph = self.graph.lock().await;
        if graph.location().is_some() {
            return Ok(());
        }
        if graph.vertex_count() > 0 {
            warn!(path = %location.display(), "Embedded graph already populated, not restoring snapshot");
            graph.set_location(location);
            return Ok(());
        }

        match tokio::fs::read(location).await {
            Ok(bytes) => {
                let snapshot: GraphSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    OntographError::InvalidGraph(format!("Unreadable graph snapshot {}: {e}", location.display()))
                })?;
                let mut restored = TinkerGraph::from_snapshot(snapshot)?;
                restored.set_location(location);
                info!(
                    path = %location.display(),
                    vertices = restored.vertex_count(),
                    edges = restored.edge_count(),
                    "Embedded graph restored"
                );
                *graph = restored;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %location.display(), "No graph snapshot yet");
                graph.set_location(location);
            }
            Err(e) => {
                return Err(OntographError::StorageError(format!(
                    "Failed to read graph snapshot {}: {e}",
                    location.display()
                )))
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GraphBackend for TinkerGraphBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::TinkerGraph
    }

    fn default_capabilities(&self) -> Capabilities {
        Capabilities::TINKERGRAPH
    }

    async fn connect(&self) -> Result<Arc<dyn GremlinTransport>> {
        if let Some(location) = &self.location {
            self.restore(location).await?;
        }
        Ok(Arc::new(EmbeddedTransport::new(self.graph.clone())))
    }

    fn requires_iterate(&self) -> bool {
        true
    }

    async fn create_schema(&self, _transport: &dyn GremlinTransport, _caps: &Capabilities) -> Result<()> {
        let mut graph = self.graph.lock().await;
        if !graph.indexed_keys().is_empty() {
            info!("TinkerGraph indexes already exist");
            return Ok(());
        }
        for key in INDEXED_KEYS {
            graph.create_index(key);
        }
        info!(indexes = INDEXED_KEYS.len(), "TinkerGraph indexes created");
        Ok(())
    }

    async fn serialize_graph(&self, _transport: &dyn GremlinTransport, path: &Path) -> Result<()> {
        let bytes = {
            let graph = self.graph.lock().await;
            serde_json::to_vec(&graph.snapshot())
                .map_err(|e| OntographError::InvalidGraph(format!("Failed to serialize graph: {e}")))?
        };

        let storage_error =
            |e: std::io::Error| OntographError::StorageError(format!("Failed to write {}: {e}", path.display()));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(storage_error)?;
        }

        // Readers only ever see a complete snapshot
        let mut partial = path.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);
        tokio::fs::write(&partial, &bytes).await.map_err(storage_error)?;
        tokio::fs::rename(&partial, path).await.map_err(storage_error)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Graph snapshot written");
        Ok(())
    }
}
