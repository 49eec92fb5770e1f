//! Ontograph Loader - Property graph loading stage
//!
//! Replaces one ontology's subgraph in the configured graph database with
//! the modelled artifact: vertices are deleted and reinserted, edge
//! endpoints are resolved by key against the freshly inserted vertices,
//! then edges are deleted and reinserted.
//!
//! Author: hephaex@gmail.com

pub mod runner;

pub use runner::{PipelineRunner, RunSummary};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ontograph_core::{
    Edge, ElementId, MessagePublisher, MessagingConfig, ObjectStorage, OntographError,
    OntologyMessage, PipelineStage, Result, SimpleOntologyPropertyGraph, StorageConfig, Vertex,
    VertexLabel,
};
use ontograph_graph::{Filter, GraphDatabaseService};
use serde::Serialize;
use tracing::{debug, error, info, warn};

// ============================================================================
// Load Report
// ============================================================================

/// Outcome of one successful load
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub ontology_id: i32,
    pub webhook_event_id: i64,
    /// Vertices inserted
    pub vertices: usize,
    /// Edges inserted
    pub edges: usize,
    pub elapsed: Duration,
}

// ============================================================================
// Graph Loader
// ============================================================================

/// Tracks how far a load got before failing
#[derive(Debug, Default)]
struct Progress {
    vertices_replaced: bool,
    vertices: usize,
    edges: usize,
}

/// Loads one modelled ontology per message
pub struct OntologyGraphLoader {
    storage: Arc<dyn ObjectStorage>,
    graph: Arc<dyn GraphDatabaseService>,
    publisher: Arc<dyn MessagePublisher>,
    storage_config: StorageConfig,
    messaging_config: MessagingConfig,
}

impl OntologyGraphLoader {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        graph: Arc<dyn GraphDatabaseService>,
        publisher: Arc<dyn MessagePublisher>,
        storage_config: StorageConfig,
        messaging_config: MessagingConfig,
    ) -> Self {
        Self {
            storage,
            graph,
            publisher,
            storage_config,
            messaging_config,
        }
    }

    /// Load the artifact named by `message`.
    ///
    /// Any failure is returned as a `loader-graph` pipeline error. Resources
    /// are released on every path.
    pub async fn handle(&self, message: &OntologyMessage) -> Result<LoadReport> {
        let started = Instant::now();
        info!(
            ontology_id = message.ontology_id,
            webhook_event_id = message.webhook_event_id,
            backend = %self.graph.kind(),
            "Graph loading started"
        );

        let scratch = self.scratch_path(message);
        let mut progress = Progress::default();
        let result = self.run(message, &scratch, &mut progress).await;
        self.cleanup(&scratch).await;

        match result {
            Ok(()) => {
                let report = LoadReport {
                    ontology_id: message.ontology_id,
                    webhook_event_id: message.webhook_event_id,
                    vertices: progress.vertices,
                    edges: progress.edges,
                    elapsed: started.elapsed(),
                };
                info!(
                    ontology_id = report.ontology_id,
                    vertices = report.vertices,
                    edges = report.edges,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Graph loading finished"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    ontology_id = message.ontology_id,
                    webhook_event_id = message.webhook_event_id,
                    vertices_replaced = progress.vertices_replaced,
                    error = %e,
                    "Graph loading failed"
                );
                Err(OntographError::pipeline(PipelineStage::LoaderGraph, e))
            }
        }
    }

    async fn run(&self, message: &OntologyMessage, scratch: &Path, progress: &mut Progress) -> Result<()> {
        let filename = message.json_processed_filename();

        // 1. Setup
        let loaded_container = &self.storage_config.loaded_container;
        if !self.storage.container_exists(loaded_container).await? {
            self.storage.create_container(loaded_container).await?;
        }
        self.graph.open_graph().await?;
        self.graph.create_schema().await?;

        // 2. Download
        self.storage
            .download_object(&self.storage_config.modelled_container, &filename, scratch)
            .await?;
        let bytes = tokio::fs::read(scratch).await.map_err(|e| {
            OntographError::StorageError(format!("Failed to read {}: {e}", scratch.display()))
        })?;
        let mut graph = SimpleOntologyPropertyGraph::from_slice(&bytes)?;
        if graph.id != message.ontology_id {
            return Err(OntographError::InvalidGraph(format!(
                "Artifact {filename} holds ontology {}, message names {}",
                graph.id, message.ontology_id
            )));
        }
        graph.validate()?;
        debug!(
            vertices = graph.vertices.len(),
            edges = graph.edges.len(),
            "Downloaded modelled graph"
        );

        // 3. Replace vertices
        progress.vertices = self.replace_vertices(&graph).await?;
        progress.vertices_replaced = true;

        // 4. Replace edges
        progress.edges = self.replace_edges(&mut graph).await?;

        // 5. Publish
        self.storage
            .upload_object(loaded_container, &filename, scratch)
            .await?;
        self.publisher
            .publish(&self.messaging_config.loaded_channel, message)
            .await?;

        Ok(())
    }

    async fn replace_vertices(&self, graph: &SimpleOntologyPropertyGraph) -> Result<usize> {
        let scope = Filter::ontology(graph.id);
        self.graph.delete_vertices(&scope).await?;
        self.graph.commit().await?;

        let mut added = 0;
        for label in VertexLabel::all() {
            let batch: Vec<Vertex> = graph.vertices_with_label(label).into_iter().cloned().collect();
            if batch.is_empty() {
                continue;
            }
            added += self.graph.add_vertices(label, &batch).await?;
        }
        self.graph.commit().await?;

        info!(ontology_id = graph.id, added, "Vertices replaced");
        Ok(added)
    }

    async fn replace_edges(&self, graph: &mut SimpleOntologyPropertyGraph) -> Result<usize> {
        let scope = Filter::ontology(graph.id);
        self.graph.delete_edges(&scope).await?;
        self.graph.commit().await?;

        let ids = self.graph.resolve_vertex_ids(graph.id).await?;
        resolve_endpoints(&mut graph.edges, &ids)?;

        let added = if graph.edges.is_empty() {
            0
        } else {
            self.graph.add_edges(&graph.edges).await?
        };
        self.graph.commit().await?;

        info!(ontology_id = graph.id, added, "Edges replaced");
        Ok(added)
    }

    fn scratch_path(&self, message: &OntologyMessage) -> PathBuf {
        self.storage_config
            .working_dir
            .join("loader")
            .join(message.json_processed_filename())
    }

    async fn cleanup(&self, scratch: &Path) {
        if let Err(e) = self.graph.cleanup().await {
            warn!(error = %e, "Graph cleanup failed");
        }
        if let Err(e) = self.storage.cleanup().await {
            warn!(error = %e, "Object storage cleanup failed");
        }
        if let Err(e) = tokio::fs::remove_file(scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %scratch.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }
}

/// Replace every edge endpoint ID with the backend ID of its keyed vertex
pub fn resolve_endpoints(edges: &mut [Edge], ids: &HashMap<String, ElementId>) -> Result<()> {
    for edge in edges.iter_mut() {
        edge.clear_resolved_ids();
        let lookup = |key: &str| {
            ids.get(key).cloned().ok_or_else(|| {
                OntographError::InvalidGraph(format!(
                    "Edge {} {} -> {}: vertex '{key}' not found in graph",
                    edge.label, edge.source_vertex_key, edge.target_vertex_key
                ))
            })
        };
        let source = lookup(&edge.source_vertex_key)?;
        let target = lookup(&edge.target_vertex_key)?;
        edge.source_vertex_id = Some(source);
        edge.target_vertex_id = Some(target);
    }
    Ok(())
}
