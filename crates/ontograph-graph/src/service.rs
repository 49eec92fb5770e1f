//! Shared Gremlin service
//!
//! Every backend variant runs the same service logic. A variant only
//! supplies its capability profile, how a connection is acquired and the
//! recipe overrides it needs (schema declaration, capped drops).
//!
//! Author: hephaex@gmail.com

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ontograph_core::{
    keys, Edge, ElementId, GraphConfig, OntographError, PropertyMap, Result, Vertex, VertexLabel,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::gremlin::{self, Direction, Endpoint, Filter};
use crate::transport::GremlinTransport;
use crate::{BackendKind, Capabilities, GraphDatabaseService, RateLimiter};

/// Per-variant hooks of the shared service
#[async_trait]
pub trait GraphBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Profile before configuration overrides
    fn default_capabilities(&self) -> Capabilities;

    /// Acquire a connection to the backend
    async fn connect(&self) -> Result<Arc<dyn GremlinTransport>>;

    /// Maximum elements dropped per submission, if the backend caps it
    fn delete_batch_limit(&self) -> Option<usize> {
        None
    }

    /// Whether write traversals need an explicit `.iterate()`
    fn requires_iterate(&self) -> bool {
        false
    }

    /// Declare schema once. Only called when the profile supports schema.
    async fn create_schema(&self, _transport: &dyn GremlinTransport, _caps: &Capabilities) -> Result<()> {
        Ok(())
    }

    /// Write the graph to a file, by default through the server's `io()` step
    async fn serialize_graph(&self, transport: &dyn GremlinTransport, path: &Path) -> Result<()> {
        transport.submit(&gremlin::write_graph(&path.to_string_lossy())).await?;
        Ok(())
    }
}

/// Graph database service over one backend variant
pub struct GremlinGraphService<B: GraphBackend> {
    backend: B,
    capabilities: Capabilities,
    rate_limiter: RateLimiter,
    max_delete_rounds: usize,
    transport: RwLock<Option<Arc<dyn GremlinTransport>>>,
}

impl<B: GraphBackend> GremlinGraphService<B> {
    /// Create a service. Capability overrides are applied here and then frozen.
    pub fn new(backend: B, config: &GraphConfig) -> Self {
        let capabilities = backend
            .default_capabilities()
            .with_overrides(&config.capabilities);

        Self {
            backend,
            capabilities,
            rate_limiter: RateLimiter::from_config(&config.rate_limiter),
            max_delete_rounds: config.max_delete_rounds.max(1),
            transport: RwLock::new(None),
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn transport(&self) -> Result<Arc<dyn GremlinTransport>> {
        self.transport
            .read()
            .await
            .clone()
            .ok_or(OntographError::NotConnected)
    }

    async fn submit(&self, query: &str) -> Result<Vec<Value>> {
        let transport = self.transport().await?;
        debug!(backend = %self.backend.kind(), transport = transport.name(), query, "Submitting query");
        transport.submit(query).await
    }

    async fn count(&self, query: &str) -> Result<u64> {
        let rows = self.submit(query).await?;
        rows.first()
            .and_then(Value::as_u64)
            .ok_or_else(|| OntographError::transport(format!("Expected a count, got {rows:?}"), query))
    }

    fn iterate(&self) -> bool {
        self.backend.requires_iterate()
    }

    /// Drop until nothing matches. Uncapped backends finish in one submission.
    async fn drop_matching(&self, count_query: &str, drop_query: &str) -> Result<()> {
        if self.backend.delete_batch_limit().is_none() {
            self.submit(drop_query).await?;
            return Ok(());
        }

        for round in 0..self.max_delete_rounds {
            let remaining = self.count(count_query).await?;
            if remaining == 0 {
                debug!(rounds = round, "Capped delete complete");
                return Ok(());
            }
            debug!(round, remaining, "Submitting capped drop");
            self.submit(drop_query).await?;
        }

        Err(OntographError::transport(
            format!(
                "Capped delete did not converge after {} rounds",
                self.max_delete_rounds
            ),
            drop_query,
        ))
    }

    async fn submit_all(&self, queries: Vec<String>) -> Result<usize> {
        self.rate_limiter
            .run(queries, |query| async move { self.submit(&query).await.map(|_| ()) })
            .await
    }

    fn single(rows: Vec<Value>) -> Option<Value> {
        rows.into_iter().next()
    }
}

fn scalar_key(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Array(items) => items.first().and_then(Value::as_str),
        _ => None,
    }
}

#[async_trait]
impl<B: GraphBackend> GraphDatabaseService for GremlinGraphService<B> {
    fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn open_graph(&self) -> Result<()> {
        let mut guard = self.transport.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let transport = self.backend.connect().await?;
        info!(backend = %self.backend.kind(), transport = transport.name(), "Graph opened");
        *guard = Some(transport);
        Ok(())
    }

    async fn close_graph(&self) -> Result<()> {
        let transport = self.transport.write().await.take();
        if let Some(transport) = transport {
            transport.close().await?;
            debug!(backend = %self.backend.kind(), "Graph closed");
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        if let Err(e) = self.close_graph().await {
            warn!(backend = %self.backend.kind(), error = %e, "Failed to close graph during cleanup");
        }
        Ok(())
    }

    async fn create_schema(&self) -> Result<()> {
        if !self.capabilities.supports_schema {
            debug!(backend = %self.backend.kind(), "Backend is schema-less, skipping schema");
            return Ok(());
        }
        let transport = self.transport().await?;
        self.backend
            .create_schema(transport.as_ref(), &self.capabilities)
            .await
    }

    async fn delete_graph(&self) -> Result<()> {
        self.delete_vertices(&Filter::new()).await
    }

    async fn delete_sub_graph(&self, key: &str, value: &Value) -> Result<()> {
        let filter = Filter::new().with_property(key, value.clone());
        self.delete_edges(&filter).await?;
        self.delete_vertices(&filter).await
    }

    async fn serialize_graph(&self, path: &Path) -> Result<()> {
        let transport = self.transport().await?;
        self.backend.serialize_graph(transport.as_ref(), path).await?;
        info!(backend = %self.backend.kind(), path = %path.display(), "Graph serialized");
        Ok(())
    }

    async fn get_vertices(&self, filter: &Filter) -> Result<Vec<Value>> {
        self.submit(&gremlin::get_vertices(filter, &self.capabilities)).await
    }

    async fn get_vertex(&self, id: &ElementId) -> Result<Option<Value>> {
        let rows = self.submit(&gremlin::get_vertex(id, &self.capabilities)).await?;
        Ok(Self::single(rows))
    }

    async fn get_vertex_edges(&self, id: &ElementId, direction: Direction) -> Result<Vec<Value>> {
        self.submit(&gremlin::get_vertex_edges(id, direction, &self.capabilities))
            .await
    }

    async fn get_edges(&self, filter: &Filter) -> Result<Vec<Value>> {
        self.submit(&gremlin::get_edges(filter, &self.capabilities)).await
    }

    async fn get_edge(&self, id: &ElementId) -> Result<Option<Value>> {
        let rows = self.submit(&gremlin::get_edge(id, &self.capabilities)).await?;
        Ok(Self::single(rows))
    }

    async fn get_ontology_vertex(&self, ontology_id: i32, iri: &str) -> Result<Option<Value>> {
        let query = gremlin::get_ontology_vertex_by_iri(ontology_id, iri, &self.capabilities);
        let rows = self.submit(&query).await?;
        Ok(Self::single(rows))
    }

    async fn count_vertices(&self, filter: &Filter) -> Result<u64> {
        self.count(&gremlin::count_vertices(filter)).await
    }

    async fn count_edges(&self, filter: &Filter) -> Result<u64> {
        self.count(&gremlin::count_edges(filter)).await
    }

    async fn resolve_vertex_ids(&self, ontology_id: i32) -> Result<HashMap<String, ElementId>> {
        let query = gremlin::get_vertex_keys(ontology_id, &self.capabilities);
        let rows = self.submit(&query).await?;

        let mut ids = HashMap::with_capacity(rows.len());
        for row in &rows {
            let id = row.get("id").and_then(ElementId::from_json);
            let key = row.get(keys::KEY).and_then(scalar_key);
            match (id, key) {
                (Some(id), Some(key)) => {
                    ids.insert(key.to_string(), id);
                }
                _ => warn!(ontology_id, row = %row, "Skipping vertex without id or key"),
            }
        }

        debug!(ontology_id, resolved = ids.len(), "Resolved vertex ids");
        Ok(ids)
    }

    async fn add_vertex(&self, label: &str, id: Option<&ElementId>, properties: &PropertyMap) -> Result<()> {
        let query = gremlin::add_vertex(label, id, properties, &self.capabilities, self.iterate());
        self.submit(&query).await?;
        Ok(())
    }

    async fn add_vertices(&self, label: VertexLabel, vertices: &[Vertex]) -> Result<usize> {
        let queries: Vec<String> = vertices
            .iter()
            .map(|vertex| {
                gremlin::add_vertex(
                    label.backend_label(),
                    Some(&ElementId::Numeric(vertex.vertex_id)),
                    &vertex.backend_properties(),
                    &self.capabilities,
                    self.iterate(),
                )
            })
            .collect();

        let added = self.submit_all(queries).await?;
        info!(backend = %self.backend.kind(), label = %label, added, "Vertices added");
        Ok(added)
    }

    async fn add_edge(&self, edge: &Edge) -> Result<()> {
        let query = edge_query(edge, &self.capabilities, self.iterate());
        self.submit(&query).await?;
        Ok(())
    }

    async fn add_edges(&self, edges: &[Edge]) -> Result<usize> {
        let queries: Vec<String> = edges
            .iter()
            .map(|edge| edge_query(edge, &self.capabilities, self.iterate()))
            .collect();

        let added = self.submit_all(queries).await?;
        info!(backend = %self.backend.kind(), added, "Edges added");
        Ok(added)
    }

    async fn update_vertex(&self, id: &ElementId, key: &str, value: &Value) -> Result<()> {
        self.submit(&gremlin::update_vertex(id, key, value, &self.capabilities))
            .await?;
        Ok(())
    }

    async fn update_vertex_properties(&self, id: &ElementId, properties: &PropertyMap) -> Result<()> {
        self.submit(&gremlin::update_vertex_properties(id, properties, &self.capabilities))
            .await?;
        Ok(())
    }

    async fn update_edge(&self, id: &ElementId, key: &str, value: &Value) -> Result<()> {
        self.submit(&gremlin::update_edge(id, key, value, &self.capabilities))
            .await?;
        Ok(())
    }

    async fn update_edge_properties(&self, id: &ElementId, properties: &PropertyMap) -> Result<()> {
        self.submit(&gremlin::update_edge_properties(id, properties, &self.capabilities))
            .await?;
        Ok(())
    }

    async fn delete_vertex(&self, id: &ElementId) -> Result<()> {
        self.submit(&gremlin::delete_vertex(id, &self.capabilities, self.iterate()))
            .await?;
        Ok(())
    }

    async fn delete_edge(&self, id: &ElementId) -> Result<()> {
        self.submit(&gremlin::delete_edge(id, &self.capabilities, self.iterate()))
            .await?;
        Ok(())
    }

    async fn delete_vertices(&self, filter: &Filter) -> Result<()> {
        let limit = self.backend.delete_batch_limit();
        self.drop_matching(
            &gremlin::count_vertices(filter),
            &gremlin::delete_vertices(filter, limit, self.iterate()),
        )
        .await
    }

    async fn delete_edges(&self, filter: &Filter) -> Result<()> {
        let limit = self.backend.delete_batch_limit();
        self.drop_matching(
            &gremlin::count_edges(filter),
            &gremlin::delete_edges(filter, limit, self.iterate()),
        )
        .await
    }

    async fn commit(&self) -> Result<()> {
        if self.capabilities.supports_transactions {
            self.submit(&gremlin::commit()).await?;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        if self.capabilities.supports_transactions {
            self.submit(&gremlin::rollback()).await?;
        }
        Ok(())
    }

    async fn query(&self, raw: &str) -> Result<Vec<Value>> {
        self.submit(raw).await
    }
}

fn edge_query(edge: &Edge, caps: &Capabilities, iterate: bool) -> String {
    let source = Endpoint::new(edge.source_vertex_id.as_ref(), &edge.source_vertex_key);
    let target = Endpoint::new(edge.target_vertex_id.as_ref(), &edge.target_vertex_key);
    gremlin::add_edge(
        &source,
        &target,
        edge.label.backend_label(),
        &edge.backend_properties(),
        caps,
        iterate,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::TinkerGraphBackend;
    use crate::factory::SharedGraph;
    use crate::TinkerGraph;
    use ontograph_core::EdgeLabel;
    use serde_json::json;
    use tokio::sync::Mutex;

    fn service() -> (GremlinGraphService<TinkerGraphBackend>, SharedGraph) {
        let graph: SharedGraph = Arc::new(Mutex::new(TinkerGraph::new()));
        let service = GremlinGraphService::new(TinkerGraphBackend::new(graph.clone()), &GraphConfig::default());
        (service, graph)
    }

    fn vertex(iri: &str, label: VertexLabel) -> Vertex {
        Vertex::new(iri, 1, label, 10).with_property("rdfsLabel", iri)
    }

    #[tokio::test]
    async fn test_requires_open_graph() {
        let (service, _) = service();
        let err = service.count_vertices(&Filter::new()).await.unwrap_err();
        assert!(matches!(err, OntographError::NotConnected));
    }

    #[tokio::test]
    async fn test_open_is_idempotent_and_cleanup_is_repeatable() {
        let (service, _) = service();
        service.open_graph().await.unwrap();
        service.open_graph().await.unwrap();
        service.cleanup().await.unwrap();
        service.cleanup().await.unwrap();
        assert!(service.query("g.V()").await.is_err());
    }

    #[tokio::test]
    async fn test_add_vertices_and_edges() {
        let (service, graph) = service();
        service.open_graph().await.unwrap();

        let a = vertex("http://x#A", VertexLabel::Class);
        let b = vertex("http://x#B", VertexLabel::Class);
        let added = service
            .add_vertices(VertexLabel::Class, &[a.clone(), b.clone()])
            .await
            .unwrap();
        assert_eq!(added, 2);

        let ids = service.resolve_vertex_ids(1).await.unwrap();
        assert_eq!(ids[&a.key], ElementId::Numeric(a.vertex_id));

        let mut edge = Edge::new(&a.key, &b.key, EdgeLabel::SubClassOf, 1, 10);
        edge.source_vertex_id = ids.get(&a.key).cloned();
        edge.target_vertex_id = ids.get(&b.key).cloned();
        assert_eq!(service.add_edges(&[edge]).await.unwrap(), 1);

        let edges = service
            .get_vertex_edges(&ElementId::Numeric(a.vertex_id), Direction::Out)
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0]["label"], "subClassOf");
        assert_eq!(edges[0]["inV"], json!(b.vertex_id));
        assert_eq!(edges[0]["properties"]["sourceVertexKey"], json!(a.key));

        let found = service.get_ontology_vertex(1, "http://x#B").await.unwrap().unwrap();
        assert_eq!(found["key"], json!(b.key));
        assert_eq!(graph.lock().await.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_sub_graph_is_scoped() {
        let (service, _) = service();
        service.open_graph().await.unwrap();

        service
            .add_vertices(VertexLabel::Class, &[vertex("http://x#A", VertexLabel::Class)])
            .await
            .unwrap();
        let other = Vertex::new("http://y#A", 2, VertexLabel::Class, 10);
        service.add_vertices(VertexLabel::Class, &[other]).await.unwrap();

        service
            .delete_sub_graph(keys::ONTOLOGY_ID, &json!(1))
            .await
            .unwrap();

        assert_eq!(service.count_vertices(&Filter::ontology(1)).await.unwrap(), 0);
        assert_eq!(service.count_vertices(&Filter::ontology(2)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_updates_and_reads() {
        let (service, _) = service();
        service.open_graph().await.unwrap();

        let a = vertex("http://x#A", VertexLabel::NamedIndividual);
        service
            .add_vertices(VertexLabel::NamedIndividual, &[a.clone()])
            .await
            .unwrap();
        let id = ElementId::Numeric(a.vertex_id);

        service.update_vertex(&id, "label", &json!("Renamed")).await.unwrap();
        let row = service.get_vertex(&id).await.unwrap().unwrap();
        assert_eq!(row["rdfsLabel"], "Renamed");
        let renamed = Filter::new().with_property("label", "Renamed");
        assert_eq!(service.count_vertices(&renamed).await.unwrap(), 1);
        assert_eq!(row["label"], "named_individual");

        let rows = service
            .get_vertices(&Filter::new().with_label("named_individual"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        service.delete_vertex(&id).await.unwrap();
        assert!(service.get_vertex(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_replaces_collection_values() {
        let (service, _) = service();
        service.open_graph().await.unwrap();

        let a = vertex("http://x#A", VertexLabel::Class).with_property("synonym", json!(["a", "b"]));
        service.add_vertices(VertexLabel::Class, &[a.clone()]).await.unwrap();
        let id = ElementId::Numeric(a.vertex_id);

        service.update_vertex(&id, "synonym", &json!(["x"])).await.unwrap();
        let values = service
            .query(&format!("g.V({}).values('synonym')", a.vertex_id))
            .await
            .unwrap();
        assert_eq!(values, vec![json!("x")]);

        let mut properties = PropertyMap::new();
        properties.insert("synonym".to_string(), json!(["y", "z"]));
        service.update_vertex_properties(&id, &properties).await.unwrap();
        let row = service.get_vertex(&id).await.unwrap().unwrap();
        assert_eq!(row["synonym"], "y");
        assert_eq!(service.count_vertices(&Filter::new().with_property("synonym", "x")).await.unwrap(), 0);
        assert_eq!(service.count_vertices(&Filter::new().with_property("synonym", "z")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_commit_is_noop_without_transactions() {
        let (service, _) = service();
        service.open_graph().await.unwrap();
        assert!(!service.capabilities().supports_transactions);
        service.commit().await.unwrap();
        service.rollback().await.unwrap();
    }
}
