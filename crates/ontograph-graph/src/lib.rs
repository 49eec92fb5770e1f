//! Ontograph Graph - Graph database abstraction
//!
//! Renders capability-aware Gremlin queries and executes them against
//! interchangeable backends (embedded TinkerGraph, Gremlin Server,
//! JanusGraph, Cosmos DB) behind one service contract.
//!
//! Author: hephaex@gmail.com

pub mod backends;
pub mod capabilities;
pub mod factory;
pub mod gremlin;
pub mod graphson;
pub mod rate_limit;
pub mod service;
pub mod tinkergraph;
pub mod transport;

pub use capabilities::Capabilities;
pub use factory::{create_graph_service, BackendKind, GraphDatabaseServiceFactory, SharedGraph};
pub use gremlin::{Direction, Endpoint, Filter};
pub use rate_limit::RateLimiter;
pub use service::{GraphBackend, GremlinGraphService};
pub use tinkergraph::{GraphSnapshot, TinkerGraph};
pub use transport::GremlinTransport;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use ontograph_core::{Edge, ElementId, PropertyMap, Result, Vertex, VertexLabel};
use serde_json::Value;

/// Uniform contract over every graph backend
#[async_trait]
pub trait GraphDatabaseService: Send + Sync {
    /// Backend family
    fn kind(&self) -> BackendKind;

    /// Capability profile in effect for this instance
    fn capabilities(&self) -> Capabilities;

    /// Acquire the backend connection. Calling it again is a no-op.
    async fn open_graph(&self) -> Result<()>;

    /// Release the backend connection
    async fn close_graph(&self) -> Result<()>;

    /// Release every resource, logging rather than failing
    async fn cleanup(&self) -> Result<()>;

    /// Declare schema once; no-op for schema-less backends
    async fn create_schema(&self) -> Result<()>;

    /// Drop every vertex (and with them every edge)
    async fn delete_graph(&self) -> Result<()>;

    /// Drop the edges and vertices carrying `key = value`
    async fn delete_sub_graph(&self, key: &str, value: &Value) -> Result<()>;

    /// Write the whole graph to `path`. Remote backends write on the server's
    /// filesystem.
    async fn serialize_graph(&self, path: &Path) -> Result<()>;

    // Reads

    async fn get_vertices(&self, filter: &Filter) -> Result<Vec<Value>>;

    async fn get_vertex(&self, id: &ElementId) -> Result<Option<Value>>;

    async fn get_vertex_edges(&self, id: &ElementId, direction: Direction) -> Result<Vec<Value>>;

    async fn get_edges(&self, filter: &Filter) -> Result<Vec<Value>>;

    async fn get_edge(&self, id: &ElementId) -> Result<Option<Value>>;

    /// Look up one ontology vertex by IRI
    async fn get_ontology_vertex(&self, ontology_id: i32, iri: &str) -> Result<Option<Value>>;

    async fn count_vertices(&self, filter: &Filter) -> Result<u64>;

    async fn count_edges(&self, filter: &Filter) -> Result<u64>;

    /// Map every vertex key of an ontology to its backend ID
    async fn resolve_vertex_ids(&self, ontology_id: i32) -> Result<HashMap<String, ElementId>>;

    // Writes

    async fn add_vertex(&self, label: &str, id: Option<&ElementId>, properties: &PropertyMap) -> Result<()>;

    /// One insert per vertex, throttled when rate limiting is enabled
    async fn add_vertices(&self, label: VertexLabel, vertices: &[Vertex]) -> Result<usize>;

    async fn add_edge(&self, edge: &Edge) -> Result<()>;

    /// One insert per edge; endpoints must already exist
    async fn add_edges(&self, edges: &[Edge]) -> Result<usize>;

    async fn update_vertex(&self, id: &ElementId, key: &str, value: &Value) -> Result<()>;

    async fn update_vertex_properties(&self, id: &ElementId, properties: &PropertyMap) -> Result<()>;

    async fn update_edge(&self, id: &ElementId, key: &str, value: &Value) -> Result<()>;

    async fn update_edge_properties(&self, id: &ElementId, properties: &PropertyMap) -> Result<()>;

    async fn delete_vertex(&self, id: &ElementId) -> Result<()>;

    async fn delete_edge(&self, id: &ElementId) -> Result<()>;

    /// Drop matching vertices, repeating capped drops until none remain
    async fn delete_vertices(&self, filter: &Filter) -> Result<()>;

    /// Drop matching edges, repeating capped drops until none remain
    async fn delete_edges(&self, filter: &Filter) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;

    /// Submit a caller-supplied query
    async fn query(&self, raw: &str) -> Result<Vec<Value>>;
}
