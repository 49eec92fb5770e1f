//! Ontograph Core - Property-graph models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the pipeline:
//! - Property-graph models (vertices, edges, ontology graphs)
//! - Pipeline messages exchanged between stages
//! - Common error types
//! - Object storage and message publishing traits
//! - Configuration management

pub mod config;
pub mod messaging;
pub mod storage;

pub use config::{
    AppConfig, CapabilityOverrides, ConfigError, GraphConfig, LoggingConfig, MessagingConfig,
    PipelineConfig, RateLimiterConfig, StorageConfig, TransportKind,
};
pub use messaging::ChannelPublisher;
pub use storage::LocalObjectStorage;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for pipeline operations
#[derive(Error, Debug)]
pub enum OntographError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {message} (query: {query})")]
    TransportError { message: String, query: String },

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Invalid property graph: {0}")]
    InvalidGraph(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Messaging error: {0}")]
    MessagingError(String),

    #[error("Graph is not connected")]
    NotConnected,

    #[error("Pipeline stage {stage} failed: {source}")]
    Pipeline {
        stage: PipelineStage,
        #[source]
        source: Box<OntographError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OntographError {
    /// Build a transport error carrying the query that failed
    pub fn transport(message: impl Into<String>, query: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
            query: query.into(),
        }
    }

    /// Wrap an error as the failure of a pipeline stage.
    ///
    /// Errors that are already tagged keep their original stage.
    pub fn pipeline(stage: PipelineStage, source: OntographError) -> Self {
        match source {
            already @ Self::Pipeline { .. } => already,
            other => Self::Pipeline {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Error-kind tag the invoking layer uses to classify failures
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pipeline { stage, .. } => stage.as_str(),
            Self::ConfigError(_) => "configuration",
            Self::TransportError { .. } | Self::NotConnected => "transport",
            Self::QueryError(_) => "query",
            Self::InvalidGraph(_) => "data",
            Self::StorageError(_) => "storage",
            Self::MessagingError(_) => "messaging",
            Self::Other(_) => "other",
        }
    }
}

impl From<ConfigError> for OntographError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OntographError>;

/// Pipeline stages that report failures under their own tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    ModellerGraph,
    LoaderGraph,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModellerGraph => "modeller-graph",
            Self::LoaderGraph => "loader-graph",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Backend element identifier.
///
/// Engines disagree on ID types (JanusGraph uses longs, Cosmos DB uses
/// strings), so identifiers read back from a backend are never assumed
/// to be of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementId {
    Numeric(i64),
    Text(String),
}

impl ElementId {
    /// Parse an identifier out of a raw JSON value
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Self::Numeric),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ElementId {
    fn from(id: i64) -> Self {
        Self::Numeric(id)
    }
}

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for ElementId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

/// Stable vertex key for an IRI within one ontology
pub fn vertex_key(iri: &str, ontology_id: i32) -> String {
    format!("{iri}_{ontology_id}")
}

/// Deterministic positive identifier derived from a vertex key
pub fn vertex_id_for_key(key: &str) -> i64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(bytes) & i64::MAX as u64) as i64
}

// ============================================================================
// Property-Graph Models
// ============================================================================

/// Insertion-ordered property map
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

/// Structural property keys written with every element
pub mod keys {
    pub const IRI: &str = "iri";
    pub const ONTOLOGY_ID: &str = "ontologyId";
    pub const KEY: &str = "key";
    pub const VERTEX_ID: &str = "vertexId";
    pub const LATEST_WEBHOOK_EVENT_ID: &str = "latestWebhookEventId";
    pub const SOURCE_VERTEX_KEY: &str = "sourceVertexKey";
    pub const TARGET_VERTEX_KEY: &str = "targetVertexKey";
    pub const RELATIONSHIP: &str = "relationship";

    pub const VERTEX_STRUCTURAL: [&str; 5] = [IRI, ONTOLOGY_ID, KEY, VERTEX_ID, LATEST_WEBHOOK_EVENT_ID];

    pub const EDGE_STRUCTURAL: [&str; 4] =
        [SOURCE_VERTEX_KEY, TARGET_VERTEX_KEY, ONTOLOGY_ID, LATEST_WEBHOOK_EVENT_ID];

    /// Name an annotation is written under when it collides with a structural key
    pub fn annotation_alias(key: &str) -> String {
        let mut chars = key.chars();
        match chars.next() {
            Some(first) => format!("annotation{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => "annotation".to_string(),
        }
    }
}

/// Copy annotations, moving any that would shadow a structural key to its alias
fn annotations_for_backend(properties: &PropertyMap, structural: &[&str], element: &str) -> PropertyMap {
    let mut props = PropertyMap::with_capacity(properties.len());
    for (key, value) in properties {
        if structural.contains(&key.as_str()) {
            let alias = keys::annotation_alias(key);
            tracing::warn!(element, key = %key, alias = %alias, "Annotation collides with a structural key");
            props.insert(alias, value.clone());
        } else {
            props.insert(key.clone(), value.clone());
        }
    }
    props
}

/// Vertex label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VertexLabel {
    #[serde(rename = "Class")]
    Class,
    #[serde(rename = "Named Individual")]
    NamedIndividual,
}

impl VertexLabel {
    /// Label as written to a graph backend
    pub fn backend_label(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::NamedIndividual => "named_individual",
        }
    }

    pub fn all() -> [VertexLabel; 2] {
        [Self::Class, Self::NamedIndividual]
    }
}

impl std::fmt::Display for VertexLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Class => write!(f, "Class"),
            Self::NamedIndividual => write!(f, "Named Individual"),
        }
    }
}

/// Edge label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeLabel {
    #[serde(rename = "subClassOf")]
    SubClassOf,
    #[serde(rename = "instanceOf")]
    InstanceOf,
    #[serde(rename = "Linked Named Individual")]
    LinkedNamedIndividual,
}

impl EdgeLabel {
    /// Label as written to a graph backend
    pub fn backend_label(&self) -> &'static str {
        match self {
            Self::SubClassOf => "subClassOf",
            Self::InstanceOf => "instanceOf",
            Self::LinkedNamedIndividual => "linked_named_individual",
        }
    }

    pub fn all() -> [EdgeLabel; 3] {
        [Self::SubClassOf, Self::InstanceOf, Self::LinkedNamedIndividual]
    }
}

impl std::fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubClassOf => write!(f, "subClassOf"),
            Self::InstanceOf => write!(f, "instanceOf"),
            Self::LinkedNamedIndividual => write!(f, "Linked Named Individual"),
        }
    }
}

/// Timestamps are exchanged as `yyyy-MM-dd HH:mm:ss`
mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

/// An OWL class or named individual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vertex {
    /// Entity IRI
    pub iri: String,

    /// Owning ontology
    pub ontology_id: i32,

    /// Stable key (`iri_ontologyId`)
    pub key: String,

    /// Deterministic identifier derived from the key
    pub vertex_id: i64,

    pub label: VertexLabel,

    pub latest_webhook_event_id: i64,

    /// Annotation properties
    #[serde(default)]
    pub properties: PropertyMap,

    #[serde(with = "timestamp", default = "now")]
    pub date_last_updated: NaiveDateTime,
}

impl Vertex {
    /// Create a vertex for an IRI within an ontology
    pub fn new(
        iri: impl Into<String>,
        ontology_id: i32,
        label: VertexLabel,
        latest_webhook_event_id: i64,
    ) -> Self {
        let iri = iri.into();
        let key = vertex_key(&iri, ontology_id);
        Self {
            vertex_id: vertex_id_for_key(&key),
            iri,
            ontology_id,
            key,
            label,
            latest_webhook_event_id,
            properties: PropertyMap::new(),
            date_last_updated: now(),
        }
    }

    /// Add an annotation property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Properties written to a graph backend: annotations plus structural keys
    pub fn backend_properties(&self) -> PropertyMap {
        let mut props = annotations_for_backend(&self.properties, &keys::VERTEX_STRUCTURAL, &self.key);
        props.insert(keys::IRI.to_string(), self.iri.clone().into());
        props.insert(keys::ONTOLOGY_ID.to_string(), self.ontology_id.into());
        props.insert(keys::KEY.to_string(), self.key.clone().into());
        props.insert(keys::VERTEX_ID.to_string(), self.vertex_id.into());
        props.insert(
            keys::LATEST_WEBHOOK_EVENT_ID.to_string(),
            self.latest_webhook_event_id.into(),
        );
        props
    }
}

/// A relationship between two vertices of the same ontology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source_vertex_key: String,

    /// Backend ID of the source, resolved at load time
    #[serde(default)]
    pub source_vertex_id: Option<ElementId>,

    pub target_vertex_key: String,

    /// Backend ID of the target, resolved at load time
    #[serde(default)]
    pub target_vertex_id: Option<ElementId>,

    pub ontology_id: i32,

    pub latest_webhook_event_id: i64,

    pub label: EdgeLabel,

    #[serde(default)]
    pub properties: PropertyMap,

    #[serde(with = "timestamp", default = "now")]
    pub date_last_updated: NaiveDateTime,
}

impl Edge {
    /// Create an edge between two vertex keys
    pub fn new(
        source_vertex_key: impl Into<String>,
        target_vertex_key: impl Into<String>,
        label: EdgeLabel,
        ontology_id: i32,
        latest_webhook_event_id: i64,
    ) -> Self {
        let mut properties = PropertyMap::new();
        properties.insert(keys::RELATIONSHIP.to_string(), label.to_string().into());
        Self {
            source_vertex_key: source_vertex_key.into(),
            source_vertex_id: None,
            target_vertex_key: target_vertex_key.into(),
            target_vertex_id: None,
            ontology_id,
            latest_webhook_event_id,
            label,
            properties,
            date_last_updated: now(),
        }
    }

    /// Set the relationship property
    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.properties
            .insert(keys::RELATIONSHIP.to_string(), relationship.into().into());
        self
    }

    pub fn relationship(&self) -> Option<&str> {
        self.properties.get(keys::RELATIONSHIP).and_then(|v| v.as_str())
    }

    /// Properties written to a graph backend
    pub fn backend_properties(&self) -> PropertyMap {
        let mut props = annotations_for_backend(&self.properties, &keys::EDGE_STRUCTURAL, &self.source_vertex_key);
        props.insert(
            keys::SOURCE_VERTEX_KEY.to_string(),
            self.source_vertex_key.clone().into(),
        );
        props.insert(
            keys::TARGET_VERTEX_KEY.to_string(),
            self.target_vertex_key.clone().into(),
        );
        props.insert(keys::ONTOLOGY_ID.to_string(), self.ontology_id.into());
        props.insert(
            keys::LATEST_WEBHOOK_EVENT_ID.to_string(),
            self.latest_webhook_event_id.into(),
        );
        props
    }

    /// Forget any backend IDs carried over from a previous load
    pub fn clear_resolved_ids(&mut self) {
        self.source_vertex_id = None;
        self.target_vertex_id = None;
    }
}

/// The modelled form of one ontology: a keyed vertex set and an edge list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleOntologyPropertyGraph {
    /// Ontology ID
    pub id: i32,

    pub latest_webhook_event_id: i64,

    /// Vertices keyed by their stable key, iterated and serialized in key order
    #[serde(default)]
    pub vertices: BTreeMap<String, Vertex>,

    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl SimpleOntologyPropertyGraph {
    pub fn new(id: i32, latest_webhook_event_id: i64) -> Self {
        Self {
            id,
            latest_webhook_event_id,
            vertices: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    /// Parse a serialized graph artifact
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| OntographError::InvalidGraph(format!("Malformed graph artifact: {e}")))
    }

    /// Serialize to the artifact format
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| OntographError::InvalidGraph(format!("Failed to serialize graph: {e}")))
    }

    /// Insert a vertex, replacing any vertex with the same key
    pub fn add_vertex(&mut self, vertex: Vertex) {
        self.vertices.insert(vertex.key.clone(), vertex);
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn contains_vertex(&self, key: &str) -> bool {
        self.vertices.contains_key(key)
    }

    /// Vertices carrying the given label, in key order
    pub fn vertices_with_label(&self, label: VertexLabel) -> Vec<&Vertex> {
        self.vertices.values().filter(|v| v.label == label).collect()
    }

    /// Check keys, ontology scoping and edge endpoints
    pub fn validate(&self) -> Result<()> {
        for (key, vertex) in &self.vertices {
            if key != &vertex.key {
                return Err(OntographError::InvalidGraph(format!(
                    "Vertex stored under '{key}' has key '{}'",
                    vertex.key
                )));
            }
            if vertex.ontology_id != self.id {
                return Err(OntographError::InvalidGraph(format!(
                    "Vertex '{key}' belongs to ontology {}, expected {}",
                    vertex.ontology_id, self.id
                )));
            }
            if vertex.key != vertex_key(&vertex.iri, vertex.ontology_id) {
                return Err(OntographError::InvalidGraph(format!(
                    "Vertex key '{key}' does not match its IRI and ontology"
                )));
            }
        }

        for edge in &self.edges {
            if edge.ontology_id != self.id {
                return Err(OntographError::InvalidGraph(format!(
                    "Edge {} -> {} belongs to ontology {}, expected {}",
                    edge.source_vertex_key, edge.target_vertex_key, edge.ontology_id, self.id
                )));
            }
            for key in [&edge.source_vertex_key, &edge.target_vertex_key] {
                if !self.contains_vertex(key) {
                    return Err(OntographError::InvalidGraph(format!(
                        "Edge {} -> {} references missing vertex '{key}'",
                        edge.source_vertex_key, edge.target_vertex_key
                    )));
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// Pipeline Messages
// ============================================================================

/// Message exchanged between pipeline stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyMessage {
    pub ontology_id: i32,

    pub webhook_event_id: i64,

    /// Artifact base name shared by every stage
    pub processed_filename: String,

    #[serde(default)]
    pub semantically_valid: bool,
}

impl OntologyMessage {
    pub fn new(ontology_id: i32, webhook_event_id: i64, processed_filename: impl Into<String>) -> Self {
        Self {
            ontology_id,
            webhook_event_id,
            processed_filename: processed_filename.into(),
            semantically_valid: false,
        }
    }

    /// Name of the JSON artifact for this message
    pub fn json_processed_filename(&self) -> String {
        format!("{}.json", self.processed_filename)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Object storage organised in named containers
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn container_exists(&self, container: &str) -> Result<bool>;

    async fn create_container(&self, container: &str) -> Result<()>;

    /// Download an object to a local file
    async fn download_object(&self, container: &str, name: &str, destination: &Path) -> Result<()>;

    /// Upload a local file as an object
    async fn upload_object(&self, container: &str, name: &str, source: &Path) -> Result<()>;

    /// Release client resources
    async fn cleanup(&self) -> Result<()>;
}

/// Message fabric used to hand work to the next stage
#[async_trait::async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, channel: &str, message: &OntologyMessage) -> Result<()>;
}

// ============================================================================
// Tests
// ============================================================================
