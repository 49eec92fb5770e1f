//! JanusGraph variant
//!
//! Schema is declared through the JanusGraph management API by a Groovy
//! script submitted as an ordinary request. The script checks a marker
//! property key first, so it is safe to run on every startup, and rolls the
//! management transaction back if any declaration fails.

use std::sync::Arc;

use async_trait::async_trait;
use ontograph_core::{keys, EdgeLabel, GraphConfig, OntographError, Result, VertexLabel};
use serde_json::Value;
use tracing::info;

use crate::gremlin::quote;
use crate::service::GraphBackend;
use crate::transport::{GremlinTransport, RemoteEndpoint};
use crate::{BackendKind, Capabilities};

/// JVM type of a declared property key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    Integer,
    Long,
}

impl DataType {
    fn class_name(&self) -> &'static str {
        match self {
            Self::String => "String.class",
            Self::Integer => "Integer.class",
            Self::Long => "Long.class",
        }
    }
}

/// Declarations made by the schema script
#[derive(Debug, Clone)]
pub struct GraphSchema {
    /// Property key whose presence means the schema already exists
    pub marker: String,
    pub property_keys: Vec<(String, DataType)>,
    pub vertex_labels: Vec<String>,
    pub edge_labels: Vec<String>,
    /// Composite vertex indexes, one key each
    pub vertex_indexes: Vec<String>,
    /// Composite edge indexes, one key each
    pub edge_indexes: Vec<String>,
}

impl GraphSchema {
    /// Schema for modelled ontology graphs
    pub fn ontology() -> Self {
        let property_keys = [
            (keys::IRI, DataType::String),
            (keys::ONTOLOGY_ID, DataType::Integer),
            (keys::KEY, DataType::String),
            (keys::VERTEX_ID, DataType::Long),
            (keys::LATEST_WEBHOOK_EVENT_ID, DataType::Long),
            (keys::SOURCE_VERTEX_KEY, DataType::String),
            (keys::TARGET_VERTEX_KEY, DataType::String),
            (keys::RELATIONSHIP, DataType::String),
        ];

        Self {
            marker: keys::KEY.to_string(),
            property_keys: property_keys
                .iter()
                .map(|(k, t)| (k.to_string(), *t))
                .collect(),
            vertex_labels: VertexLabel::all()
                .iter()
                .map(|l| l.backend_label().to_string())
                .collect(),
            edge_labels: EdgeLabel::all()
                .iter()
                .map(|l| l.backend_label().to_string())
                .collect(),
            vertex_indexes: [keys::IRI, keys::ONTOLOGY_ID, keys::KEY, keys::VERTEX_ID]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            edge_indexes: [keys::SOURCE_VERTEX_KEY, keys::TARGET_VERTEX_KEY, keys::ONTOLOGY_ID]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

fn index_name(element: &str, key: &str) -> String {
    format!("{element}_{key}_index")
}

/// Render the management script for a schema. Evaluates to `true` when the
/// schema was declared and `false` when the marker key already existed.
pub fn janusgraph_schema_script(schema: &GraphSchema) -> String {
    let mut lines = vec![
        "mgmt = graph.openManagement()".to_string(),
        "try {".to_string(),
        format!(
            "  if (mgmt.getPropertyKey({}) != null) {{ mgmt.rollback(); return false }}",
            quote(&schema.marker)
        ),
    ];

    for (key, data_type) in &schema.property_keys {
        lines.push(format!(
            "  mgmt.makePropertyKey({}).dataType({}).make()",
            quote(key),
            data_type.class_name()
        ));
    }
    for label in &schema.vertex_labels {
        lines.push(format!("  mgmt.makeVertexLabel({}).make()", quote(label)));
    }
    for label in &schema.edge_labels {
        lines.push(format!("  mgmt.makeEdgeLabel({}).make()", quote(label)));
    }
    for (element, class, indexes) in [
        ("vertex", "Vertex.class", &schema.vertex_indexes),
        ("edge", "Edge.class", &schema.edge_indexes),
    ] {
        for key in indexes {
            lines.push(format!(
                "  mgmt.buildIndex({}, {class}).addKey(mgmt.getPropertyKey({})).buildCompositeIndex()",
                quote(&index_name(element, key)),
                quote(key)
            ));
        }
    }

    lines.push("  mgmt.commit()".to_string());
    lines.push("  return true".to_string());
    lines.push("} catch (e) {".to_string());
    lines.push("  mgmt.rollback()".to_string());
    lines.push("  throw e".to_string());
    lines.push("}".to_string());
    lines.join("\n")
}

pub struct JanusGraphBackend {
    endpoint: RemoteEndpoint,
    schema: GraphSchema,
}

impl JanusGraphBackend {
    pub fn new(endpoint: RemoteEndpoint) -> Self {
        Self {
            endpoint,
            schema: GraphSchema::ontology(),
        }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(RemoteEndpoint::from_config(config))
    }

    pub fn with_schema(mut self, schema: GraphSchema) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl GraphBackend for JanusGraphBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::JanusGraph
    }

    fn default_capabilities(&self) -> Capabilities {
        Capabilities::JANUSGRAPH
    }

    async fn connect(&self) -> Result<Arc<dyn GremlinTransport>> {
        self.endpoint.connect().await
    }

    fn requires_iterate(&self) -> bool {
        true
    }

    async fn create_schema(&self, transport: &dyn GremlinTransport, _caps: &Capabilities) -> Result<()> {
        let script = janusgraph_schema_script(&self.schema);
        let rows = transport.submit(&script).await?;

        match rows.first() {
            Some(Value::Bool(true)) => info!("JanusGraph schema created"),
            Some(Value::Bool(false)) => info!("JanusGraph schema already exists"),
            other => {
                return Err(OntographError::transport(
                    format!("Unexpected schema script result: {other:?}"),
                    script,
                ))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GraphDatabaseService, GremlinGraphService};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_schema_script_structure() {
        let script = janusgraph_schema_script(&GraphSchema::ontology());

        assert!(script.starts_with("mgmt = graph.openManagement()"));
        assert!(script.contains("if (mgmt.getPropertyKey('key') != null) { mgmt.rollback(); return false }"));
        assert!(script.contains("mgmt.makePropertyKey('ontologyId').dataType(Integer.class).make()"));
        assert!(script.contains("mgmt.makePropertyKey('vertexId').dataType(Long.class).make()"));
        assert!(script.contains("mgmt.makeVertexLabel('named_individual').make()"));
        assert!(script.contains("mgmt.makeEdgeLabel('linked_named_individual').make()"));
        assert!(script.contains(
            "mgmt.buildIndex('vertex_iri_index', Vertex.class).addKey(mgmt.getPropertyKey('iri')).buildCompositeIndex()"
        ));
        assert!(script.contains("Edge.class"));

        let commit = script.find("mgmt.commit()").unwrap();
        let rollback = script.rfind("mgmt.rollback()").unwrap();
        assert!(commit < rollback);
        assert!(script.trim_end().ends_with("throw e\n}"));
    }

    #[tokio::test]
    async fn test_create_schema_submits_script() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("openManagement"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": {"code": 200, "message": ""},
                "result": {"data": {"@type": "g:List", "@value": [false]}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let address = server.address();
        let config = GraphConfig {
            backend: "janusgraph".to_string(),
            host: address.ip().to_string(),
            port: address.port(),
            ..GraphConfig::default()
        };
        let service = GremlinGraphService::new(JanusGraphBackend::from_config(&config), &config);
        service.open_graph().await.unwrap();
        service.create_schema().await.unwrap();
    }
}
