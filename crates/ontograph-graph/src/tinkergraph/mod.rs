//! Embedded in-memory property graph
//!
//! A TinkerGraph-style store on top of petgraph that evaluates the Gremlin
//! subset produced by the query builder: element creation with optional
//! client IDs, `has`/`hasLabel` filters, property updates, capped drops,
//! value maps and projections, and edge navigation. Property keys declared
//! through [`TinkerGraph::create_index`] are answered from an index.

mod eval;
pub mod lexer;
pub mod parser;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use ontograph_core::{ElementId, OntographError, Result};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

/// Query text the engine cannot parse
#[derive(Error, Debug, PartialEq)]
pub enum SyntaxError {
    #[error("unexpected character '{0}' at {1}")]
    UnexpectedChar(char, usize),

    #[error("unterminated string starting at {0}")]
    UnterminatedString(usize),

    #[error("invalid escape '\\{0}' at {1}")]
    InvalidEscape(char, usize),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected end of query")]
    UnexpectedEnd,

    #[error("unexpected {0}")]
    UnexpectedToken(String),

    #[error("unsupported step '{0}'")]
    UnsupportedStep(String),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub(crate) struct VertexData {
    pub id: ElementId,
    pub label: String,
    pub properties: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Clone)]
pub(crate) struct EdgeData {
    pub id: ElementId,
    pub label: String,
    pub properties: BTreeMap<String, Value>,
}

// ============================================================================
// Snapshots
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexRecord {
    pub id: ElementId,
    pub label: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    pub id: ElementId,
    pub label: String,
    pub out_v: ElementId,
    pub in_v: ElementId,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

/// Serializable image of the whole graph, including declared indexes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub vertices: Vec<VertexRecord>,
    pub edges: Vec<EdgeRecord>,
    #[serde(default)]
    pub indexes: Vec<String>,
}

/// In-memory property graph
#[derive(Debug, Default)]
pub struct TinkerGraph {
    graph: StableDiGraph<VertexData, EdgeData>,
    vertex_ids: HashMap<ElementId, NodeIndex>,
    edge_ids: HashMap<ElementId, EdgeIndex>,
    next_id: i64,
    indexes: HashMap<String, HashMap<String, HashSet<NodeIndex>>>,
    location: Option<PathBuf>,
}

fn index_key(value: &Value) -> String {
    value.to_string()
}

fn id_to_json(id: &ElementId) -> Value {
    match id {
        ElementId::Numeric(n) => Value::from(*n),
        ElementId::Text(s) => Value::String(s.clone()),
    }
}

impl TinkerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one query and return its rows
    pub fn execute(&mut self, query: &str) -> Result<Vec<Value>> {
        let steps = parser::parse(query)
            .map_err(|e| OntographError::QueryError(format!("{e} in query: {query}")))?;
        let rows = self.evaluate(&steps)?;
        debug!(rows = rows.len(), "Embedded query complete");
        Ok(rows)
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Drop every element, keeping declared indexes
    pub fn clear(&mut self) {
        self.graph.clear();
        self.vertex_ids.clear();
        self.edge_ids.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }

    /// Declare a vertex property index. Existing vertices are indexed.
    pub fn create_index(&mut self, key: &str) {
        if self.indexes.contains_key(key) {
            return;
        }
        let mut index: HashMap<String, HashSet<NodeIndex>> = HashMap::new();
        for node in self.graph.node_indices() {
            if let Some(values) = self.graph[node].properties.get(key) {
                for value in values {
                    index.entry(index_key(value)).or_default().insert(node);
                }
            }
        }
        self.indexes.insert(key.to_string(), index);
    }

    pub fn indexed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.indexes.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Snapshot file this graph was restored from, if any
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn set_location(&mut self, location: impl Into<PathBuf>) {
        self.location = Some(location.into());
    }

    /// Capture every element in insertion order
    pub fn snapshot(&self) -> GraphSnapshot {
        let vertices = self
            .graph
            .node_indices()
            .map(|node| {
                let vertex = &self.graph[node];
                VertexRecord {
                    id: vertex.id.clone(),
                    label: vertex.label.clone(),
                    properties: vertex.properties.clone(),
                }
            })
            .collect();

        let edges = self
            .graph
            .edge_indices()
            .filter_map(|edge| {
                let data = self.graph.edge_weight(edge)?;
                let (from, to) = self.graph.edge_endpoints(edge)?;
                Some(EdgeRecord {
                    id: data.id.clone(),
                    label: data.label.clone(),
                    out_v: self.graph[from].id.clone(),
                    in_v: self.graph[to].id.clone(),
                    properties: data.properties.clone(),
                })
            })
            .collect();

        GraphSnapshot {
            vertices,
            edges,
            indexes: self.indexed_keys(),
        }
    }

    /// Rebuild a graph from a snapshot. Duplicate IDs and dangling edge
    /// endpoints are rejected.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        let mut graph = Self::new();

        for record in snapshot.vertices {
            if graph.vertex_ids.contains_key(&record.id) {
                return Err(OntographError::InvalidGraph(format!(
                    "Duplicate vertex id in snapshot: {}",
                    record.id
                )));
            }
            let node = graph.graph.add_node(VertexData {
                id: record.id.clone(),
                label: record.label,
                properties: record.properties,
            });
            graph.vertex_ids.insert(record.id, node);
        }

        for record in snapshot.edges {
            let (Some(&from), Some(&to)) = (graph.vertex_ids.get(&record.out_v), graph.vertex_ids.get(&record.in_v)) else {
                return Err(OntographError::InvalidGraph(format!(
                    "Snapshot edge {} references a missing vertex",
                    record.id
                )));
            };
            if graph.edge_ids.contains_key(&record.id) || graph.vertex_ids.contains_key(&record.id) {
                return Err(OntographError::InvalidGraph(format!(
                    "Duplicate edge id in snapshot: {}",
                    record.id
                )));
            }
            let edge = graph.graph.add_edge(
                from,
                to,
                EdgeData {
                    id: record.id.clone(),
                    label: record.label,
                    properties: record.properties,
                },
            );
            graph.edge_ids.insert(record.id, edge);
        }

        graph.next_id = graph
            .vertex_ids
            .keys()
            .chain(graph.edge_ids.keys())
            .filter_map(|id| match id {
                ElementId::Numeric(n) => Some(*n),
                ElementId::Text(_) => None,
            })
            .max()
            .unwrap_or(0)
            .max(0);

        for key in &snapshot.indexes {
            graph.create_index(key);
        }
        debug!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            "Graph rebuilt from snapshot"
        );
        Ok(graph)
    }

    // ------------------------------------------------------------------
    // Element storage
    // ------------------------------------------------------------------

    fn allocate_id(&mut self) -> ElementId {
        loop {
            self.next_id += 1;
            let id = ElementId::Numeric(self.next_id);
            if !self.vertex_ids.contains_key(&id) && !self.edge_ids.contains_key(&id) {
                return id;
            }
        }
    }

    fn element_id(value: &Value) -> Result<ElementId> {
        ElementId::from_json(value)
            .ok_or_else(|| OntographError::QueryError(format!("Invalid element id: {value}")))
    }

    pub(crate) fn lookup_vertex(&self, id: &Value) -> Option<NodeIndex> {
        ElementId::from_json(id).and_then(|id| self.vertex_ids.get(&id).copied())
    }

    pub(crate) fn lookup_edge(&self, id: &Value) -> Option<EdgeIndex> {
        ElementId::from_json(id).and_then(|id| self.edge_ids.get(&id).copied())
    }

    pub(crate) fn insert_vertex(&mut self, label: &str, id: Option<&Value>) -> Result<NodeIndex> {
        let id = match id {
            Some(value) => {
                let id = Self::element_id(value)?;
                if self.vertex_ids.contains_key(&id) {
                    return Err(OntographError::QueryError(format!(
                        "Vertex with id already exists: {id}"
                    )));
                }
                id
            }
            None => self.allocate_id(),
        };

        let node = self.graph.add_node(VertexData {
            id: id.clone(),
            label: label.to_string(),
            properties: BTreeMap::new(),
        });
        self.vertex_ids.insert(id, node);
        Ok(node)
    }

    pub(crate) fn insert_edge(&mut self, label: &str, from: NodeIndex, to: NodeIndex) -> EdgeIndex {
        let id = self.allocate_id();
        let edge = self.graph.add_edge(
            from,
            to,
            EdgeData {
                id: id.clone(),
                label: label.to_string(),
                properties: BTreeMap::new(),
            },
        );
        self.edge_ids.insert(id, edge);
        edge
    }

    pub(crate) fn set_vertex_property(&mut self, node: NodeIndex, key: &str, value: Value, append: bool) {
        let Some(vertex) = self.graph.node_weight_mut(node) else {
            return;
        };

        let previous = if append {
            vertex.properties.entry(key.to_string()).or_default().push(value.clone());
            Vec::new()
        } else {
            vertex
                .properties
                .insert(key.to_string(), vec![value.clone()])
                .unwrap_or_default()
        };

        if let Some(index) = self.indexes.get_mut(key) {
            for old in previous {
                if let Some(nodes) = index.get_mut(&index_key(&old)) {
                    nodes.remove(&node);
                }
            }
            index.entry(index_key(&value)).or_default().insert(node);
        }
    }

    pub(crate) fn set_edge_property(&mut self, edge: EdgeIndex, key: &str, value: Value) {
        if let Some(data) = self.graph.edge_weight_mut(edge) {
            data.properties.insert(key.to_string(), value);
        }
    }

    /// Remove one value of a vertex property; the key goes with its last value
    pub(crate) fn remove_vertex_property_value(&mut self, node: NodeIndex, key: &str, value: &Value) {
        let Some(vertex) = self.graph.node_weight_mut(node) else {
            return;
        };
        let Some(values) = vertex.properties.get_mut(key) else {
            return;
        };
        let Some(position) = values.iter().position(|v| v == value) else {
            return;
        };
        values.remove(position);
        let still_present = values.contains(value);
        if values.is_empty() {
            vertex.properties.remove(key);
        }

        if !still_present {
            if let Some(nodes) = self.indexes.get_mut(key).and_then(|index| index.get_mut(&index_key(value))) {
                nodes.remove(&node);
            }
        }
    }

    pub(crate) fn remove_edge_property(&mut self, edge: EdgeIndex, key: &str) {
        if let Some(data) = self.graph.edge_weight_mut(edge) {
            data.properties.remove(key);
        }
    }

    pub(crate) fn remove_vertex(&mut self, node: NodeIndex) {
        let incident: Vec<EdgeIndex> = self
            .graph
            .edges_directed(node, petgraph::Direction::Outgoing)
            .chain(self.graph.edges_directed(node, petgraph::Direction::Incoming))
            .map(|e| petgraph::visit::EdgeRef::id(&e))
            .collect();
        for edge in incident {
            self.remove_edge(edge);
        }

        if let Some(vertex) = self.graph.remove_node(node) {
            self.vertex_ids.remove(&vertex.id);
            for (key, values) in &vertex.properties {
                if let Some(index) = self.indexes.get_mut(key) {
                    for value in values {
                        if let Some(nodes) = index.get_mut(&index_key(value)) {
                            nodes.remove(&node);
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn remove_edge(&mut self, edge: EdgeIndex) {
        if let Some(data) = self.graph.remove_edge(edge) {
            self.edge_ids.remove(&data.id);
        }
    }

    /// Candidate vertices for `has(key, value)` when the key is indexed
    pub(crate) fn indexed_vertices(&self, key: &str, value: &Value) -> Option<Vec<NodeIndex>> {
        let index = self.indexes.get(key)?;
        let mut nodes: Vec<NodeIndex> = index
            .get(&index_key(value))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        nodes.sort();
        Some(nodes)
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    pub(crate) fn render_vertex(&self, node: NodeIndex) -> Value {
        let Some(vertex) = self.graph.node_weight(node) else {
            return Value::Null;
        };
        let properties: Map<String, Value> = vertex
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), Value::Array(v.clone())))
            .collect();
        json!({
            "id": id_to_json(&vertex.id),
            "label": vertex.label,
            "type": "vertex",
            "properties": properties,
        })
    }

    pub(crate) fn render_edge(&self, edge: EdgeIndex) -> Value {
        let (Some(data), Some((from, to))) = (self.graph.edge_weight(edge), self.graph.edge_endpoints(edge)) else {
            return Value::Null;
        };
        let properties: Map<String, Value> = data
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        json!({
            "id": id_to_json(&data.id),
            "label": data.label,
            "type": "edge",
            "outV": id_to_json(&self.graph[from].id),
            "inV": id_to_json(&self.graph[to].id),
            "properties": properties,
        })
    }

    pub(crate) fn vertex_id_json(&self, node: NodeIndex) -> Value {
        self.graph
            .node_weight(node)
            .map(|v| id_to_json(&v.id))
            .unwrap_or(Value::Null)
    }

    pub(crate) fn edge_id_json(&self, edge: EdgeIndex) -> Value {
        self.graph
            .edge_weight(edge)
            .map(|e| id_to_json(&e.id))
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_sample(graph: &mut TinkerGraph) {
        for (id, key, onto) in [(1, "A_1", 1), (2, "B_1", 1), (3, "C_2", 2)] {
            graph
                .execute(&format!(
                    "g.addV('class').property(id, {id}).property('key', '{key}').property('ontologyId', {onto})"
                ))
                .unwrap();
        }
        graph
            .execute("g.V(1).as('a').V(2).addE('subClassOf').from('a').property('relationship', 'subClassOf')")
            .unwrap();
    }

    #[test]
    fn test_add_and_count() {
        let mut graph = TinkerGraph::new();
        load_sample(&mut graph);

        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.execute("g.V().has('ontologyId', 1).count()").unwrap(), vec![json!(2)]);
        assert_eq!(graph.execute("g.E().count()").unwrap(), vec![json!(1)]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut graph = TinkerGraph::new();
        graph.execute("g.addV('class').property(id, 1)").unwrap();
        let err = graph.execute("g.addV('class').property(id, 1)").unwrap_err();
        assert!(matches!(err, OntographError::QueryError(_)));
    }

    #[test]
    fn test_string_and_numeric_ids_are_distinct() {
        let mut graph = TinkerGraph::new();
        graph.execute("g.addV('class').property('id', '7')").unwrap();

        assert!(graph.execute("g.V(7).count()").unwrap() == vec![json!(0)]);
        assert!(graph.execute("g.V('7').count()").unwrap() == vec![json!(1)]);
    }

    #[test]
    fn test_value_map_and_projection() {
        let mut graph = TinkerGraph::new();
        load_sample(&mut graph);

        let rows = graph
            .execute("g.V().has('key', 'A_1').valueMap(true).by(unfold())")
            .unwrap();
        assert_eq!(rows, vec![json!({"id": 1, "label": "class", "key": "A_1", "ontologyId": 1})]);

        let rows = graph.execute("g.V(2).valueMap(true, 'key')").unwrap();
        assert_eq!(rows, vec![json!({"id": 2, "label": "class", "key": ["B_1"]})]);

        let rows = graph
            .execute(
                "g.E().project('id', 'label', 'outV', 'inV', 'properties')\
                 .by(id).by(label).by(outV().id()).by(inV().id()).by(valueMap())",
            )
            .unwrap();
        assert_eq!(rows[0]["outV"], 1);
        assert_eq!(rows[0]["inV"], 2);
        assert_eq!(rows[0]["properties"]["relationship"], "subClassOf");
    }

    #[test]
    fn test_capped_drop() {
        let mut graph = TinkerGraph::new();
        for _ in 0..25 {
            graph.execute("g.addV('class').property('ontologyId', 3)").unwrap();
        }

        graph.execute("g.V().has('ontologyId', 3).limit(10).drop()").unwrap();
        assert_eq!(graph.vertex_count(), 15);
        graph.execute("g.V().has('ontologyId', 3).drop().iterate()").unwrap();
        assert_eq!(graph.vertex_count(), 0);
    }

    #[test]
    fn test_dropping_vertex_drops_edges() {
        let mut graph = TinkerGraph::new();
        load_sample(&mut graph);

        graph.execute("g.V(1).drop()").unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.execute("g.V().has('key', 'A_1').count()").unwrap(), vec![json!(0)]);
    }

    #[test]
    fn test_index_follows_updates() {
        let mut graph = TinkerGraph::new();
        load_sample(&mut graph);
        graph.create_index("key");

        graph.execute("g.V(1).property('key', 'Z_1')").unwrap();
        assert_eq!(graph.execute("g.V().has('key', 'A_1').count()").unwrap(), vec![json!(0)]);
        assert_eq!(graph.execute("g.V().has('key', 'Z_1').id()").unwrap(), vec![json!(1)]);

        graph.execute("g.V().has('key', 'Z_1').drop()").unwrap();
        assert_eq!(graph.execute("g.V().has('key', 'Z_1').count()").unwrap(), vec![json!(0)]);
        assert_eq!(graph.indexed_keys(), vec!["key".to_string()]);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut graph = TinkerGraph::new();
        load_sample(&mut graph);
        graph.execute("g.V(3).property(list, 'syn', 'x').property(list, 'syn', 'y')").unwrap();
        graph.create_index("key");

        let snapshot = graph.snapshot();
        let bytes = serde_json::to_vec(&snapshot).unwrap();
        let mut restored = TinkerGraph::from_snapshot(serde_json::from_slice(&bytes).unwrap()).unwrap();

        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.indexed_keys(), vec!["key".to_string()]);
        assert_eq!(restored.execute("g.V(3).values('syn')").unwrap(), vec![json!("x"), json!("y")]);
        assert_eq!(restored.execute("g.V(1).out().values('key')").unwrap(), vec![json!("B_1")]);

        // Fresh IDs never reuse restored ones
        restored.execute("g.addV('class').property('key', 'D')").unwrap();
        assert_eq!(restored.vertex_count(), 4);
        assert_eq!(restored.execute("g.V().has('key', 'D').count()").unwrap(), vec![json!(1)]);
    }

    #[test]
    fn test_snapshot_rejects_dangling_edges() {
        let snapshot = GraphSnapshot {
            vertices: vec![VertexRecord {
                id: ElementId::Numeric(1),
                label: "class".to_string(),
                properties: BTreeMap::new(),
            }],
            edges: vec![EdgeRecord {
                id: ElementId::Numeric(5),
                label: "subClassOf".to_string(),
                out_v: ElementId::Numeric(1),
                in_v: ElementId::Numeric(2),
                properties: BTreeMap::new(),
            }],
            indexes: Vec::new(),
        };
        let err = TinkerGraph::from_snapshot(snapshot).unwrap_err();
        assert_eq!(err.kind(), "data");
    }

    #[test]
    fn test_syntax_error_is_query_error() {
        let mut graph = TinkerGraph::new();
        let err = graph.execute("g.V(").unwrap_err();
        assert_eq!(err.kind(), "query");
    }
}
