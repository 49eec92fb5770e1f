//! Step evaluation over the in-memory graph

use std::collections::HashSet;

use ontograph_core::{OntographError, Result};
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde_json::{Map, Value};

use super::parser::{By, Cardinality, PropertyKey, PropertyWrite, Step, TokenKind};
use super::TinkerGraph;
use crate::gremlin::Direction;

#[derive(Debug, Clone)]
enum Item {
    Vertex(NodeIndex),
    Edge(EdgeIndex),
    /// One property value together with the element that owns it
    Property {
        owner: Box<Item>,
        key: String,
        value: Value,
    },
    Value(Value),
}

#[derive(Debug, Clone)]
struct Traverser {
    item: Item,
    labels: Vec<(String, Item)>,
}

impl Traverser {
    fn root() -> Self {
        Self {
            item: Item::Value(Value::Null),
            labels: Vec::new(),
        }
    }

    fn split(&self, item: Item) -> Self {
        Self {
            item,
            labels: self.labels.clone(),
        }
    }

    fn labelled(&self, label: &str) -> Option<&Item> {
        self.labels.iter().rev().find(|(l, _)| l == label).map(|(_, item)| item)
    }
}

fn query_error(message: impl Into<String>) -> OntographError {
    OntographError::QueryError(message.into())
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

fn petgraph_directions(direction: Direction) -> &'static [petgraph::Direction] {
    match direction {
        Direction::Out => &[petgraph::Direction::Outgoing],
        Direction::In => &[petgraph::Direction::Incoming],
        Direction::Both => &[petgraph::Direction::Outgoing, petgraph::Direction::Incoming],
    }
}

impl TinkerGraph {
    pub(super) fn evaluate(&mut self, steps: &[Step]) -> Result<Vec<Value>> {
        let traversers = self.run(steps, vec![Traverser::root()])?;
        Ok(traversers.iter().map(|t| self.render(&t.item)).collect())
    }

    fn run(&mut self, steps: &[Step], mut traversers: Vec<Traverser>) -> Result<Vec<Traverser>> {
        for (i, step) in steps.iter().enumerate() {
            traversers = self.apply(step, steps.get(i + 1), traversers)?;
        }
        Ok(traversers)
    }

    fn render(&self, item: &Item) -> Value {
        match item {
            Item::Vertex(node) => self.render_vertex(*node),
            Item::Edge(edge) => self.render_edge(*edge),
            Item::Property { key, value, .. } => serde_json::json!({ "key": key, "value": value }),
            Item::Value(value) => value.clone(),
        }
    }

    fn apply(&mut self, step: &Step, next: Option<&Step>, input: Vec<Traverser>) -> Result<Vec<Traverser>> {
        let output = match step {
            Step::V(ids) => {
                let nodes = self.start_vertices(ids, next);
                input
                    .iter()
                    .flat_map(|t| nodes.iter().map(move |n| t.split(Item::Vertex(*n))))
                    .collect()
            }
            Step::E(ids) => {
                let edges: Vec<EdgeIndex> = if ids.is_empty() {
                    self.graph.edge_indices().collect()
                } else {
                    ids.iter().filter_map(|id| self.lookup_edge(id)).collect()
                };
                input
                    .iter()
                    .flat_map(|t| edges.iter().map(move |e| t.split(Item::Edge(*e))))
                    .collect()
            }
            Step::AddV { label, properties } => {
                let mut output = Vec::with_capacity(input.len());
                for t in &input {
                    let node = self.add_vertex_with(label, properties)?;
                    output.push(t.split(Item::Vertex(node)));
                }
                output
            }
            Step::AddE {
                label,
                from,
                to,
                properties,
            } => {
                let mut output = Vec::with_capacity(input.len());
                for t in &input {
                    let source = Self::endpoint(t, from.as_deref())?;
                    let target = Self::endpoint(t, to.as_deref())?;
                    let edge = self.insert_edge(label, source, target);
                    for write in properties {
                        self.write_property(&Item::Edge(edge), write)?;
                    }
                    output.push(t.split(Item::Edge(edge)));
                }
                output
            }
            Step::As(name) => input
                .into_iter()
                .map(|mut t| {
                    t.labels.push((name.clone(), t.item.clone()));
                    t
                })
                .collect(),
            Step::Has { key, value } => input
                .into_iter()
                .filter(|t| self.has_property(&t.item, key, value.as_ref()))
                .collect(),
            Step::HasLabel(labels) => input
                .into_iter()
                .filter(|t| self.label_of(&t.item).is_some_and(|l| labels.iter().any(|x| x == l)))
                .collect(),
            Step::Property(write) => {
                for t in &input {
                    self.write_property(&t.item, write)?;
                }
                input
            }
            Step::Limit(n) => input.into_iter().take(*n).collect(),
            Step::Drop => {
                for t in &input {
                    match t.item {
                        Item::Vertex(node) => self.remove_vertex(node),
                        Item::Edge(edge) => self.remove_edge(edge),
                        Item::Property {
                            ref owner,
                            ref key,
                            ref value,
                        } => match **owner {
                            Item::Vertex(node) => self.remove_vertex_property_value(node, key, value),
                            Item::Edge(edge) => self.remove_edge_property(edge, key),
                            _ => {}
                        },
                        _ => {}
                    }
                }
                Vec::new()
            }
            Step::Count => vec![Traverser {
                item: Item::Value(Value::from(input.len() as u64)),
                labels: Vec::new(),
            }],
            Step::ValueMap { tokens, keys, unfold } => input
                .iter()
                .filter_map(|t| {
                    self.value_map(&t.item, *tokens, keys, *unfold)
                        .map(|map| t.split(Item::Value(Value::Object(map))))
                })
                .collect(),
            Step::Values(keys) => input
                .iter()
                .flat_map(|t| {
                    self.properties_of(&t.item, keys)
                        .into_iter()
                        .map(|(_, value)| t.split(Item::Value(value)))
                        .collect::<Vec<_>>()
                })
                .collect(),
            Step::Properties(keys) => input
                .iter()
                .flat_map(|t| {
                    self.properties_of(&t.item, keys)
                        .into_iter()
                        .map(|(key, value)| {
                            t.split(Item::Property {
                                owner: Box::new(t.item.clone()),
                                key,
                                value,
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .collect(),
            Step::Key => input
                .iter()
                .filter_map(|t| match &t.item {
                    Item::Property { key, .. } => Some(t.split(Item::Value(Value::String(key.clone())))),
                    _ => None,
                })
                .collect(),
            Step::Value => input
                .iter()
                .filter_map(|t| match &t.item {
                    Item::Property { value, .. } => Some(t.split(Item::Value(value.clone()))),
                    _ => None,
                })
                .collect(),
            Step::Id => input
                .iter()
                .filter_map(|t| self.id_of(&t.item).map(|id| t.split(Item::Value(id))))
                .collect(),
            Step::Label => input
                .iter()
                .filter_map(|t| {
                    self.label_of(&t.item)
                        .map(|l| t.split(Item::Value(Value::String(l.to_string()))))
                })
                .collect(),
            Step::Project { names, by } => {
                let identity = By::Identity;
                let mut output = Vec::with_capacity(input.len());
                for t in &input {
                    let mut map = Map::new();
                    for (i, name) in names.iter().enumerate() {
                        let modulator = if by.is_empty() { &identity } else { &by[i % by.len()] };
                        if let Some(value) = self.modulate(modulator, t)? {
                            map.insert(name.clone(), value);
                        }
                    }
                    output.push(t.split(Item::Value(Value::Object(map))));
                }
                output
            }
            Step::Dedup => {
                let mut seen = HashSet::new();
                input
                    .into_iter()
                    .filter(|t| seen.insert(self.render(&t.item).to_string()))
                    .collect()
            }
            Step::EdgesOf(direction, labels) => input
                .iter()
                .flat_map(|t| {
                    self.incident_edges(&t.item, *direction, labels)
                        .into_iter()
                        .map(|(edge, _)| t.split(Item::Edge(edge)))
                        .collect::<Vec<_>>()
                })
                .collect(),
            Step::Adjacent(direction, labels) => input
                .iter()
                .flat_map(|t| {
                    self.incident_edges(&t.item, *direction, labels)
                        .into_iter()
                        .map(|(_, other)| t.split(Item::Vertex(other)))
                        .collect::<Vec<_>>()
                })
                .collect(),
            Step::OutV | Step::InV | Step::BothV => input
                .iter()
                .flat_map(|t| {
                    let ends = match t.item {
                        Item::Edge(edge) => self.graph.edge_endpoints(edge),
                        _ => None,
                    };
                    let nodes = match (step, ends) {
                        (Step::OutV, Some((from, _))) => vec![from],
                        (Step::InV, Some((_, to))) => vec![to],
                        (Step::BothV, Some((from, to))) => vec![from, to],
                        _ => Vec::new(),
                    };
                    nodes.into_iter().map(|n| t.split(Item::Vertex(n))).collect::<Vec<_>>()
                })
                .collect(),
            Step::Unfold => input
                .iter()
                .flat_map(|t| match &t.item {
                    Item::Value(Value::Array(items)) => {
                        items.iter().map(|v| t.split(Item::Value(v.clone()))).collect::<Vec<_>>()
                    }
                    Item::Value(Value::Object(map)) => map
                        .iter()
                        .map(|(k, v)| {
                            let mut entry = Map::new();
                            entry.insert(k.clone(), v.clone());
                            t.split(Item::Value(Value::Object(entry)))
                        })
                        .collect(),
                    _ => vec![t.clone()],
                })
                .collect(),
            Step::SideEffect(nested) => {
                for t in &input {
                    self.run(nested, vec![t.clone()])?;
                }
                input
            }
            Step::Identity => input,
            Step::Iterate | Step::Commit | Step::Rollback => Vec::new(),
        };
        Ok(output)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn start_vertices(&self, ids: &[Value], next: Option<&Step>) -> Vec<NodeIndex> {
        if !ids.is_empty() {
            return ids.iter().filter_map(|id| self.lookup_vertex(id)).collect();
        }
        if let Some(Step::Has { key, value: Some(value) }) = next {
            if let Some(nodes) = self.indexed_vertices(key, value) {
                return nodes;
            }
        }
        self.graph.node_indices().collect()
    }

    fn add_vertex_with(&mut self, label: &str, properties: &[PropertyWrite]) -> Result<NodeIndex> {
        let id = properties
            .iter()
            .find(|w| w.key == PropertyKey::Id)
            .map(|w| &w.value);
        let node = self.insert_vertex(label, id)?;
        for write in properties.iter().filter(|w| w.key != PropertyKey::Id) {
            self.write_property(&Item::Vertex(node), write)?;
        }
        Ok(node)
    }

    fn endpoint(traverser: &Traverser, label: Option<&str>) -> Result<NodeIndex> {
        let item = match label {
            Some(label) => traverser
                .labelled(label)
                .ok_or_else(|| query_error(format!("No step labelled '{label}'")))?,
            None => &traverser.item,
        };
        match item {
            Item::Vertex(node) => Ok(*node),
            _ => Err(query_error("Edge endpoints must be vertices")),
        }
    }

    fn write_property(&mut self, item: &Item, write: &PropertyWrite) -> Result<()> {
        let PropertyKey::Name(key) = &write.key else {
            return Err(query_error("Element ids cannot be modified"));
        };
        if write.value.is_null() {
            return Ok(());
        }
        match item {
            Item::Vertex(node) => {
                self.set_vertex_property(*node, key, write.value.clone(), write.cardinality == Cardinality::List);
                Ok(())
            }
            Item::Edge(edge) => {
                self.set_edge_property(*edge, key, write.value.clone());
                Ok(())
            }
            _ => Err(query_error("property() requires a vertex or an edge")),
        }
    }

    fn has_property(&self, item: &Item, key: &str, expected: Option<&Value>) -> bool {
        let values: Vec<&Value> = match item {
            Item::Vertex(node) => self
                .graph
                .node_weight(*node)
                .and_then(|v| v.properties.get(key))
                .map(|values| values.iter().collect())
                .unwrap_or_default(),
            Item::Edge(edge) => self
                .graph
                .edge_weight(*edge)
                .and_then(|e| e.properties.get(key))
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };
        match expected {
            None => !values.is_empty(),
            Some(expected) => values.iter().any(|v| values_equal(v, expected)),
        }
    }

    fn label_of(&self, item: &Item) -> Option<&str> {
        match item {
            Item::Vertex(node) => self.graph.node_weight(*node).map(|v| v.label.as_str()),
            Item::Edge(edge) => self.graph.edge_weight(*edge).map(|e| e.label.as_str()),
            _ => None,
        }
    }

    fn id_of(&self, item: &Item) -> Option<Value> {
        match item {
            Item::Vertex(node) => Some(self.vertex_id_json(*node)),
            Item::Edge(edge) => Some(self.edge_id_json(*edge)),
            _ => None,
        }
    }

    /// Property key/value pairs of an element, in key order unless keys are given
    fn properties_of(&self, item: &Item, keys: &[String]) -> Vec<(String, Value)> {
        let wanted = |k: &String| keys.is_empty() || keys.contains(k);
        let mut pairs: Vec<(String, Value)> = match item {
            Item::Vertex(node) => self
                .graph
                .node_weight(*node)
                .map(|v| {
                    v.properties
                        .iter()
                        .filter(|(k, _)| wanted(k))
                        .flat_map(|(k, values)| values.iter().map(move |value| (k.clone(), value.clone())))
                        .collect()
                })
                .unwrap_or_default(),
            Item::Edge(edge) => self
                .graph
                .edge_weight(*edge)
                .map(|e| {
                    e.properties
                        .iter()
                        .filter(|(k, _)| wanted(k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        if !keys.is_empty() {
            pairs.sort_by_key(|(k, _)| keys.iter().position(|x| x == k));
        }
        pairs
    }

    fn value_map(&self, item: &Item, tokens: bool, keys: &[String], unfold: bool) -> Option<Map<String, Value>> {
        let mut map = Map::new();
        if tokens {
            map.insert("id".to_string(), self.id_of(item)?);
            map.insert("label".to_string(), Value::String(self.label_of(item)?.to_string()));
        }

        let wanted = |k: &String| keys.is_empty() || keys.contains(k);
        match item {
            Item::Vertex(node) => {
                let vertex = self.graph.node_weight(*node)?;
                for (key, values) in vertex.properties.iter().filter(|(k, _)| wanted(k)) {
                    let value = if unfold {
                        values.first().cloned().unwrap_or(Value::Null)
                    } else {
                        Value::Array(values.clone())
                    };
                    map.insert(key.clone(), value);
                }
            }
            Item::Edge(edge) => {
                let data = self.graph.edge_weight(*edge)?;
                for (key, value) in data.properties.iter().filter(|(k, _)| wanted(k)) {
                    map.insert(key.clone(), value.clone());
                }
            }
            _ => return None,
        }
        Some(map)
    }

    fn incident_edges(&self, item: &Item, direction: Direction, labels: &[String]) -> Vec<(EdgeIndex, NodeIndex)> {
        let Item::Vertex(node) = item else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for dir in petgraph_directions(direction) {
            for edge in self.graph.edges_directed(*node, *dir) {
                if !labels.is_empty() && !labels.contains(&edge.weight().label) {
                    continue;
                }
                let other = match dir {
                    petgraph::Direction::Outgoing => edge.target(),
                    petgraph::Direction::Incoming => edge.source(),
                };
                found.push((edge.id(), other));
            }
        }
        found.sort();
        found
    }

    fn modulate(&mut self, by: &By, traverser: &Traverser) -> Result<Option<Value>> {
        let value = match by {
            By::Identity => Some(self.render(&traverser.item)),
            By::Token(TokenKind::Id) => self.id_of(&traverser.item),
            By::Token(TokenKind::Label) => self.label_of(&traverser.item).map(|l| Value::String(l.to_string())),
            By::Token(TokenKind::Key) => match &traverser.item {
                Item::Property { key, .. } => Some(Value::String(key.clone())),
                _ => None,
            },
            By::Token(TokenKind::Value) => match &traverser.item {
                Item::Property { value, .. } => Some(value.clone()),
                _ => None,
            },
            By::Traversal(steps) => {
                let results = self.run(steps, vec![traverser.clone()])?;
                results.first().map(|t| self.render(&t.item))
            }
        };
        Ok(value)
    }
}
