//! Property graph modelling rules

use std::collections::BTreeMap;

use ontograph_core::{
    vertex_key, Edge, EdgeLabel, PropertyMap, SimpleOntologyPropertyGraph, Vertex, VertexLabel,
};
use tracing::{debug, info};

use crate::parsed::{ParsedAnnotationProperty, ParsedOntology};
use crate::standard::standard_annotation_properties;

/// Separator between object property IRIs on a parent class relationship
const OBJECT_PROPERTY_DELIMITER: char = '|';

/// Separator between resolved object property labels
const RELATIONSHIP_SEPARATOR: &str = " | ";

/// Lower camel case over space-separated words: `"Date Created"` -> `"dateCreated"`
pub fn lower_camel_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for (index, word) in label.split(' ').filter(|w| !w.is_empty()).enumerate() {
        let lower = word.to_lowercase();
        if index == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Local name after the last `#` of an IRI
fn iri_fragment(iri: &str) -> Option<&str> {
    iri.rsplit_once('#')
        .map(|(_, fragment)| fragment)
        .filter(|fragment| !fragment.trim().is_empty())
}

/// Builds property graphs from parsed ontologies
#[derive(Debug, Clone)]
pub struct PropertyGraphModeller {
    standard_annotations: BTreeMap<String, ParsedAnnotationProperty>,
}

impl Default for PropertyGraphModeller {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyGraphModeller {
    /// Modeller aware of the SKOS, RDFS and DCMI annotation properties
    pub fn new() -> Self {
        Self::with_standard_annotations(standard_annotation_properties())
    }

    pub fn with_standard_annotations(
        standard_annotations: BTreeMap<String, ParsedAnnotationProperty>,
    ) -> Self {
        Self {
            standard_annotations,
        }
    }

    /// Model one ontology at one webhook event
    pub fn model(
        &self,
        parsed: &ParsedOntology,
        ontology_id: i32,
        latest_webhook_event_id: i64,
    ) -> SimpleOntologyPropertyGraph {
        let mut graph = SimpleOntologyPropertyGraph::new(ontology_id, latest_webhook_event_id);

        let mut annotation_properties = parsed.annotation_properties.clone();
        annotation_properties.extend(
            self.standard_annotations
                .iter()
                .map(|(iri, property)| (iri.clone(), property.clone())),
        );

        self.add_vertices(&mut graph, parsed, &annotation_properties);
        self.add_class_edges(&mut graph, parsed);
        self.add_named_individual_edges(&mut graph, parsed);

        info!(
            ontology_id,
            vertices = graph.vertices.len(),
            edges = graph.edges.len(),
            "Ontology modelled as property graph"
        );
        graph
    }

    // ========================================================================
    // Vertices
    // ========================================================================

    fn add_vertices(
        &self,
        graph: &mut SimpleOntologyPropertyGraph,
        parsed: &ParsedOntology,
        annotation_properties: &BTreeMap<String, ParsedAnnotationProperty>,
    ) {
        let classes = parsed
            .classes
            .iter()
            .map(|(iri, class)| (iri, VertexLabel::Class, &class.annotations));
        let individuals = parsed
            .named_individuals
            .iter()
            .map(|(iri, individual)| (iri, VertexLabel::NamedIndividual, &individual.annotations));

        for (iri, label, annotations) in classes.chain(individuals) {
            let mut vertex = Vertex::new(iri.as_str(), graph.id, label, graph.latest_webhook_event_id);
            vertex.properties = resolve_annotations(annotations, annotation_properties);
            graph.add_vertex(vertex);
        }
    }

    // ========================================================================
    // Edges
    // ========================================================================

    fn add_class_edges(&self, graph: &mut SimpleOntologyPropertyGraph, parsed: &ParsedOntology) {
        for (iri, class) in &parsed.classes {
            let source_key = vertex_key(iri, graph.id);

            for (parent_iri, object_properties) in &class.parent_classes {
                let Some(target_key) = existing_key(graph, parent_iri) else {
                    debug!(class = %iri, parent = %parent_iri, "Parent class is not a vertex, skipping");
                    continue;
                };

                let mut edge = Edge::new(
                    &source_key,
                    target_key,
                    EdgeLabel::SubClassOf,
                    graph.id,
                    graph.latest_webhook_event_id,
                );
                if let Some(relationship) = object_properties
                    .as_deref()
                    .and_then(|iris| object_property_relationship(parsed, iris))
                {
                    edge = edge.with_relationship(relationship);
                }
                graph.add_edge(edge);
            }
        }
    }

    fn add_named_individual_edges(
        &self,
        graph: &mut SimpleOntologyPropertyGraph,
        parsed: &ParsedOntology,
    ) {
        for (iri, individual) in &parsed.named_individuals {
            let source_key = vertex_key(iri, graph.id);

            for class_iri in &individual.instance_of_class_iris {
                let Some(target_key) = existing_key(graph, class_iri) else {
                    debug!(individual = %iri, class = %class_iri, "Class is not a vertex, skipping");
                    continue;
                };
                graph.add_edge(Edge::new(
                    &source_key,
                    target_key,
                    EdgeLabel::InstanceOf,
                    graph.id,
                    graph.latest_webhook_event_id,
                ));
            }

            for (target_iri, object_property) in &individual.linked_named_individuals {
                let Some(target_key) = existing_key(graph, target_iri) else {
                    debug!(individual = %iri, target = %target_iri, "Linked individual is not a vertex, skipping");
                    continue;
                };

                let mut edge = Edge::new(
                    &source_key,
                    target_key,
                    EdgeLabel::LinkedNamedIndividual,
                    graph.id,
                    graph.latest_webhook_event_id,
                );
                let relationship = object_property.as_deref().and_then(|property| {
                    parsed
                        .object_property_label(property)
                        .or_else(|| iri_fragment(property))
                });
                if let Some(relationship) = relationship {
                    edge = edge.with_relationship(relationship);
                }
                graph.add_edge(edge);
            }
        }
    }
}

/// Key of the vertex for `iri` when it was modelled in this graph
fn existing_key(graph: &SimpleOntologyPropertyGraph, iri: &str) -> Option<String> {
    let key = vertex_key(iri, graph.id);
    graph.contains_vertex(&key).then_some(key)
}

/// Annotation values keyed by the camel-cased property label, else the IRI
fn resolve_annotations(
    annotations: &BTreeMap<String, serde_json::Value>,
    annotation_properties: &BTreeMap<String, ParsedAnnotationProperty>,
) -> PropertyMap {
    let mut properties = PropertyMap::new();
    for (iri, value) in annotations {
        let key = annotation_properties
            .get(iri)
            .and_then(|property| property.label.as_deref())
            .map(lower_camel_case)
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| iri.clone());
        properties.insert(key, value.clone());
    }
    properties
}

/// Object property labels (or IRIs) of a `|` delimited list
fn object_property_relationship(parsed: &ParsedOntology, iris: &str) -> Option<String> {
    let labels: Vec<&str> = iris
        .split(OBJECT_PROPERTY_DELIMITER)
        .map(str::trim)
        .filter(|iri| !iri.is_empty())
        .map(|iri| parsed.object_property_label(iri).unwrap_or(iri))
        .collect();

    if labels.is_empty() {
        None
    } else {
        Some(labels.join(RELATIONSHIP_SEPARATOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsed::{ParsedClass, ParsedNamedIndividual, ParsedObjectProperty};
    use serde_json::json;

    const EX: &str = "http://ex.org/zoo#";

    fn iri(name: &str) -> String {
        format!("{EX}{name}")
    }

    fn class(name: &str, parents: &[(&str, Option<&str>)]) -> ParsedClass {
        ParsedClass {
            iri: iri(name),
            parent_classes: parents
                .iter()
                .map(|(parent, props)| (iri(parent), props.map(str::to_string)))
                .collect(),
            ..ParsedClass::default()
        }
    }

    fn zoo() -> ParsedOntology {
        let mut parsed = ParsedOntology::default();
        for (name, label) in [("eats", "eats"), ("livesIn", "lives in")] {
            parsed.object_properties.insert(
                iri(name),
                ParsedObjectProperty {
                    iri: iri(name),
                    label: Some(label.to_string()),
                },
            );
        }

        let mut dog = class("Dog", &[("Animal", None)]);
        dog.annotations.insert(
            "http://www.w3.org/2004/02/skos/core#prefLabel".to_string(),
            json!("Dog"),
        );
        dog.annotations
            .insert("http://ex.org/custom#colour".to_string(), json!("brown"));

        let restriction = format!("{EX}eats | {EX}livesIn");
        let carnivore = class(
            "Carnivore",
            &[("Animal", Some(restriction.as_str())), ("Plant", None)],
        );

        for c in [class("Animal", &[]), dog, carnivore] {
            parsed.classes.insert(c.iri.clone(), c);
        }

        let rex = ParsedNamedIndividual {
            iri: iri("rex"),
            instance_of_class_iris: [iri("Dog"), iri("Unicorn")].into_iter().collect(),
            linked_named_individuals: [
                (iri("felix"), Some(iri("chases"))),
                (iri("fido"), Some(iri("eats"))),
                (iri("tom"), None),
            ]
            .into_iter()
            .collect(),
            ..ParsedNamedIndividual::default()
        };
        for name in ["felix", "fido", "tom"] {
            parsed.named_individuals.insert(
                iri(name),
                ParsedNamedIndividual {
                    iri: iri(name),
                    ..ParsedNamedIndividual::default()
                },
            );
        }
        parsed.named_individuals.insert(rex.iri.clone(), rex);
        parsed
    }

    fn edge<'a>(graph: &'a SimpleOntologyPropertyGraph, from: &str, to: &str) -> Option<&'a Edge> {
        graph.edges.iter().find(|e| {
            e.source_vertex_key == vertex_key(&iri(from), graph.id)
                && e.target_vertex_key == vertex_key(&iri(to), graph.id)
        })
    }

    #[test]
    fn test_lower_camel_case() {
        assert_eq!(lower_camel_case("preferred label"), "preferredLabel");
        assert_eq!(lower_camel_case("Date Created"), "dateCreated");
        assert_eq!(lower_camel_case("  ISBN   number "), "isbnNumber");
        assert_eq!(lower_camel_case("label"), "label");
        assert_eq!(lower_camel_case(""), "");
    }

    #[test]
    fn test_one_vertex_per_class_and_individual() {
        let graph = PropertyGraphModeller::new().model(&zoo(), 5, 100);

        assert_eq!(graph.vertices_with_label(VertexLabel::Class).len(), 3);
        assert_eq!(graph.vertices_with_label(VertexLabel::NamedIndividual).len(), 4);

        let dog = &graph.vertices[&vertex_key(&iri("Dog"), 5)];
        assert_eq!(dog.iri, iri("Dog"));
        assert_eq!(dog.ontology_id, 5);
        assert_eq!(dog.latest_webhook_event_id, 100);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_annotation_keys() {
        let graph = PropertyGraphModeller::new().model(&zoo(), 5, 100);
        let dog = &graph.vertices[&vertex_key(&iri("Dog"), 5)];

        assert_eq!(dog.properties["preferredLabel"], "Dog");
        assert_eq!(dog.properties["http://ex.org/custom#colour"], "brown");
    }

    #[test]
    fn test_ontology_annotation_properties_are_used() {
        let mut parsed = zoo();
        parsed.annotation_properties.insert(
            "http://ex.org/custom#colour".to_string(),
            ParsedAnnotationProperty::new("http://ex.org/custom#colour", "Fur Colour"),
        );

        let graph = PropertyGraphModeller::new().model(&parsed, 5, 100);
        let dog = &graph.vertices[&vertex_key(&iri("Dog"), 5)];
        assert_eq!(dog.properties["furColour"], "brown");
    }

    #[test]
    fn test_subclass_relationships() {
        let graph = PropertyGraphModeller::new().model(&zoo(), 5, 100);

        let plain = edge(&graph, "Dog", "Animal").unwrap();
        assert_eq!(plain.label, EdgeLabel::SubClassOf);
        assert_eq!(plain.relationship(), Some("subClassOf"));

        let restricted = edge(&graph, "Carnivore", "Animal").unwrap();
        assert_eq!(restricted.relationship(), Some("eats | lives in"));

        assert!(edge(&graph, "Carnivore", "Plant").is_none());
    }

    #[test]
    fn test_named_individual_relationships() {
        let graph = PropertyGraphModeller::new().model(&zoo(), 5, 100);

        let instance = edge(&graph, "rex", "Dog").unwrap();
        assert_eq!(instance.label, EdgeLabel::InstanceOf);
        assert!(edge(&graph, "rex", "Unicorn").is_none());

        assert_eq!(edge(&graph, "rex", "fido").unwrap().relationship(), Some("eats"));
        assert_eq!(edge(&graph, "rex", "felix").unwrap().relationship(), Some("chases"));

        let unnamed = edge(&graph, "rex", "tom").unwrap();
        assert_eq!(unnamed.label, EdgeLabel::LinkedNamedIndividual);
        assert_eq!(unnamed.relationship(), Some("Linked Named Individual"));
    }

    #[test]
    fn test_modelling_is_deterministic() {
        let modeller = PropertyGraphModeller::new();
        let first = modeller.model(&zoo(), 5, 100);
        let second = modeller.model(&zoo(), 5, 100);

        let keys = |g: &SimpleOntologyPropertyGraph| {
            g.vertices.values().map(|v| (v.key.clone(), v.vertex_id)).collect::<Vec<_>>()
        };
        let edges = |g: &SimpleOntologyPropertyGraph| {
            g.edges
                .iter()
                .map(|e| (e.source_vertex_key.clone(), e.target_vertex_key.clone(), e.label))
                .collect::<Vec<_>>()
        };

        assert_eq!(keys(&first), keys(&second));
        assert_eq!(edges(&first), edges(&second));
        assert_eq!(first.edges.len(), 6);
    }

    #[test]
    fn test_ontologies_do_not_share_keys() {
        let modeller = PropertyGraphModeller::new();
        let a = modeller.model(&zoo(), 1, 1);
        let b = modeller.model(&zoo(), 2, 1);

        assert!(a.vertices.keys().all(|key| !b.vertices.contains_key(key)));
    }
}
