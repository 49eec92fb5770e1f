//! Parsed ontology input
//!
//! The JSON document the OWL parser writes into the `parsed` container.
//! All maps are keyed by IRI and iterate in IRI order.

use std::collections::{BTreeMap, BTreeSet};

use ontograph_core::{OntographError, Result};
use serde::{Deserialize, Serialize};

/// An OWL annotation property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAnnotationProperty {
    pub iri: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl ParsedAnnotationProperty {
    pub fn new(iri: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            iri: iri.into(),
            label: Some(label.into()),
        }
    }
}

/// An OWL object property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedObjectProperty {
    pub iri: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// An OWL class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedClass {
    pub iri: String,

    #[serde(default)]
    pub label: Option<String>,

    /// Annotation property IRI -> value
    #[serde(default)]
    pub annotations: BTreeMap<String, serde_json::Value>,

    /// Parent class IRI -> object property IRIs restricting the relationship,
    /// `|` delimited
    #[serde(default)]
    pub parent_classes: BTreeMap<String, Option<String>>,
}

/// An OWL named individual
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedNamedIndividual {
    pub iri: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub instance_of_class_iris: BTreeSet<String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, serde_json::Value>,

    /// Target individual IRI -> linking object property IRI
    #[serde(default)]
    pub linked_named_individuals: BTreeMap<String, Option<String>>,
}

/// Parser output for one ontology
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedOntology {
    #[serde(default, alias = "simpleAnnotationPropertyMap")]
    pub annotation_properties: BTreeMap<String, ParsedAnnotationProperty>,

    #[serde(default, alias = "simpleObjectPropertyMap")]
    pub object_properties: BTreeMap<String, ParsedObjectProperty>,

    #[serde(default, alias = "simpleClassMap")]
    pub classes: BTreeMap<String, ParsedClass>,

    #[serde(default, alias = "simpleNamedIndividualMap")]
    pub named_individuals: BTreeMap<String, ParsedNamedIndividual>,
}

impl ParsedOntology {
    /// Parse the parser's JSON document
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| OntographError::InvalidGraph(format!("Malformed parsed ontology: {e}")))
    }

    /// Label of an object property, if declared and non-blank
    pub fn object_property_label(&self, iri: &str) -> Option<&str> {
        self.object_properties
            .get(iri)
            .and_then(|p| p.label.as_deref())
            .filter(|label| !label.trim().is_empty())
    }
}
