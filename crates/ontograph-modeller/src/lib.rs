//! Ontograph Modeller - Parsed ontology to property graph
//!
//! Turns the parser's JSON view of an OWL ontology into a
//! [`SimpleOntologyPropertyGraph`](ontograph_core::SimpleOntologyPropertyGraph):
//! classes and named individuals become vertices, subclass, instance-of and
//! individual links become directed edges.
//!
//! Author: hephaex@gmail.com

pub mod model;
pub mod parsed;
pub mod stage;
pub mod standard;

pub use model::{lower_camel_case, PropertyGraphModeller};
pub use parsed::{
    ParsedAnnotationProperty, ParsedClass, ParsedNamedIndividual, ParsedObjectProperty,
    ParsedOntology,
};
pub use stage::ModellerStage;
pub use standard::standard_annotation_properties;
