//! Standard-schema annotation properties
//!
//! SKOS, RDF Schema and Dublin Core annotation properties with their
//! published labels, merged in that order.

use std::collections::BTreeMap;

use crate::parsed::ParsedAnnotationProperty;

const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";
const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
const DCTERMS: &str = "http://purl.org/dc/terms/";
const DC: &str = "http://purl.org/dc/elements/1.1/";

const SKOS_PROPERTIES: &[(&str, &str)] = &[
    ("prefLabel", "preferred label"),
    ("altLabel", "alternative label"),
    ("hiddenLabel", "hidden label"),
    ("notation", "notation"),
    ("note", "note"),
    ("changeNote", "change note"),
    ("definition", "definition"),
    ("editorialNote", "editorial note"),
    ("example", "example"),
    ("historyNote", "history note"),
    ("scopeNote", "scope note"),
];

const RDFS_PROPERTIES: &[(&str, &str)] = &[
    ("label", "label"),
    ("comment", "comment"),
    ("seeAlso", "see also"),
    ("isDefinedBy", "is defined by"),
];

const DCMI_PROPERTIES: &[(&str, &str)] = &[
    ("title", "Title"),
    ("creator", "Creator"),
    ("subject", "Subject"),
    ("description", "Description"),
    ("publisher", "Publisher"),
    ("contributor", "Contributor"),
    ("date", "Date"),
    ("type", "Type"),
    ("format", "Format"),
    ("identifier", "Identifier"),
    ("source", "Source"),
    ("language", "Language"),
    ("relation", "Relation"),
    ("coverage", "Coverage"),
    ("rights", "Rights"),
    ("created", "Date Created"),
    ("modified", "Date Modified"),
    ("license", "License"),
];

/// Annotation properties every ontology may use without declaring them
pub fn standard_annotation_properties() -> BTreeMap<String, ParsedAnnotationProperty> {
    let mut properties = BTreeMap::new();

    let vocabularies = [
        (SKOS, SKOS_PROPERTIES),
        (RDFS, RDFS_PROPERTIES),
        (DC, &DCMI_PROPERTIES[..15]),
        (DCTERMS, DCMI_PROPERTIES),
    ];
    for (namespace, entries) in vocabularies {
        for (local_name, label) in entries {
            let iri = format!("{namespace}{local_name}");
            properties.insert(iri.clone(), ParsedAnnotationProperty::new(iri, *label));
        }
    }

    properties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_each_vocabulary() {
        let properties = standard_annotation_properties();

        let pref = &properties["http://www.w3.org/2004/02/skos/core#prefLabel"];
        assert_eq!(pref.label.as_deref(), Some("preferred label"));
        assert!(properties.contains_key("http://www.w3.org/2000/01/rdf-schema#comment"));
        assert!(properties.contains_key("http://purl.org/dc/terms/modified"));
        assert!(properties.contains_key("http://purl.org/dc/elements/1.1/title"));
        assert!(!properties.contains_key("http://purl.org/dc/elements/1.1/modified"));
    }

    #[test]
    fn test_every_entry_is_keyed_by_its_iri() {
        for (iri, property) in standard_annotation_properties() {
            assert_eq!(iri, property.iri);
        }
    }
}
