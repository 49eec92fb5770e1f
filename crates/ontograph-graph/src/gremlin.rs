//! Gremlin query builder
//!
//! Pure functions that turn domain parameters and a capability profile into
//! Gremlin query text. Every literal goes through [`quote`] or
//! [`resolve_value`]; nothing here performs I/O.

use ontograph_core::{keys, ElementId, PropertyMap};
use serde_json::Value;

use crate::Capabilities;

/// Alias written in place of a `label` property
pub const LABEL_ALIAS: &str = "rdfsLabel";

/// Alias written in place of an `id` property
pub const ID_ALIAS: &str = "identifier";

/// Separator used when a collection is flattened into one edge property
pub const EDGE_VALUE_SEPARATOR: &str = " | ";

// ============================================================================
// Literals
// ============================================================================

/// Render a single-quoted string literal.
///
/// Backslashes and quotes are escaped, control characters are written as
/// escape sequences so a value can never terminate the literal or the query.
pub fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render any JSON value as a Gremlin literal
pub fn resolve_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                format!("{}d", n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => quote(s),
        nested => quote(&nested.to_string()),
    }
}

/// Render an element ID. Numeric IDs stay numeric only when the backend
/// accepts non-string IDs.
pub fn resolve_id_literal(id: &ElementId, supports_non_string_ids: bool) -> String {
    match id {
        ElementId::Numeric(n) if supports_non_string_ids => n.to_string(),
        ElementId::Numeric(n) => quote(&n.to_string()),
        ElementId::Text(s) => quote(s),
    }
}

/// `g.V(<id>)`
pub fn resolve_vertex_id(id: &ElementId, supports_non_string_ids: bool) -> String {
    format!("g.V({})", resolve_id_literal(id, supports_non_string_ids))
}

/// `g.E(<id>)`
pub fn resolve_edge_id(id: &ElementId, supports_non_string_ids: bool) -> String {
    format!("g.E({})", resolve_id_literal(id, supports_non_string_ids))
}

/// Substitute reserved meta-property names
pub fn safe_property_key(key: &str) -> &str {
    if key.eq_ignore_ascii_case("label") {
        LABEL_ALIAS
    } else if key.eq_ignore_ascii_case("id") {
        ID_ALIAS
    } else {
        key
    }
}

fn push_vertex_properties(query: &mut String, properties: &PropertyMap) {
    for (key, value) in properties {
        let key = quote(safe_property_key(key));
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|v| !v.is_null()) {
                    query.push_str(&format!(".property(list, {key}, {})", resolve_value(item)));
                }
            }
            other => query.push_str(&format!(".property({key}, {})", resolve_value(other))),
        }
    }
}

/// Update clauses. A collection replaces every existing value of its key.
fn push_vertex_updates(query: &mut String, properties: &PropertyMap) {
    for (key, value) in properties {
        let Value::Array(items) = value else {
            continue;
        };
        let key = quote(safe_property_key(key));
        query.push_str(&format!(".sideEffect(properties({key}).drop())"));
        for item in items.iter().filter(|v| !v.is_null()) {
            query.push_str(&format!(".property(list, {key}, {})", resolve_value(item)));
        }
    }
    let scalars: PropertyMap = properties
        .iter()
        .filter(|(_, v)| !v.is_array())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    push_vertex_properties(query, &scalars);
}

fn push_edge_properties(query: &mut String, properties: &PropertyMap) {
    for (key, value) in properties {
        let key = quote(safe_property_key(key));
        match value {
            Value::Null => {}
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(EDGE_VALUE_SEPARATOR);
                query.push_str(&format!(".property({key}, {})", quote(&joined)));
            }
            other => query.push_str(&format!(".property({key}, {})", resolve_value(other))),
        }
    }
}

fn push_iterate(query: &mut String, iterate: bool) {
    if iterate {
        query.push_str(".iterate()");
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Label and property-equality filter for read and delete queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub label: Option<String>,
    pub properties: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything tagged with one ontology
    pub fn ontology(ontology_id: i32) -> Self {
        Self::new().with_property(keys::ONTOLOGY_ID, ontology_id)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    fn render(&self) -> String {
        let mut out = String::new();
        if let Some(label) = &self.label {
            out.push_str(&format!(".hasLabel({})", quote(label)));
        }
        for (key, value) in &self.properties {
            out.push_str(&format!(".has({}, {})", quote(safe_property_key(key)), resolve_value(value)));
        }
        out
    }
}

/// Edge direction relative to a vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    fn edge_step(&self) -> &'static str {
        match self {
            Self::Out => "outE()",
            Self::In => "inE()",
            Self::Both => "bothE()",
        }
    }
}

/// One end of an edge: an optional backend ID plus the stable key
#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'a> {
    pub id: Option<&'a ElementId>,
    pub key: &'a str,
}

impl<'a> Endpoint<'a> {
    pub fn new(id: Option<&'a ElementId>, key: &'a str) -> Self {
        Self { id, key }
    }
}

// ============================================================================
// Writes
// ============================================================================

/// Vertex creation. The ID clause is emitted only for backends that accept
/// client-assigned IDs.
pub fn add_vertex(
    label: &str,
    id: Option<&ElementId>,
    properties: &PropertyMap,
    caps: &Capabilities,
    iterate: bool,
) -> String {
    let mut query = format!("g.addV({})", quote(label));

    if caps.supports_user_defined_ids {
        if let Some(id) = id {
            if caps.supports_non_string_ids {
                query.push_str(&format!(".property(id, {})", resolve_id_literal(id, true)));
            } else {
                query.push_str(&format!(".property('id', {})", resolve_id_literal(id, false)));
            }
        }
    }

    push_vertex_properties(&mut query, properties);
    push_iterate(&mut query, iterate);
    query
}

/// Edge creation from `source` into `target`.
///
/// Endpoints are addressed by ID when the backend honours client IDs and both
/// IDs are known, otherwise by their stable `key` property.
pub fn add_edge(
    source: &Endpoint<'_>,
    target: &Endpoint<'_>,
    label: &str,
    properties: &PropertyMap,
    caps: &Capabilities,
    iterate: bool,
) -> String {
    let mut query = match (caps.supports_user_defined_ids, source.id, target.id) {
        (true, Some(source_id), Some(target_id)) => format!(
            "g.V({}).as('a').V({})",
            resolve_id_literal(source_id, caps.supports_non_string_ids),
            resolve_id_literal(target_id, caps.supports_non_string_ids)
        ),
        _ => format!(
            "g.V().has({key}, {}).as('a').V().has({key}, {})",
            quote(source.key),
            quote(target.key),
            key = quote(keys::KEY)
        ),
    };

    query.push_str(&format!(".addE({}).from('a')", quote(label)));
    push_edge_properties(&mut query, properties);
    push_iterate(&mut query, iterate);
    query
}

pub fn update_vertex(id: &ElementId, key: &str, value: &Value, caps: &Capabilities) -> String {
    let mut properties = PropertyMap::new();
    properties.insert(key.to_string(), value.clone());
    update_vertex_properties(id, &properties, caps)
}

pub fn update_vertex_properties(id: &ElementId, properties: &PropertyMap, caps: &Capabilities) -> String {
    let mut query = resolve_vertex_id(id, caps.supports_non_string_ids);
    push_vertex_updates(&mut query, properties);
    query
}

pub fn update_edge(id: &ElementId, key: &str, value: &Value, caps: &Capabilities) -> String {
    let mut properties = PropertyMap::new();
    properties.insert(key.to_string(), value.clone());
    update_edge_properties(id, &properties, caps)
}

pub fn update_edge_properties(id: &ElementId, properties: &PropertyMap, caps: &Capabilities) -> String {
    let mut query = resolve_edge_id(id, caps.supports_non_string_ids);
    push_edge_properties(&mut query, properties);
    query
}

/// Drop matching vertices, at most `limit` per submission when capped
pub fn delete_vertices(filter: &Filter, limit: Option<usize>, iterate: bool) -> String {
    let mut query = format!("g.V(){}", filter.render());
    if let Some(limit) = limit {
        query.push_str(&format!(".limit({limit})"));
    }
    query.push_str(".drop()");
    push_iterate(&mut query, iterate);
    query
}

/// Drop matching edges, at most `limit` per submission when capped
pub fn delete_edges(filter: &Filter, limit: Option<usize>, iterate: bool) -> String {
    let mut query = format!("g.E(){}", filter.render());
    if let Some(limit) = limit {
        query.push_str(&format!(".limit({limit})"));
    }
    query.push_str(".drop()");
    push_iterate(&mut query, iterate);
    query
}

pub fn delete_vertex(id: &ElementId, caps: &Capabilities, iterate: bool) -> String {
    let mut query = format!("{}.drop()", resolve_vertex_id(id, caps.supports_non_string_ids));
    push_iterate(&mut query, iterate);
    query
}

pub fn delete_edge(id: &ElementId, caps: &Capabilities, iterate: bool) -> String {
    let mut query = format!("{}.drop()", resolve_edge_id(id, caps.supports_non_string_ids));
    push_iterate(&mut query, iterate);
    query
}

pub fn count_vertices(filter: &Filter) -> String {
    format!("g.V(){}.count()", filter.render())
}

pub fn count_edges(filter: &Filter) -> String {
    format!("g.E(){}.count()", filter.render())
}

/// Export the whole graph in Gryo format to a server-side path
pub fn write_graph(path: &str) -> String {
    format!("g.io({}).with(IO.writer, IO.gryo).write().iterate()", quote(path))
}

pub fn commit() -> String {
    "g.tx().commit()".to_string()
}

pub fn rollback() -> String {
    "g.tx().rollback()".to_string()
}

// ============================================================================
// Reads
// ============================================================================

fn vertex_projection(caps: &Capabilities) -> &'static str {
    if caps.supports_traversals_by {
        ".valueMap(true).by(unfold())"
    } else {
        ".valueMap(true)"
    }
}

fn edge_projection(caps: &Capabilities) -> &'static str {
    if caps.supports_traversals_by {
        ".project('id', 'label', 'outV', 'inV', 'properties')\
         .by(id).by(label).by(outV().id()).by(inV().id()).by(valueMap())"
    } else {
        ""
    }
}

pub fn get_vertices(filter: &Filter, caps: &Capabilities) -> String {
    format!("g.V(){}{}", filter.render(), vertex_projection(caps))
}

pub fn get_vertex(id: &ElementId, caps: &Capabilities) -> String {
    format!(
        "{}{}",
        resolve_vertex_id(id, caps.supports_non_string_ids),
        vertex_projection(caps)
    )
}

pub fn get_vertex_edges(id: &ElementId, direction: Direction, caps: &Capabilities) -> String {
    format!(
        "{}.{}{}",
        resolve_vertex_id(id, caps.supports_non_string_ids),
        direction.edge_step(),
        edge_projection(caps)
    )
}

pub fn get_edges(filter: &Filter, caps: &Capabilities) -> String {
    format!("g.E(){}{}", filter.render(), edge_projection(caps))
}

pub fn get_edge(id: &ElementId, caps: &Capabilities) -> String {
    format!(
        "{}{}",
        resolve_edge_id(id, caps.supports_non_string_ids),
        edge_projection(caps)
    )
}

pub fn get_ontology_vertex_by_iri(ontology_id: i32, iri: &str, caps: &Capabilities) -> String {
    let filter = Filter::ontology(ontology_id).with_property(keys::IRI, iri);
    get_vertices(&filter, caps)
}

pub fn get_ontology_vertex_by_key(key: &str, caps: &Capabilities) -> String {
    let filter = Filter::new().with_property(keys::KEY, key);
    get_vertices(&filter, caps)
}

/// Distinct property keys across all vertices
pub fn get_vertices_property_keys() -> String {
    "g.V().properties().key().dedup()".to_string()
}

/// Distinct values of one vertex property
pub fn get_vertices_property_values(key: &str) -> String {
    format!("g.V().values({}).dedup()", quote(safe_property_key(key)))
}

/// Backend ID and stable key of every vertex in an ontology
pub fn get_vertex_keys(ontology_id: i32, caps: &Capabilities) -> String {
    let filter = Filter::ontology(ontology_id).render();
    if caps.supports_traversals_by {
        format!(
            "g.V(){filter}.project('id', 'key').by(id).by(values({}))",
            quote(keys::KEY)
        )
    } else {
        format!("g.V(){filter}.valueMap(true, {})", quote(keys::KEY))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> PropertyMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), r"'it\'s'");
        assert_eq!(quote("a\\b"), r"'a\\b'");
        assert_eq!(quote("line\nbreak\ttab"), r"'line\nbreak\ttab'");
        assert_eq!(quote("bell\u{7}"), r"'bell\u0007'");
        assert_eq!(quote("say \"hi\""), "'say \"hi\"'");
    }

    #[test]
    fn test_resolve_value() {
        assert_eq!(resolve_value(&json!("x")), "'x'");
        assert_eq!(resolve_value(&json!(42)), "42");
        assert_eq!(resolve_value(&json!(-3)), "-3");
        assert_eq!(resolve_value(&json!(1.5)), "1.5d");
        assert_eq!(resolve_value(&json!(true)), "true");
        assert_eq!(resolve_value(&json!({"a": 1})), r#"'{"a":1}'"#);
    }

    #[test]
    fn test_id_literal_rendering() {
        let id = ElementId::Numeric(7);
        assert_eq!(resolve_id_literal(&id, true), "7");
        assert_eq!(resolve_id_literal(&id, false), "'7'");
        assert_eq!(resolve_vertex_id(&id, true), "g.V(7)");
        assert_eq!(resolve_vertex_id(&id, false), "g.V('7')");
        assert_eq!(resolve_edge_id(&ElementId::from("e-1"), true), "g.E('e-1')");
    }

    #[test]
    fn test_add_vertex_id_clause_follows_capabilities() {
        let id = ElementId::Numeric(42);
        let properties = props(json!({"a": "b"}));

        let with_ids = add_vertex("class", Some(&id), &properties, &Capabilities::TINKERGRAPH, false);
        assert_eq!(with_ids, "g.addV('class').property(id, 42).property('a', 'b')");

        let string_ids = add_vertex("class", Some(&id), &properties, &Capabilities::COSMOSDB, false);
        assert_eq!(string_ids, "g.addV('class').property('id', '42').property('a', 'b')");

        let no_ids = add_vertex("class", Some(&id), &properties, &Capabilities::JANUSGRAPH, false);
        assert_eq!(no_ids, "g.addV('class').property('a', 'b')");
        assert!(!no_ids.contains("42"));
    }

    #[test]
    fn test_add_vertex_aliases_reserved_keys() {
        let properties = props(json!({"label": "Dog", "ID": "x1", "Label": "Hund"}));
        let query = add_vertex("class", None, &properties, &Capabilities::JANUSGRAPH, false);

        assert!(query.starts_with("g.addV('class')"));
        assert!(query.contains(".property('rdfsLabel', 'Dog')"));
        assert!(query.contains(".property('rdfsLabel', 'Hund')"));
        assert!(query.contains(".property('identifier', 'x1')"));
        assert!(!query.contains("'label'"));
    }

    #[test]
    fn test_add_vertex_collections_and_nulls() {
        let properties = props(json!({"synonym": ["a", "b"], "comment": null, "rank": 2}));
        let query = add_vertex("class", None, &properties, &Capabilities::JANUSGRAPH, true);

        assert_eq!(
            query,
            "g.addV('class').property(list, 'synonym', 'a').property(list, 'synonym', 'b')\
             .property('rank', 2).iterate()"
        );
    }

    #[test]
    fn test_add_edge_by_id_and_by_key() {
        let source_id = ElementId::Numeric(1);
        let target_id = ElementId::Numeric(2);
        let source = Endpoint::new(Some(&source_id), "A_1");
        let target = Endpoint::new(Some(&target_id), "B_1");
        let properties = props(json!({"relationship": "subClassOf"}));

        let by_id = add_edge(&source, &target, "subClassOf", &properties, &Capabilities::TINKERGRAPH, false);
        assert_eq!(
            by_id,
            "g.V(1).as('a').V(2).addE('subClassOf').from('a').property('relationship', 'subClassOf')"
        );

        let by_key = add_edge(&source, &target, "subClassOf", &properties, &Capabilities::JANUSGRAPH, false);
        assert_eq!(
            by_key,
            "g.V().has('key', 'A_1').as('a').V().has('key', 'B_1').addE('subClassOf').from('a')\
             .property('relationship', 'subClassOf')"
        );

        let unresolved = Endpoint::new(None, "A_1");
        let fallback = add_edge(&unresolved, &target, "x", &PropertyMap::new(), &Capabilities::TINKERGRAPH, false);
        assert!(fallback.starts_with("g.V().has('key', 'A_1')"));
    }

    #[test]
    fn test_edge_collections_are_joined() {
        let source = Endpoint::new(None, "A_1");
        let target = Endpoint::new(None, "B_1");
        let properties = props(json!({"relationship": ["partOf", "hasPart"]}));

        let query = add_edge(&source, &target, "subClassOf", &properties, &Capabilities::COSMOSDB, false);
        assert!(query.ends_with(".property('relationship', 'partOf | hasPart')"));
    }

    #[test]
    fn test_delete_and_count() {
        let filter = Filter::ontology(5);
        assert_eq!(delete_vertices(&filter, None, true), "g.V().has('ontologyId', 5).drop().iterate()");
        assert_eq!(
            delete_edges(&filter, Some(1000), false),
            "g.E().has('ontologyId', 5).limit(1000).drop()"
        );
        assert_eq!(count_vertices(&filter), "g.V().has('ontologyId', 5).count()");
        assert_eq!(
            write_graph("/data/o'graph.kryo"),
            r"g.io('/data/o\'graph.kryo').with(IO.writer, IO.gryo).write().iterate()"
        );
        assert_eq!(
            delete_vertex(&ElementId::Numeric(3), &Capabilities::COSMOSDB, false),
            "g.V('3').drop()"
        );
    }

    #[test]
    fn test_updates() {
        let id = ElementId::Numeric(9);
        assert_eq!(
            update_vertex(&id, "label", &json!("New"), &Capabilities::JANUSGRAPH),
            "g.V(9).property('rdfsLabel', 'New')"
        );
        assert_eq!(
            update_edge(&id, "weight", &json!(0.5), &Capabilities::COSMOSDB),
            "g.E('9').property('weight', 0.5d)"
        );
    }

    #[test]
    fn test_collection_update_drops_previous_values() {
        let id = ElementId::Numeric(9);
        assert_eq!(
            update_vertex(&id, "synonym", &json!(["x", "y"]), &Capabilities::TINKERGRAPH),
            "g.V(9).sideEffect(properties('synonym').drop())\
             .property(list, 'synonym', 'x').property(list, 'synonym', 'y')"
        );
        assert_eq!(
            update_vertex(&id, "Label", &json!([]), &Capabilities::TINKERGRAPH),
            "g.V(9).sideEffect(properties('rdfsLabel').drop())"
        );

        let properties = props(json!({"rank": 3, "synonym": ["x"]}));
        assert_eq!(
            update_vertex_properties(&id, &properties, &Capabilities::JANUSGRAPH),
            "g.V(9).sideEffect(properties('synonym').drop()).property(list, 'synonym', 'x')\
             .property('rank', 3)"
        );
    }

    #[test]
    fn test_filters_alias_reserved_keys() {
        let filter = Filter::ontology(2).with_property("label", "Dog").with_property("ID", "x1");
        assert_eq!(
            count_vertices(&filter),
            "g.V().has('ontologyId', 2).has('rdfsLabel', 'Dog').has('identifier', 'x1').count()"
        );
        assert_eq!(get_vertices_property_values("Label"), "g.V().values('rdfsLabel').dedup()");
    }

    #[test]
    fn test_reads_follow_traversals_by() {
        let filter = Filter::new().with_label("class");
        assert_eq!(
            get_vertices(&filter, &Capabilities::TINKERGRAPH),
            "g.V().hasLabel('class').valueMap(true).by(unfold())"
        );
        assert_eq!(
            get_vertices(&filter, &Capabilities::COSMOSDB),
            "g.V().hasLabel('class').valueMap(true)"
        );
        assert!(get_edges(&Filter::new(), &Capabilities::JANUSGRAPH).contains(".by(outV().id())"));
        assert_eq!(get_edges(&Filter::new(), &Capabilities::COSMOSDB), "g.E()");
        assert_eq!(
            get_vertex_edges(&ElementId::Numeric(1), Direction::Out, &Capabilities::COSMOSDB),
            "g.V('1').outE()"
        );
        assert_eq!(
            get_vertex_keys(4, &Capabilities::TINKERGRAPH),
            "g.V().has('ontologyId', 4).project('id', 'key').by(id).by(values('key'))"
        );
        assert_eq!(
            get_vertex_keys(4, &Capabilities::COSMOSDB),
            "g.V().has('ontologyId', 4).valueMap(true, 'key')"
        );
    }
}
