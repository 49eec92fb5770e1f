//! GraphSON response normalization
//!
//! Gremlin Server answers in typed GraphSON (v2/v3 wrap values in
//! `{"@type", "@value"}`), Cosmos DB in untyped v1-style JSON. Both are
//! reduced to plain JSON rows with the same element shapes the embedded
//! engine produces.

use serde_json::{Map, Value};

/// Strip GraphSON typing from a value
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => normalize_object(map),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

/// Normalize a result payload into rows
pub fn into_rows(data: Value) -> Vec<Value> {
    match normalize(data) {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

fn normalize_object(mut map: Map<String, Value>) -> Value {
    let typed = match (map.get("@type"), map.contains_key("@value")) {
        (Some(Value::String(t)), true) => Some(t.clone()),
        _ => None,
    };

    let Some(type_name) = typed else {
        if map.get("type").and_then(Value::as_str) == Some("vertex") {
            return untyped_vertex(map);
        }
        return Value::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect());
    };

    let inner = map.remove("@value").unwrap_or(Value::Null);
    match type_name.as_str() {
        "g:List" | "g:Set" | "g:BulkSet" => normalize(inner),
        "g:Map" => typed_map(inner),
        "g:Vertex" => typed_vertex(inner),
        "g:Edge" => typed_edge(inner),
        "g:VertexProperty" => inner
            .get("value")
            .cloned()
            .map(normalize)
            .unwrap_or(Value::Null),
        "g:Property" => {
            let mut out = Map::new();
            if let Value::Object(mut p) = inner {
                out.insert("key".to_string(), p.remove("key").unwrap_or(Value::Null));
                out.insert(
                    "value".to_string(),
                    normalize(p.remove("value").unwrap_or(Value::Null)),
                );
            }
            Value::Object(out)
        }
        _ => normalize(inner),
    }
}

fn map_key(key: Value) -> String {
    match normalize(key) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn typed_map(inner: Value) -> Value {
    let mut out = Map::new();
    if let Value::Array(items) = inner {
        let mut iter = items.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            out.insert(map_key(k), normalize(v));
        }
    }
    Value::Object(out)
}

fn typed_vertex(inner: Value) -> Value {
    let Value::Object(mut v) = inner else {
        return Value::Null;
    };

    let mut properties = Map::new();
    if let Some(Value::Object(props)) = v.remove("properties") {
        for (key, values) in props {
            let values = match normalize(values) {
                Value::Array(items) => items,
                single => vec![single],
            };
            properties.insert(key, Value::Array(values));
        }
    }

    let mut out = Map::new();
    out.insert("id".to_string(), normalize(v.remove("id").unwrap_or(Value::Null)));
    out.insert("label".to_string(), v.remove("label").unwrap_or(Value::Null));
    out.insert("type".to_string(), Value::String("vertex".to_string()));
    out.insert("properties".to_string(), Value::Object(properties));
    Value::Object(out)
}

fn typed_edge(inner: Value) -> Value {
    let Value::Object(mut e) = inner else {
        return Value::Null;
    };

    let mut properties = Map::new();
    if let Some(Value::Object(props)) = e.remove("properties") {
        for (key, value) in props {
            let value = match normalize(value) {
                Value::Object(mut p) if p.contains_key("value") => {
                    p.remove("value").unwrap_or(Value::Null)
                }
                other => other,
            };
            properties.insert(key, value);
        }
    }

    let mut out = Map::new();
    out.insert("id".to_string(), normalize(e.remove("id").unwrap_or(Value::Null)));
    out.insert("label".to_string(), e.remove("label").unwrap_or(Value::Null));
    out.insert("type".to_string(), Value::String("edge".to_string()));
    out.insert("outV".to_string(), normalize(e.remove("outV").unwrap_or(Value::Null)));
    out.insert("inV".to_string(), normalize(e.remove("inV").unwrap_or(Value::Null)));
    out.insert("properties".to_string(), Value::Object(properties));
    Value::Object(out)
}

/// Untyped vertices list properties as `[{"id", "value"}]`
fn untyped_vertex(mut v: Map<String, Value>) -> Value {
    if let Some(Value::Object(props)) = v.remove("properties") {
        let flattened: Map<String, Value> = props
            .into_iter()
            .map(|(key, values)| {
                let values = match values {
                    Value::Array(items) => items
                        .into_iter()
                        .map(|item| match item {
                            Value::Object(mut p) if p.contains_key("value") => {
                                p.remove("value").unwrap_or(Value::Null)
                            }
                            other => other,
                        })
                        .collect(),
                    single => vec![single],
                };
                (key, Value::Array(values))
            })
            .collect();
        v.insert("properties".to_string(), Value::Object(flattened));
    }
    Value::Object(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars_and_lists() {
        let data = json!({"@type": "g:List", "@value": [{"@type": "g:Int64", "@value": 3}]});
        assert_eq!(into_rows(data), vec![json!(3)]);
    }

    #[test]
    fn test_typed_map_with_token_keys() {
        let data = json!({
            "@type": "g:Map",
            "@value": [
                {"@type": "g:T", "@value": "id"}, {"@type": "g:Int64", "@value": 12},
                "key", {"@type": "g:List", "@value": ["A_1"]}
            ]
        });
        assert_eq!(normalize(data), json!({"id": 12, "key": ["A_1"]}));
    }

    #[test]
    fn test_typed_vertex_and_edge() {
        let vertex = json!({
            "@type": "g:Vertex",
            "@value": {
                "id": {"@type": "g:Int64", "@value": 1},
                "label": "class",
                "properties": {
                    "iri": [{"@type": "g:VertexProperty", "@value": {"id": 5, "value": "http://x#A", "label": "iri"}}]
                }
            }
        });
        assert_eq!(
            normalize(vertex),
            json!({"id": 1, "label": "class", "type": "vertex", "properties": {"iri": ["http://x#A"]}})
        );

        let edge = json!({
            "@type": "g:Edge",
            "@value": {
                "id": {"@type": "g:Int64", "@value": 9},
                "label": "subClassOf",
                "outV": {"@type": "g:Int64", "@value": 1},
                "inV": {"@type": "g:Int64", "@value": 2},
                "properties": {
                    "relationship": {"@type": "g:Property", "@value": {"key": "relationship", "value": "subClassOf"}}
                }
            }
        });
        let edge = normalize(edge);
        assert_eq!(edge["outV"], 1);
        assert_eq!(edge["inV"], 2);
        assert_eq!(edge["properties"]["relationship"], "subClassOf");
    }

    #[test]
    fn test_untyped_vertex() {
        let vertex = json!({
            "id": "abc",
            "label": "class",
            "type": "vertex",
            "properties": {"key": [{"id": "p1", "value": "A_1"}]}
        });
        assert_eq!(normalize(vertex)["properties"]["key"], json!(["A_1"]));
    }

    #[test]
    fn test_null_payload_is_empty() {
        assert!(into_rows(Value::Null).is_empty());
    }
}
