//! Every rendered literal must parse back to the value it was built from

use ontograph_core::{ElementId, PropertyMap};
use ontograph_graph::gremlin::{self, quote};
use ontograph_graph::{Capabilities, TinkerGraph};
use proptest::prelude::*;
use serde_json::{json, Value};

fn round_trip(key: &str, value: Value) -> Vec<Value> {
    let mut graph = TinkerGraph::new();
    let mut properties = PropertyMap::new();
    properties.insert(key.to_string(), value);

    let insert = gremlin::add_vertex(
        "class",
        Some(&ElementId::Numeric(1)),
        &properties,
        &Capabilities::TINKERGRAPH,
        true,
    );
    graph.execute(&insert).unwrap();
    graph
        .execute(&format!("g.V(1).values({})", quote(gremlin::safe_property_key(key))))
        .unwrap()
}

proptest! {
    #[test]
    fn string_values_survive_quoting(value in any::<String>()) {
        let rows = round_trip("note", Value::String(value.clone()));
        prop_assert_eq!(rows, vec![Value::String(value)]);
    }

    #[test]
    fn hostile_values_survive_quoting(value in "[a-z'\"\\\\$\n\r\t ).;]{0,40}") {
        let rows = round_trip("note", Value::String(value.clone()));
        prop_assert_eq!(rows, vec![Value::String(value)]);
    }

    #[test]
    fn property_keys_survive_quoting(key in "[A-Za-z'\\\\ .()]{1,20}") {
        prop_assume!(!key.eq_ignore_ascii_case("id") && !key.eq_ignore_ascii_case("label"));
        let rows = round_trip(&key, json!("v"));
        prop_assert_eq!(rows, vec![json!("v")]);
    }

    #[test]
    fn integers_survive_rendering(value in any::<i64>()) {
        let rows = round_trip("n", json!(value));
        prop_assert_eq!(rows, vec![json!(value)]);
    }
}

#[test]
fn injection_attempt_stays_a_literal() {
    let attack = "x').drop();g.V().drop();g.V().has('a";
    let rows = round_trip("note", json!(attack));
    assert_eq!(rows, vec![json!(attack)]);
}

#[test]
fn collections_become_multi_valued_properties() {
    let rows = round_trip("synonyms", json!(["a", "b'c", null, "d"]));
    assert_eq!(rows, vec![json!("a"), json!("b'c"), json!("d")]);
}

#[test]
fn floats_and_nested_values() {
    assert_eq!(round_trip("weight", json!(0.25)), vec![json!(0.25)]);
    assert_eq!(
        round_trip("meta", json!({"lang": "en"})),
        vec![json!("{\"lang\":\"en\"}")]
    );
}
