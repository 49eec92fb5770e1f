//! Modeller stage against filesystem storage and in-process messaging

use std::sync::Arc;

use ontograph_core::{
    ChannelPublisher, LocalObjectStorage, MessagingConfig, OntologyMessage, SimpleOntologyPropertyGraph,
    StorageConfig,
};
use ontograph_modeller::ModellerStage;
use tempfile::TempDir;

const PARSED: &str = r#"{
    "annotationProperties": {},
    "objectProperties": {},
    "classes": {
        "http://ex.org/zoo#Animal": {"iri": "http://ex.org/zoo#Animal"},
        "http://ex.org/zoo#Dog": {
            "iri": "http://ex.org/zoo#Dog",
            "annotations": {"http://www.w3.org/2000/01/rdf-schema#label": "Dog"},
            "parentClasses": {"http://ex.org/zoo#Animal": null}
        }
    },
    "namedIndividuals": {
        "http://ex.org/zoo#rex": {
            "iri": "http://ex.org/zoo#rex",
            "instanceOfClassIris": ["http://ex.org/zoo#Dog"]
        }
    }
}"#;

struct Fixture {
    _dir: TempDir,
    storage: Arc<LocalObjectStorage>,
    publisher: Arc<ChannelPublisher>,
    stage: ModellerStage,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let storage_config = StorageConfig {
        root: dir.path().join("storage"),
        working_dir: dir.path().join("work"),
        ..StorageConfig::default()
    };
    let storage = Arc::new(LocalObjectStorage::from_config(&storage_config));
    let publisher = Arc::new(ChannelPublisher::new(8));
    let stage = ModellerStage::new(
        storage.clone(),
        publisher.clone(),
        storage_config,
        MessagingConfig::default(),
    );

    Fixture {
        _dir: dir,
        storage,
        publisher,
        stage,
    }
}

#[tokio::test]
async fn test_models_persists_and_publishes() {
    let fx = fixture();
    let mut modelled = fx.publisher.subscribe("modelled").unwrap();
    fx.storage
        .put_object("parsed", "zoo-12.json", PARSED.as_bytes())
        .await
        .unwrap();

    let message = OntologyMessage::new(12, 340, "zoo-12");
    let graph = fx.stage.handle(&message).await.unwrap();

    assert_eq!(graph.vertices.len(), 3);
    assert_eq!(graph.edges.len(), 2);

    let bytes = fx.storage.get_object("modelled", "zoo-12.json").await.unwrap();
    let persisted = SimpleOntologyPropertyGraph::from_slice(&bytes).unwrap();
    assert_eq!(persisted, graph);
    assert_eq!(
        persisted.vertices["http://ex.org/zoo#Dog_12"].properties["label"],
        "Dog"
    );

    assert_eq!(modelled.recv().await.unwrap(), message);
}

#[tokio::test]
async fn test_missing_parsed_artifact_is_modeller_error() {
    let fx = fixture();

    let err = fx
        .stage
        .handle(&OntologyMessage::new(1, 1, "absent"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "modeller-graph");
    assert!(err.to_string().contains("absent.json"));
}

#[tokio::test]
async fn test_malformed_parsed_artifact_is_modeller_error() {
    let fx = fixture();
    fx.storage
        .put_object("parsed", "broken.json", b"{\"classes\": 7}")
        .await
        .unwrap();

    let err = fx
        .stage
        .handle(&OntologyMessage::new(1, 1, "broken"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "modeller-graph");
    assert!(fx.storage.get_object("modelled", "broken.json").await.is_err());
}
