//! Channel-driven runner over the embedded graph

use std::sync::Arc;

use ontograph_core::{
    AppConfig, ChannelPublisher, Edge, EdgeLabel, LocalObjectStorage, OntologyMessage,
    SimpleOntologyPropertyGraph, Vertex, VertexLabel,
};
use ontograph_graph::{Filter, GraphDatabaseServiceFactory};
use ontograph_loader::{PipelineRunner, RunSummary};
use tokio::sync::mpsc;

fn chain(ontology_id: i32, length: usize) -> SimpleOntologyPropertyGraph {
    let mut graph = SimpleOntologyPropertyGraph::new(ontology_id, 1);
    let vertices: Vec<Vertex> = (0..length)
        .map(|i| Vertex::new(format!("http://ex.org/chain#C{i}"), ontology_id, VertexLabel::Class, 1))
        .collect();
    for pair in vertices.windows(2) {
        graph.add_edge(Edge::new(&pair[1].key, &pair[0].key, EdgeLabel::SubClassOf, ontology_id, 1));
    }
    for vertex in vertices {
        graph.add_vertex(vertex);
    }
    graph
}

#[tokio::test]
async fn test_runner_processes_until_channel_closes() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.storage.root = dir.path().join("storage");
    config.storage.working_dir = dir.path().join("work");
    config.pipeline.max_concurrency = 2;

    let storage = Arc::new(LocalObjectStorage::from_config(&config.storage));
    for id in 1..=3 {
        let bytes = chain(id, 5 + id as usize).to_json().unwrap();
        storage
            .put_object("modelled", &format!("chain-{id}.json"), &bytes)
            .await
            .unwrap();
    }

    let factory = Arc::new(GraphDatabaseServiceFactory::with_defaults());
    let publisher = Arc::new(ChannelPublisher::new(16));
    let mut loaded = publisher.subscribe("loaded").unwrap();
    let runner = Arc::new(PipelineRunner::new(factory.clone(), storage, publisher, &config));

    let (tx, rx) = mpsc::channel(16);
    for (id, webhook) in [(1, 10), (2, 20), (1, 11), (3, 30)] {
        tx.send(OntologyMessage::new(id, webhook, format!("chain-{id}")))
            .await
            .unwrap();
    }
    tx.send(OntologyMessage::new(4, 40, "missing")).await.unwrap();
    drop(tx);

    let summary = runner.clone().run(rx).await;
    assert_eq!(summary, RunSummary { processed: 4, failed: 1 });
    assert_eq!(runner.active_ontologies().await, 0);

    let service = factory.create(&config.graph).unwrap();
    service.open_graph().await.unwrap();
    for id in 1..=3 {
        let scope = Filter::ontology(id);
        let length = 5 + id as u64;
        assert_eq!(service.count_vertices(&scope).await.unwrap(), length);
        assert_eq!(service.count_edges(&scope).await.unwrap(), length - 1);
    }

    let mut published = 0;
    while loaded.try_recv().is_ok() {
        published += 1;
    }
    assert_eq!(published, 4);
}

#[tokio::test]
async fn test_runner_handle_serializes_same_ontology() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.storage.root = dir.path().join("storage");
    config.storage.working_dir = dir.path().join("work");

    let storage = Arc::new(LocalObjectStorage::from_config(&config.storage));
    storage
        .put_object("modelled", "chain-9.json", &chain(9, 40).to_json().unwrap())
        .await
        .unwrap();

    let factory = Arc::new(GraphDatabaseServiceFactory::with_defaults());
    let runner = Arc::new(PipelineRunner::new(
        factory.clone(),
        storage,
        Arc::new(ChannelPublisher::new(4)),
        &config,
    ));

    let message = OntologyMessage::new(9, 1, "chain-9");
    let (a, b) = tokio::join!(runner.handle(&message), runner.handle(&message));
    assert_eq!(a.unwrap().edges, 39);
    assert_eq!(b.unwrap().edges, 39);
    assert_eq!(runner.active_ontologies().await, 0);

    let graph = factory.embedded_graph();
    let graph = graph.lock().await;
    assert_eq!(graph.vertex_count(), 40);
    assert_eq!(graph.edge_count(), 39);
}
