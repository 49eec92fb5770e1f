//! Ontograph CLI - Command-line interface
//!
//! Usage:
//!   ontograph model <processed-filename> --ontology-id <id> --webhook-event-id <id>
//!   ontograph load <processed-filename> --ontology-id <id> --webhook-event-id <id>
//!   ontograph listen
//!   ontograph query <gremlin>
//!   ontograph schema [--print]
//!   ontograph serialize [path]
//!
//! Author: hephaex@gmail.com

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ontograph_core::{
    AppConfig, ChannelPublisher, GraphConfig, LocalObjectStorage, LoggingConfig, OntologyMessage,
};
use ontograph_graph::backends::janusgraph::{janusgraph_schema_script, GraphSchema};
use ontograph_graph::{BackendKind, GraphDatabaseServiceFactory};
use ontograph_loader::PipelineRunner;
use ontograph_modeller::ModellerStage;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ontograph")]
#[command(about = "Ontology property-graph pipeline CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables take precedence
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Graph backend (tinkergraph, gremlin-server, janusgraph, cosmosdb)
    #[arg(short, long, global = true)]
    backend: Option<String>,

    /// Log level filter, overrides the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Model a parsed ontology as a property graph
    Model {
        #[command(flatten)]
        message: MessageArgs,
    },
    /// Load a modelled property graph into the graph backend
    Load {
        #[command(flatten)]
        message: MessageArgs,
    },
    /// Model and load every message read from stdin (one JSON object per line)
    Listen,
    /// Run a raw Gremlin query and print the rows
    Query {
        /// Gremlin traversal
        gremlin: String,
    },
    /// Create the graph schema
    Schema {
        /// Print the JanusGraph management script instead of running it
        #[arg(long)]
        print: bool,
    },
    /// Write the whole graph to a file (server-side for remote backends)
    Serialize {
        /// Destination, defaults to the configured graph location
        path: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct MessageArgs {
    /// Artifact base name, without the .json suffix
    processed_filename: String,

    #[arg(long)]
    ontology_id: i32,

    #[arg(long)]
    webhook_event_id: i64,
}

impl From<MessageArgs> for OntologyMessage {
    fn from(args: MessageArgs) -> Self {
        OntologyMessage::new(args.ontology_id, args.webhook_event_id, args.processed_filename)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    if let Some(backend) = cli.backend {
        config.graph.backend = backend;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    init_tracing(&config.logging);

    let storage = Arc::new(LocalObjectStorage::from_config(&config.storage));
    let publisher = Arc::new(ChannelPublisher::from_config(&config.messaging));
    let factory = Arc::new(GraphDatabaseServiceFactory::with_defaults());

    match cli.command {
        Commands::Model { message } => {
            let stage = ModellerStage::new(
                storage,
                publisher,
                config.storage.clone(),
                config.messaging.clone(),
            );
            let graph = stage.handle(&message.into()).await?;
            println!(
                "Modelled ontology {}: {} vertices, {} edges",
                graph.id,
                graph.vertices.len(),
                graph.edges.len()
            );
        }
        Commands::Load { message } => {
            let runner = PipelineRunner::new(factory.clone(), storage, publisher, &config);
            let report = runner.handle(&message.into()).await?;
            persist_graph(&factory, &config.graph).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Listen => listen(&config, factory, storage, publisher).await?,
        Commands::Query { gremlin } => {
            let graph = factory.create(&config.graph)?;
            graph.open_graph().await?;
            let result = graph.query(&gremlin).await;
            graph.cleanup().await?;
            for row in result? {
                println!("{row}");
            }
        }
        Commands::Schema { print: true } => {
            println!("{}", janusgraph_schema_script(&GraphSchema::ontology()));
        }
        Commands::Schema { print: false } => {
            let graph = factory.create(&config.graph)?;
            graph.open_graph().await?;
            let result = graph.create_schema().await;
            graph.cleanup().await?;
            result?;
            println!("Schema ready on {}", graph.kind());
        }
        Commands::Serialize { path } => {
            let path = path
                .or_else(|| config.graph.graph_location.clone())
                .context("No destination given and GRAPH_LOCATION is not set")?;
            let graph = factory.create(&config.graph)?;
            graph.open_graph().await?;
            let result = graph.serialize_graph(&path).await;
            graph.cleanup().await?;
            result?;
            println!("Graph written to {}", path.display());
        }
    }

    Ok(())
}

/// Wire the modeller and loader through the in-process channels
async fn listen(
    config: &AppConfig,
    factory: Arc<GraphDatabaseServiceFactory>,
    storage: Arc<LocalObjectStorage>,
    publisher: Arc<ChannelPublisher>,
) -> anyhow::Result<()> {
    let modelled = publisher.subscribe(&config.messaging.modelled_channel)?;
    let runner = Arc::new(PipelineRunner::new(
        factory.clone(),
        storage.clone(),
        publisher.clone(),
        config,
    ));
    let loading = tokio::spawn(runner.run(modelled));
    let snapshots = spawn_snapshot_writer(factory.clone(), config.graph.clone());

    let stage = ModellerStage::new(
        storage,
        publisher.clone(),
        config.storage.clone(),
        config.messaging.clone(),
    );

    let counts = model_lines(&stage, BufReader::new(tokio::io::stdin())).await?;

    publisher.close(&config.messaging.modelled_channel)?;
    let summary = loading.await.context("Loader task failed")?;
    if let Some(snapshots) = snapshots {
        snapshots.abort();
    }
    persist_graph(&factory, &config.graph).await?;

    println!(
        "Modelled {} messages, {} failed, {} malformed",
        counts.modelled, counts.failed, counts.malformed
    );
    println!(
        "Loaded {} ontologies, {} failed",
        summary.processed, summary.failed
    );
    Ok(())
}

/// Outcome of feeding message lines to the modeller
#[derive(Debug, Default, PartialEq, Eq)]
struct ModelledCounts {
    modelled: usize,
    failed: usize,
    malformed: usize,
}

/// Model one JSON message per line until the input ends
async fn model_lines<R>(stage: &ModellerStage, input: R) -> anyhow::Result<ModelledCounts>
where
    R: AsyncBufRead + Unpin,
{
    let mut counts = ModelledCounts::default();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message: OntologyMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                counts.malformed += 1;
                warn!(error = %e, "Ignoring malformed message");
                continue;
            }
        };
        match stage.handle(&message).await {
            Ok(graph) => {
                counts.modelled += 1;
                debug!(
                    ontology_id = graph.id,
                    vertices = graph.vertices.len(),
                    edges = graph.edges.len(),
                    "Handed off to loader"
                );
            }
            Err(e) => {
                counts.failed += 1;
                debug!(ontology_id = message.ontology_id, kind = e.kind(), "Message not modelled");
            }
        }
    }
    Ok(counts)
}

/// Write the embedded graph to its configured location, if any
async fn persist_graph(factory: &GraphDatabaseServiceFactory, config: &GraphConfig) -> anyhow::Result<()> {
    let Some(location) = &config.graph_location else {
        return Ok(());
    };
    let graph = factory.create(config)?;
    if graph.kind() != BackendKind::TinkerGraph {
        return Ok(());
    }

    graph.open_graph().await?;
    let result = graph.serialize_graph(location).await;
    graph.cleanup().await?;
    result.with_context(|| format!("Failed to write graph to {}", location.display()))
}

/// Periodically snapshot the embedded graph while messages are processed
fn spawn_snapshot_writer(
    factory: Arc<GraphDatabaseServiceFactory>,
    config: GraphConfig,
) -> Option<tokio::task::JoinHandle<()>> {
    config.graph_location.as_ref()?;
    let period = Duration::from_secs(config.write_interval_secs.max(1));

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = persist_graph(&factory, &config).await {
                error!(error = %e, "Periodic graph snapshot failed");
            }
        }
    }))
}

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(std::io::stderr);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontograph_core::{MessagingConfig, StorageConfig};

    const PARSED: &str = r#"{
        "annotationProperties": {},
        "objectProperties": {},
        "classes": {
            "http://ex.org/zoo#Animal": {"iri": "http://ex.org/zoo#Animal"},
            "http://ex.org/zoo#Dog": {
                "iri": "http://ex.org/zoo#Dog",
                "parentClasses": {"http://ex.org/zoo#Animal": null}
            }
        },
        "namedIndividuals": {}
    }"#;

    #[tokio::test]
    async fn test_model_lines_counts_each_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let storage_config = StorageConfig {
            root: dir.path().join("storage"),
            working_dir: dir.path().join("work"),
            ..StorageConfig::default()
        };
        let storage = Arc::new(LocalObjectStorage::from_config(&storage_config));
        storage
            .put_object("parsed", "zoo-12.json", PARSED.as_bytes())
            .await
            .unwrap();
        let stage = ModellerStage::new(
            storage,
            Arc::new(ChannelPublisher::new(8)),
            storage_config,
            MessagingConfig::default(),
        );

        let input = [
            "not json",
            "",
            r#"{"ontologyId": 1, "webhookEventId": 1, "processedFilename": "absent"}"#,
            r#"{"ontologyId": 12, "webhookEventId": 340, "processedFilename": "zoo-12"}"#,
        ]
        .join("\n");

        let counts = model_lines(&stage, input.as_bytes()).await.unwrap();
        assert_eq!(
            counts,
            ModelledCounts {
                modelled: 1,
                failed: 1,
                malformed: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_persist_graph_without_location_is_noop() {
        let factory = GraphDatabaseServiceFactory::new();
        let config = GraphConfig::default();
        assert!(config.graph_location.is_none());
        persist_graph(&factory, &config).await.unwrap();
    }
}
