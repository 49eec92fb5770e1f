//! Backend selection
//!
//! Resolves the configured backend identifier to a registered constructor.
//! Unknown identifiers are a configuration error, never a fallback.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ontograph_core::{ConfigError, GraphConfig, Result};
use tokio::sync::Mutex;
use tracing::info;

use crate::backends::{CosmosDbBackend, GremlinServerBackend, JanusGraphBackend, TinkerGraphBackend};
use crate::{GraphDatabaseService, GremlinGraphService, TinkerGraph};

/// Embedded graph shared by every service a factory creates
pub type SharedGraph = Arc<Mutex<TinkerGraph>>;

/// Builds a service for one backend variant
pub type ServiceConstructor =
    Arc<dyn Fn(&GraphConfig, &SharedGraph) -> Result<Arc<dyn GraphDatabaseService>> + Send + Sync>;

/// Supported backend families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    TinkerGraph,
    GremlinServer,
    JanusGraph,
    CosmosDb,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TinkerGraph => "tinkergraph",
            Self::GremlinServer => "gremlin-server",
            Self::JanusGraph => "janusgraph",
            Self::CosmosDb => "cosmosdb",
        }
    }

    pub fn all() -> [BackendKind; 4] {
        [Self::TinkerGraph, Self::GremlinServer, Self::JanusGraph, Self::CosmosDb]
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tinkergraph" => Ok(Self::TinkerGraph),
            "gremlin-server" | "gremlinserver" | "gremlin" => Ok(Self::GremlinServer),
            "janusgraph" => Ok(Self::JanusGraph),
            "cosmosdb" | "cosmos" => Ok(Self::CosmosDb),
            _ => Err(ConfigError::InvalidValue {
                key: "graph.backend".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Registry of backend constructors
pub struct GraphDatabaseServiceFactory {
    constructors: HashMap<BackendKind, ServiceConstructor>,
    embedded: SharedGraph,
}

impl Default for GraphDatabaseServiceFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl GraphDatabaseServiceFactory {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            embedded: Arc::new(Mutex::new(TinkerGraph::new())),
        }
    }

    /// Registry with the four built-in variants
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();

        factory.register(BackendKind::TinkerGraph, |config, graph| {
            Ok(Arc::new(GremlinGraphService::new(
                TinkerGraphBackend::new(graph.clone()).with_location(config.graph_location.clone()),
                config,
            )))
        });
        factory.register(BackendKind::GremlinServer, |config, _| {
            Ok(Arc::new(GremlinGraphService::new(
                GremlinServerBackend::from_config(config),
                config,
            )))
        });
        factory.register(BackendKind::JanusGraph, |config, _| {
            Ok(Arc::new(GremlinGraphService::new(
                JanusGraphBackend::from_config(config),
                config,
            )))
        });
        factory.register(BackendKind::CosmosDb, |config, _| {
            Ok(Arc::new(GremlinGraphService::new(
                CosmosDbBackend::from_config(config)?,
                config,
            )))
        });

        factory
    }

    /// Add or replace the constructor for a backend
    pub fn register<F>(&mut self, kind: BackendKind, constructor: F)
    where
        F: Fn(&GraphConfig, &SharedGraph) -> Result<Arc<dyn GraphDatabaseService>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Arc::new(constructor));
    }

    /// Create a service for the configured backend
    pub fn create(&self, config: &GraphConfig) -> Result<Arc<dyn GraphDatabaseService>> {
        let kind: BackendKind = config.backend.parse()?;
        let constructor = self.constructors.get(&kind).ok_or_else(|| ConfigError::InvalidValue {
            key: "graph.backend".to_string(),
            value: format!("{kind} is not registered"),
        })?;

        let service = constructor(config, &self.embedded)?;
        info!(backend = %kind, "Graph database service created");
        Ok(service)
    }

    /// The in-process graph used by the TinkerGraph variant
    pub fn embedded_graph(&self) -> SharedGraph {
        self.embedded.clone()
    }

    pub fn registered(&self) -> Vec<BackendKind> {
        BackendKind::all()
            .into_iter()
            .filter(|kind| self.constructors.contains_key(kind))
            .collect()
    }
}

/// Create a service for the configured backend with the default registry
pub fn create_graph_service(config: &GraphConfig) -> Result<Arc<dyn GraphDatabaseService>> {
    GraphDatabaseServiceFactory::with_defaults().create(config)
}
