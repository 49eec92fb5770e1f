//! Ontograph Configuration Management
//!
//! Handles configuration from environment variables and config files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Graph backend configuration
    pub graph: GraphConfig,

    /// Object storage configuration
    pub storage: StorageConfig,

    /// Message fabric configuration
    pub messaging: MessagingConfig,

    /// Pipeline runner configuration
    pub pipeline: PipelineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Graph backend
        if let Ok(backend) = std::env::var("GRAPH_BACKEND") {
            self.graph.backend = backend;
        }
        if let Ok(host) = std::env::var("GRAPH_HOST") {
            self.graph.host = host;
        }
        if let Some(port) = parse_env("GRAPH_PORT")? {
            self.graph.port = port;
        }
        if let Ok(path) = std::env::var("GRAPH_PATH") {
            self.graph.path = path;
        }
        if let Some(tls) = parse_env("GRAPH_USE_TLS")? {
            self.graph.use_tls = tls;
        }
        if let Some(transport) = parse_env("GRAPH_TRANSPORT")? {
            self.graph.transport = transport;
        }
        if let Some(timeout) = parse_env("GRAPH_REQUEST_TIMEOUT_SECS")? {
            self.graph.request_timeout_secs = timeout;
        }
        if let Ok(location) = std::env::var("GRAPH_LOCATION") {
            self.graph.graph_location = Some(PathBuf::from(location));
        }
        if let Some(interval) = parse_env("GRAPH_WRITE_INTERVAL_SECS")? {
            self.graph.write_interval_secs = interval;
        }

        // Always use env for credentials
        if let Ok(user) = std::env::var("GRAPH_USERNAME") {
            self.graph.username = Some(user);
        }
        if let Ok(pass) = std::env::var("GRAPH_PASSWORD") {
            self.graph.password = Some(pass);
        }
        if let Ok(database) = std::env::var("GRAPH_DATABASE") {
            self.graph.database = Some(database);
        }
        if let Ok(collection) = std::env::var("GRAPH_COLLECTION") {
            self.graph.collection = Some(collection);
        }

        // Capability overrides
        let caps = &mut self.graph.capabilities;
        if let Some(v) = parse_env("GRAPH_SUPPORTS_USER_DEFINED_IDS")? {
            caps.supports_user_defined_ids = Some(v);
        }
        if let Some(v) = parse_env("GRAPH_SUPPORTS_NON_STRING_IDS")? {
            caps.supports_non_string_ids = Some(v);
        }
        if let Some(v) = parse_env("GRAPH_SUPPORTS_SCHEMA")? {
            caps.supports_schema = Some(v);
        }
        if let Some(v) = parse_env("GRAPH_SUPPORTS_TRANSACTIONS")? {
            caps.supports_transactions = Some(v);
        }
        if let Some(v) = parse_env("GRAPH_SUPPORTS_GEOSHAPE")? {
            caps.supports_geoshape = Some(v);
        }
        if let Some(v) = parse_env("GRAPH_SUPPORTS_TRAVERSALS_BY")? {
            caps.supports_traversals_by = Some(v);
        }

        // Rate limiter
        if let Some(enabled) = parse_env("GRAPH_RATE_LIMITER_ENABLED")? {
            self.graph.rate_limiter.enabled = enabled;
        }
        if let Some(aps) = parse_env("GRAPH_ACTIONS_PER_SECOND")? {
            self.graph.rate_limiter.actions_per_second = aps;
        }

        // Storage
        if let Ok(root) = std::env::var("STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Ok(dir) = std::env::var("STORAGE_WORKING_DIR") {
            self.storage.working_dir = PathBuf::from(dir);
        }

        // Pipeline
        if let Some(n) = parse_env("PIPELINE_MAX_CONCURRENCY")? {
            self.pipeline.max_concurrency = n;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(())
    }

    /// Check values that would otherwise fail late
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.graph.backend.trim().is_empty() {
            return Err(ConfigError::MissingRequired("graph.backend".to_string()));
        }
        if self.graph.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "graph.port".to_string(),
                value: "0".to_string(),
            });
        }
        if self.graph.graph_location.is_some() && self.graph.write_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "graph.write_interval_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.graph.rate_limiter.enabled && self.graph.rate_limiter.actions_per_second == 0 {
            return Err(ConfigError::InvalidValue {
                key: "graph.rate_limiter.actions_per_second".to_string(),
                value: "0".to_string(),
            });
        }
        if self.pipeline.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.max_concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Graph backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Backend selector (tinkergraph, gremlin-server, janusgraph, cosmosdb)
    pub backend: String,

    /// Gremlin Server host
    pub host: String,

    /// Gremlin Server port
    pub port: u16,

    /// Endpoint path for the WebSocket transport
    pub path: String,

    /// Use https/wss
    pub use_tls: bool,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Cosmos DB database name
    pub database: Option<String>,

    /// Cosmos DB graph (collection) name
    pub collection: Option<String>,

    /// Wire transport for remote backends
    pub transport: TransportKind,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Upper bound on count/drop rounds for capped deletes
    pub max_delete_rounds: usize,

    /// Capability profile overrides
    pub capabilities: CapabilityOverrides,

    /// Bulk write throttling
    pub rate_limiter: RateLimiterConfig,

    /// Snapshot file the embedded graph is restored from and written to
    pub graph_location: Option<PathBuf>,

    /// Seconds between periodic snapshot writes in long-running mode
    pub write_interval_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: "tinkergraph".to_string(),
            host: "localhost".to_string(),
            port: 8182,
            path: "/gremlin".to_string(),
            use_tls: false,
            username: None,
            password: None,
            database: None,
            collection: None,
            transport: TransportKind::Http,
            request_timeout_secs: 30,
            max_delete_rounds: 10_000,
            capabilities: CapabilityOverrides::default(),
            rate_limiter: RateLimiterConfig::default(),
            graph_location: None,
            write_interval_secs: 600,
        }
    }
}

impl GraphConfig {
    /// Base URL for the HTTP transport
    pub fn http_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// URL for the WebSocket transport
    pub fn websocket_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Wire transport for remote Gremlin endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    WebSocket,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" | "https" => Ok(Self::Http),
            "websocket" | "ws" | "wss" => Ok(Self::WebSocket),
            _ => Err(ConfigError::InvalidValue {
                key: "GRAPH_TRANSPORT".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Per-deployment adjustments to a backend's capability profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityOverrides {
    pub supports_user_defined_ids: Option<bool>,
    pub supports_non_string_ids: Option<bool>,
    pub supports_schema: Option<bool>,
    pub supports_transactions: Option<bool>,
    pub supports_geoshape: Option<bool>,
    pub supports_traversals_by: Option<bool>,
}

/// Fixed-chunk write throttle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub enabled: bool,

    /// Chunk size submitted before each one-second pause
    pub actions_per_second: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            actions_per_second: 100,
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for filesystem-backed containers
    pub root: PathBuf,

    /// Local scratch directory for downloaded artifacts
    pub working_dir: PathBuf,

    /// Container holding parser output
    pub parsed_container: String,

    /// Container holding modelled graphs
    pub modelled_container: String,

    /// Container receiving graphs after loading
    pub loaded_container: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/storage"),
            working_dir: PathBuf::from("./data/work"),
            parsed_container: "parsed".to_string(),
            modelled_container: "modelled".to_string(),
            loaded_container: "loaded".to_string(),
        }
    }
}

/// Message fabric configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Channel announcing modelled graphs
    pub modelled_channel: String,

    /// Channel announcing loaded graphs
    pub loaded_channel: String,

    /// Buffer size of each in-process channel
    pub channel_capacity: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            modelled_channel: "modelled".to_string(),
            loaded_channel: "loaded".to_string(),
            channel_capacity: 64,
        }
    }
}

/// Pipeline runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Messages processed concurrently
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
