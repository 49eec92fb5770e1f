//! Backend variants
//!
//! Each variant differs only in its capability profile, how it acquires a
//! connection and the recipes it overrides.

pub mod cosmosdb;
pub mod gremlin_server;
pub mod janusgraph;
pub mod tinkergraph;

pub use cosmosdb::CosmosDbBackend;
pub use gremlin_server::GremlinServerBackend;
pub use janusgraph::JanusGraphBackend;
pub use tinkergraph::TinkerGraphBackend;
