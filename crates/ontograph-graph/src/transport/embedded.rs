//! In-process transport over the embedded TinkerGraph

use async_trait::async_trait;
use ontograph_core::Result;
use serde_json::Value;

use super::GremlinTransport;
use crate::factory::SharedGraph;

/// Submits queries straight to a shared in-memory graph
pub struct EmbeddedTransport {
    graph: SharedGraph,
}

impl EmbeddedTransport {
    pub fn new(graph: SharedGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }
}

#[async_trait]
impl GremlinTransport for EmbeddedTransport {
    async fn submit(&self, query: &str) -> Result<Vec<Value>> {
        let mut graph = self.graph.lock().await;
        graph.execute(query)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "embedded"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TinkerGraph;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn test_transports_share_one_graph() {
        let graph: SharedGraph = Arc::new(Mutex::new(TinkerGraph::new()));
        let first = EmbeddedTransport::new(graph.clone());
        let second = EmbeddedTransport::new(graph);

        first.submit("g.addV('class').property('key', 'A_1')").await.unwrap();
        tokio_test::assert_ok!(first.close().await);

        assert_eq!(second.submit("g.V().count()").await.unwrap(), vec![json!(1)]);
        assert_eq!(second.graph().lock().await.vertex_count(), 1);
    }
}
