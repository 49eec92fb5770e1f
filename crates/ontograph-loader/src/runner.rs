//! Pipeline runner
//!
//! Consumes loader messages from a channel. Up to `max_concurrency` loads run
//! at once; loads of the same ontology never overlap. Every load gets its
//! own graph database service, so each worker holds its own connection.

use std::collections::HashMap;
use std::sync::Arc;

use ontograph_core::{
    AppConfig, GraphConfig, MessagePublisher, MessagingConfig, ObjectStorage, OntologyMessage,
    Result, StorageConfig,
};
use ontograph_graph::GraphDatabaseServiceFactory;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::{LoadReport, OntologyGraphLoader};

/// Totals for one runner session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Channel-driven loader with bounded concurrency
pub struct PipelineRunner {
    factory: Arc<GraphDatabaseServiceFactory>,
    storage: Arc<dyn ObjectStorage>,
    publisher: Arc<dyn MessagePublisher>,
    graph_config: GraphConfig,
    storage_config: StorageConfig,
    messaging_config: MessagingConfig,
    semaphore: Arc<Semaphore>,
    ontology_locks: Mutex<HashMap<i32, Arc<Mutex<()>>>>,
}

impl PipelineRunner {
    pub fn new(
        factory: Arc<GraphDatabaseServiceFactory>,
        storage: Arc<dyn ObjectStorage>,
        publisher: Arc<dyn MessagePublisher>,
        config: &AppConfig,
    ) -> Self {
        Self {
            factory,
            storage,
            publisher,
            graph_config: config.graph.clone(),
            storage_config: config.storage.clone(),
            messaging_config: config.messaging.clone(),
            semaphore: Arc::new(Semaphore::new(config.pipeline.max_concurrency.max(1))),
            ontology_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Load one message, waiting for any in-flight load of the same ontology
    pub async fn handle(&self, message: &OntologyMessage) -> Result<LoadReport> {
        let lock = {
            let mut locks = self.ontology_locks.lock().await;
            locks.entry(message.ontology_id).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().await;
            self.load(message).await
        };

        // Forget the lock once no other load holds or awaits it
        let mut locks = self.ontology_locks.lock().await;
        drop(lock);
        if locks
            .get(&message.ontology_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&message.ontology_id);
        }
        result
    }

    /// Ontologies with a load in flight or queued
    pub async fn active_ontologies(&self) -> usize {
        self.ontology_locks.lock().await.len()
    }

    async fn load(&self, message: &OntologyMessage) -> Result<LoadReport> {
        let graph = self.factory.create(&self.graph_config)?;
        let loader = OntologyGraphLoader::new(
            self.storage.clone(),
            graph,
            self.publisher.clone(),
            self.storage_config.clone(),
            self.messaging_config.clone(),
        );
        loader.handle(message).await
    }

    /// Process messages until the channel closes
    pub async fn run(self: Arc<Self>, mut messages: mpsc::Receiver<OntologyMessage>) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut tasks = JoinSet::new();

        info!(
            max_concurrency = self.semaphore.available_permits(),
            "Pipeline runner started"
        );

        while let Some(message) = messages.recv().await {
            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                break;
            };
            debug!(
                ontology_id = message.ontology_id,
                webhook_event_id = message.webhook_event_id,
                "Dispatching load"
            );

            let runner = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                runner.handle(&message).await
            });

            while let Some(done) = tasks.try_join_next() {
                summary.record(done);
            }
        }

        while let Some(done) = tasks.join_next().await {
            summary.record(done);
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            "Pipeline runner stopped"
        );
        summary
    }
}

impl RunSummary {
    fn record(&mut self, outcome: std::result::Result<Result<LoadReport>, tokio::task::JoinError>) {
        match outcome {
            Ok(Ok(_)) => self.processed += 1,
            // Already logged by the loader
            Ok(Err(_)) => self.failed += 1,
            Err(e) => {
                error!(error = %e, "Load task panicked or was cancelled");
                self.failed += 1;
            }
        }
    }
}
