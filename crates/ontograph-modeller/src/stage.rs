//! Modelling pipeline stage
//!
//! Downloads the parsed ontology, models it, persists the graph artifact
//! into the `modelled` container and announces it on the modelled channel.

use std::path::PathBuf;
use std::sync::Arc;

use ontograph_core::{
    MessagePublisher, MessagingConfig, ObjectStorage, OntographError, OntologyMessage,
    PipelineStage, Result, SimpleOntologyPropertyGraph, StorageConfig,
};
use tracing::{debug, error, info, warn};

use crate::model::PropertyGraphModeller;
use crate::parsed::ParsedOntology;

/// Parsed ontology -> modelled property graph artifact
pub struct ModellerStage {
    storage: Arc<dyn ObjectStorage>,
    publisher: Arc<dyn MessagePublisher>,
    storage_config: StorageConfig,
    messaging_config: MessagingConfig,
    modeller: PropertyGraphModeller,
}

impl ModellerStage {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        publisher: Arc<dyn MessagePublisher>,
        storage_config: StorageConfig,
        messaging_config: MessagingConfig,
    ) -> Self {
        Self {
            storage,
            publisher,
            storage_config,
            messaging_config,
            modeller: PropertyGraphModeller::new(),
        }
    }

    /// Use a custom modeller
    pub fn with_modeller(mut self, modeller: PropertyGraphModeller) -> Self {
        self.modeller = modeller;
        self
    }

    /// Model the ontology named by `message`
    pub async fn handle(&self, message: &OntologyMessage) -> Result<SimpleOntologyPropertyGraph> {
        info!(
            ontology_id = message.ontology_id,
            webhook_event_id = message.webhook_event_id,
            "Property graph modelling started"
        );

        let scratch = self.scratch_paths(message);
        let result = self.run(message, &scratch).await;
        self.cleanup(&scratch).await;

        match result {
            Ok(graph) => {
                info!(ontology_id = message.ontology_id, "Property graph modelling finished");
                Ok(graph)
            }
            Err(e) => {
                error!(
                    ontology_id = message.ontology_id,
                    webhook_event_id = message.webhook_event_id,
                    error = %e,
                    "Property graph modelling failed"
                );
                Err(OntographError::pipeline(PipelineStage::ModellerGraph, e))
            }
        }
    }

    async fn run(
        &self,
        message: &OntologyMessage,
        scratch: &[PathBuf; 2],
    ) -> Result<SimpleOntologyPropertyGraph> {
        let [parsed_path, modelled_path] = scratch;
        let filename = message.json_processed_filename();
        let modelled_container = &self.storage_config.modelled_container;

        // 1. Setup
        if !self.storage.container_exists(modelled_container).await? {
            self.storage.create_container(modelled_container).await?;
        }

        // 2. Download
        self.storage
            .download_object(&self.storage_config.parsed_container, &filename, parsed_path)
            .await?;
        let bytes = tokio::fs::read(parsed_path).await.map_err(|e| {
            OntographError::StorageError(format!("Failed to read {}: {e}", parsed_path.display()))
        })?;
        debug!(path = %parsed_path.display(), "Downloaded parsed ontology");

        // 3. Model
        let parsed = ParsedOntology::from_slice(&bytes)?;
        let graph = self
            .modeller
            .model(&parsed, message.ontology_id, message.webhook_event_id);
        graph.validate()?;

        // 4. Persist
        tokio::fs::write(modelled_path, graph.to_json()?).await.map_err(|e| {
            OntographError::StorageError(format!("Failed to write {}: {e}", modelled_path.display()))
        })?;
        self.storage
            .upload_object(modelled_container, &filename, modelled_path)
            .await?;
        debug!(container = %modelled_container, name = %filename, "Persisted modelled graph");

        // 5. Publish
        self.publisher
            .publish(&self.messaging_config.modelled_channel, message)
            .await?;

        Ok(graph)
    }

    /// Local files used while handling one message
    fn scratch_paths(&self, message: &OntologyMessage) -> [PathBuf; 2] {
        let filename = message.json_processed_filename();
        let dir = &self.storage_config.working_dir;
        [
            dir.join("modeller").join(format!("{}_{filename}", self.storage_config.parsed_container)),
            dir.join("modeller").join(format!("{}_{filename}", self.storage_config.modelled_container)),
        ]
    }

    async fn cleanup(&self, scratch: &[PathBuf; 2]) {
        for path in scratch {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
                }
            }
        }
        if let Err(e) = self.storage.cleanup().await {
            warn!(error = %e, "Object storage cleanup failed");
        }
    }
}
