//! In-process message fabric
//!
//! Named channels backed by tokio mpsc queues. A stage subscribes to the
//! channel it consumes and publishes completion messages on the next one.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{MessagePublisher, MessagingConfig, OntographError, OntologyMessage, Result};

/// Publisher over named in-process channels
pub struct ChannelPublisher {
    capacity: usize,
    senders: Mutex<HashMap<String, mpsc::Sender<OntologyMessage>>>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Create from config
    pub fn from_config(config: &MessagingConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    /// Subscribe to a channel, replacing any previous subscriber
    pub fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<OntologyMessage>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut senders = self
            .senders
            .lock()
            .map_err(|e| OntographError::MessagingError(format!("Channel registry poisoned: {e}")))?;
        senders.insert(channel.to_string(), tx);
        Ok(rx)
    }

    /// Close a channel. Its subscriber drains what is queued, then ends.
    pub fn close(&self, channel: &str) -> Result<()> {
        let mut senders = self
            .senders
            .lock()
            .map_err(|e| OntographError::MessagingError(format!("Channel registry poisoned: {e}")))?;
        senders.remove(channel);
        Ok(())
    }

    fn sender(&self, channel: &str) -> Result<Option<mpsc::Sender<OntologyMessage>>> {
        let senders = self
            .senders
            .lock()
            .map_err(|e| OntographError::MessagingError(format!("Channel registry poisoned: {e}")))?;
        Ok(senders.get(channel).cloned())
    }
}

#[async_trait]
impl MessagePublisher for ChannelPublisher {
    async fn publish(&self, channel: &str, message: &OntologyMessage) -> Result<()> {
        let Some(sender) = self.sender(channel)? else {
            debug!(channel, ontology_id = message.ontology_id, "No subscriber, message dropped");
            return Ok(());
        };

        sender.send(message.clone()).await.map_err(|e| {
            warn!(channel, "Subscriber went away");
            OntographError::MessagingError(format!("Failed to publish on {channel}: {e}"))
        })?;

        debug!(
            channel,
            ontology_id = message.ontology_id,
            webhook_event_id = message.webhook_event_id,
            "Published message"
        );
        Ok(())
    }
}
