//! Chunked write throttle
//!
//! Not a token bucket: bulk writes are split into fixed-size chunks and
//! a fixed pause separates consecutive chunks.

use std::future::Future;
use std::time::Duration;

use ontograph_core::{RateLimiterConfig, Result};
use tracing::debug;

/// Pause between consecutive chunks
pub const CHUNK_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    enabled: bool,
    actions_per_second: usize,
    pause: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::disabled()
    }
}

impl RateLimiter {
    pub fn new(enabled: bool, actions_per_second: usize) -> Self {
        Self {
            enabled,
            actions_per_second: actions_per_second.max(1),
            pause: CHUNK_PAUSE,
        }
    }

    /// Create from config
    pub fn from_config(config: &RateLimiterConfig) -> Self {
        Self::new(config.enabled, config.actions_per_second)
    }

    pub fn disabled() -> Self {
        Self::new(false, 1)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn chunk_size(&self, total: usize) -> usize {
        if self.enabled {
            self.actions_per_second
        } else {
            total.max(1)
        }
    }

    /// Split items the way [`RateLimiter::run`] submits them
    pub fn partition<'a, T>(&self, items: &'a [T]) -> Vec<&'a [T]> {
        items.chunks(self.chunk_size(items.len())).collect()
    }

    /// Apply `action` to every item in order, pausing between chunks.
    ///
    /// Stops at the first error.
    pub async fn run<T, F, Fut>(&self, items: Vec<T>, mut action: F) -> Result<usize>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let total = items.len();
        let chunk_size = self.chunk_size(total);

        for (index, item) in items.into_iter().enumerate() {
            if index > 0 && index % chunk_size == 0 {
                debug!(
                    submitted = index,
                    total,
                    pause_ms = self.pause.as_millis() as u64,
                    "Chunk complete, pausing"
                );
                tokio::time::sleep(self.pause).await;
            }
            action(item).await?;
        }

        Ok(total)
    }
}
