//! Engine configuration
//!
//! Every field has a default, so an empty or partial JSON file is valid:
//!
//! ```json
//! {
//!   "retry": { "maxAttempts": 5, "baseDelayMs": 500 },
//!   "pushOnWrite": false
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::retry::{RetryConfig, RetryPolicy};

/// Default capacity for the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default capacity of the inbound snapshot queue feeding the merge task
pub const INBOUND_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub retry: RetryConfig,
    /// Push each mutation in the background right after the local commit
    /// when online. When off, changes wait for an explicit drain or a
    /// reconnect.
    pub push_on_write: bool,
    pub event_capacity: usize,
    pub inbound_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            push_on_write: true,
            event_capacity: EVENT_CHANNEL_CAPACITY,
            inbound_capacity: INBOUND_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            SyncError::InvalidOperation(format!("invalid config {}: {}", path.display(), e))
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    #[must_use]
    pub fn with_push_on_write(mut self, push_on_write: bool) -> Self {
        self.push_on_write = push_on_write;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryConfig {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
        };
        self
    }
}
