//! Typed queue configuration.
//!
//! Loading these from files or the environment is left to the embedding
//! pipeline; both structs deserialize with serde and fill missing fields from
//! their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Progressive wait schedule used by timed operations and `drain_while`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Failed attempts answered with a pure spin.
    pub spin_limit: u32,
    /// Failed attempts (counted from the first) answered with a yield.
    /// Beyond this the thread parks.
    pub yield_limit: u32,
    /// Upper bound of a single park.
    pub max_park: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            spin_limit: 100,
            yield_limit: 1000,
            max_park: Duration::from_millis(1),
        }
    }
}

/// Configuration for constructing any queue variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Requested capacity; rounded up to the next power of two.
    pub capacity: usize,
    /// Wait schedule for the queue's timed operations.
    pub backoff: BackoffConfig,
}

impl QueueConfig {
    /// Default configuration with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            backoff: BackoffConfig::default(),
        }
    }
}
