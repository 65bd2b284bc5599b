//! KeyStore configuration.
//!
//! ```ignore
//! use tcpsig::{Config, FlushPolicy};
//!
//! let config = Config::new()
//!     .flush_policy(FlushPolicy::Retain)
//!     .max_entries(1024);
//! ```

use serde::{Deserialize, Serialize};

/// What `flush` does with an SA that is still held by a connection or an
/// in-flight signing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Unlink busy SAs too and mark them detached. No new lookup finds
    /// them; they are freed when the last holder releases them, and
    /// connection caches drop them on next use.
    #[default]
    Detach,
    /// Leave busy SAs linked. A later flush frees them once released.
    Retain,
}

/// Configuration for a [`KeyStore`](crate::KeyStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Handling of busy SAs during flush.
    pub flush_policy: FlushPolicy,
    /// Include raw key bytes in DUMP replies.
    pub dump_keys: bool,
    /// Upper bound on the number of SAs; `None` is unbounded.
    pub max_entries: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_policy: FlushPolicy::Detach,
            dump_keys: false,
            max_entries: None,
        }
    }
}

impl Config {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flush policy.
    pub fn flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    /// Include key bytes in DUMP replies.
    pub fn dump_keys(mut self, enabled: bool) -> Self {
        self.dump_keys = enabled;
        self
    }

    /// Limit the number of SAs in the table.
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }
}
