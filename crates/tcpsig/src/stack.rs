//! Network-stack scoped state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::admin::AdminProtocol;
use crate::config::Config;
use crate::signature::SignatureEngine;
use crate::store::KeyStore;

static NEXT_STACK_ID: AtomicU64 = AtomicU64::new(1);

/// One network stack instance.
///
/// The stack owns its SA table. The table is created on first use and torn
/// down when the stack is dropped: every SA is unlinked and detached, and
/// its key is zeroed once the last connection releases it.
#[derive(Debug)]
pub struct NetStack {
    id: u64,
    config: Config,
    keys: OnceLock<Arc<KeyStore>>,
}

impl Default for NetStack {
    fn default() -> Self {
        Self::new()
    }
}

impl NetStack {
    /// Create a stack with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a stack whose SA table will use `config`.
    pub fn with_config(config: Config) -> Self {
        Self {
            id: NEXT_STACK_ID.fetch_add(1, Ordering::Relaxed),
            config,
            keys: OnceLock::new(),
        }
    }

    /// Stack identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the SA table, creating it on first use.
    pub fn key_store(&self) -> &Arc<KeyStore> {
        self.keys.get_or_init(|| {
            debug!(stack = self.id, "creating SA table");
            Arc::new(KeyStore::with_config(self.config.clone()))
        })
    }

    /// Check whether the SA table has been created.
    pub fn has_key_store(&self) -> bool {
        self.keys.get().is_some()
    }

    /// A signature engine over this stack's SA table.
    pub fn signature_engine(&self) -> SignatureEngine {
        SignatureEngine::new(Arc::clone(self.key_store()))
    }

    /// An admin protocol handler over this stack's SA table.
    pub fn admin(&self) -> AdminProtocol {
        AdminProtocol::new(Arc::clone(self.key_store()))
    }
}

impl Drop for NetStack {
    fn drop(&mut self) {
        if let Some(store) = self.keys.get() {
            let count = store.clear();
            info!(stack = self.id, sas = count, "SA table torn down");
        }
    }
}
