//! Shared state threaded through the engine's components.

use crate::config::SyncConfig;
use std::sync::atomic::{AtomicBool, Ordering};

/// Configuration plus the connectivity flag, owned by one engine.
#[derive(Debug)]
pub struct SyncContext {
    config: SyncConfig,
    online: AtomicBool,
}

impl SyncContext {
    /// Creates a context. The engine starts out offline until the first
    /// connectivity check.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            online: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the result of the latest connectivity check.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records the result of a connectivity check.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}
