//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for sync operations.
///
/// Durations are read and written as (fractional) seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Server URL.
    pub server_url: String,
    /// Slug of the app whose reference data is reconciled.
    pub app_slug: String,
    /// How long synced responses are kept locally.
    #[serde(with = "seconds")]
    pub retention: Duration,
    /// Upper bound for a single request.
    #[serde(with = "seconds")]
    pub request_timeout: Duration,
    /// Pause between the connectivity check and change detection.
    #[serde(with = "seconds")]
    pub settle_delay: Duration,
    /// Interval between timer-driven cycles.
    #[serde(with = "seconds")]
    pub sync_interval: Duration,
    /// Window after a save-triggered cycle during which saves are ignored.
    #[serde(with = "seconds")]
    pub save_cooldown: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_url: impl Into<String>, app_slug: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            app_slug: app_slug.into(),
            retention: Duration::from_secs(24 * 60 * 60),
            request_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(1),
            sync_interval: Duration::from_secs(60),
            save_cooldown: Duration::from_secs(1),
        }
    }

    /// Loads a configuration from a JSON file. Missing fields keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> SyncResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))
    }

    /// Sets the retention window for synced responses.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the interval for timer-driven cycles.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the save-signal cooldown.
    pub fn with_save_cooldown(mut self, cooldown: Duration) -> Self {
        self.save_cooldown = cooldown;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

mod seconds {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
