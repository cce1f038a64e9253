//! Sync configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tag under which the durable background sync registration is kept.
pub const DEFAULT_BACKGROUND_TAG: &str = "sync-visits";

/// Settings for the offline sync subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Remote "submit visit" endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// URL probed for reachability; defaults to `endpoint`
    #[serde(default)]
    pub probe_url: Option<String>,

    /// Per-push timeout in seconds. A timed-out push counts as a failure.
    #[serde(default = "default_push_timeout")]
    pub push_timeout_secs: u64,

    /// Reachability probe interval in seconds (daemon only)
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Periodic wake interval in seconds; 0 disables it (daemon only)
    #[serde(default = "default_wake_interval")]
    pub wake_interval_secs: u64,

    /// Background registration tag
    #[serde(default = "default_background_tag")]
    pub background_tag: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            probe_url: None,
            push_timeout_secs: default_push_timeout(),
            probe_interval_secs: default_probe_interval(),
            wake_interval_secs: default_wake_interval(),
            background_tag: default_background_tag(),
        }
    }
}

impl SyncConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    /// `None` when periodic wakes are disabled.
    pub fn wake_interval(&self) -> Option<Duration> {
        (self.wake_interval_secs > 0).then(|| Duration::from_secs(self.wake_interval_secs))
    }

    pub fn probe_url(&self) -> &str {
        self.probe_url.as_deref().unwrap_or(&self.endpoint)
    }
}

fn default_endpoint() -> String {
    "http://localhost:8080/api/visits".to_string()
}
fn default_push_timeout() -> u64 { 15 }
fn default_probe_interval() -> u64 { 30 }
fn default_wake_interval() -> u64 { 300 }
fn default_background_tag() -> String {
    DEFAULT_BACKGROUND_TAG.to_string()
}
