//! Configuration schema definitions.
//!
//! This module defines the configuration structure for the request watchdog
//! and the command-line tool. All types derive Serde traits for
//! deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AlarmaConfig {
    /// Request lifecycle hook settings.
    pub hooks: HookConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Settings for the pre/post request hooks.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HookConfig {
    /// Install the request watchdog at all.
    pub enabled: bool,

    /// Time budget of a single request in seconds.
    pub request_timeout_secs: f64,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_timeout_secs: 25.0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Record counters through the `metrics` facade.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
