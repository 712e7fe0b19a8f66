// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Core configuration via `omxil.yaml`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{OmxError, Result};

/// Environment variable overriding `resources.budget_bytes`.
pub const RESOURCE_BUDGET_ENV: &str = "OMXIL_RESOURCE_BUDGET";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    /// Bytes shared by every component's buffer pools.
    pub budget_bytes: u64,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// How long `Loaded -> Idle` and `PortEnable` wait for ports to populate.
    pub port_population_ms: u64,
    /// How long `Idle -> Loaded`, `PortDisable` and stop wait for buffers to come back.
    pub port_release_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            port_population_ms: 2000,
            port_release_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbacksConfig {
    /// Callbacks slower than this are logged.
    pub slow_callback_warn_ms: u64,
}

impl Default for CallbacksConfig {
    fn default() -> Self {
        Self {
            slow_callback_warn_ms: 5,
        }
    }
}

/// Core configuration from `omxil.yaml`.
///
/// ```yaml
/// resources:
///   budget_bytes: 67108864
/// timeouts:
///   port_population_ms: 500
///   port_release_ms: 500
/// callbacks:
///   slow_callback_warn_ms: 5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub resources: ResourcesConfig,
    pub timeouts: TimeoutsConfig,
    pub callbacks: CallbacksConfig,
}

impl CoreConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "omxil.yaml";

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            OmxError::Configuration(format!("Failed to parse {}: {}", Self::FILE_NAME, e))
        })
    }

    /// Load configuration from a directory. Returns error if the file is
    /// missing or cannot be parsed.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            OmxError::Configuration(format!("Failed to read {}: {}", config_path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            OmxError::Configuration(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;

        tracing::info!("Loaded core config from {}", config_path.display());
        Ok(config.with_env_overrides())
    }

    /// Load configuration from a directory, returning defaults if the file is
    /// missing or unparseable.
    pub fn load_or_default(dir: &Path) -> Self {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            tracing::debug!(
                "No {} found in {}, using defaults",
                Self::FILE_NAME,
                dir.display()
            );
            return Self::default().with_env_overrides();
        }

        match Self::load(dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default().with_env_overrides()
            }
        }
    }

    /// Apply `OMXIL_RESOURCE_BUDGET` if set. Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(RESOURCE_BUDGET_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(budget) => {
                    tracing::debug!(
                        "{} overrides resource budget: {}",
                        RESOURCE_BUDGET_ENV,
                        budget
                    );
                    self.resources.budget_bytes = budget;
                }
                Err(e) => {
                    tracing::warn!("Ignoring {}={:?}: {}", RESOURCE_BUDGET_ENV, raw, e);
                }
            }
        }
        self
    }

    pub fn port_population_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.port_population_ms)
    }

    pub fn port_release_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.port_release_ms)
    }

    pub fn slow_callback_threshold(&self) -> Duration {
        Duration::from_millis(self.callbacks.slow_callback_warn_ms)
    }
}
