//! Configuration loading and typed config structures for the hidden effect
//! engine.
//!
//! The canonical configuration lives in `stowaway-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads and validates the file.
//! Every section and field is optional; missing values fall back to the
//! defaults below.

use std::path::Path;

use serde::Deserialize;

/// Environment variable that overrides `logging.level`.
pub const LOG_LEVEL_ENV: &str = "STOWAWAY_LOG_LEVEL";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `stowaway-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StowawayConfig {
    /// Engine tuning shared by every manager instance.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Parameters for the simulation binary.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl StowawayConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// The `STOWAWAY_LOG_LEVEL` environment variable overrides
    /// `logging.level`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.logging.apply_env_overrides();
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Consecutive respawn attempts tolerated before an instance is deleted.
    /// The attempt after the last tolerated one deletes it.
    #[serde(default = "default_max_respawn_attempts")]
    pub max_respawn_attempts: u32,

    /// How many ticks an owner may go without an update callback and still
    /// count as active for respawn purposes.
    #[serde(default = "default_owner_idle_ticks")]
    pub owner_idle_ticks: u64,

    /// Off-screen position carriers are parked at.
    #[serde(default = "default_park_position")]
    pub park_position: [f32; 2],

    /// Items whose carrier leaves a cosmetic on its owner that must be
    /// undone before the carrier is killed.
    #[serde(default = "default_cosmetic_items")]
    pub cosmetic_items: Vec<i32>,

    /// Run the index consistency check after every reconciliation pass.
    #[serde(default = "default_true")]
    pub verify_indices: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_respawn_attempts: default_max_respawn_attempts(),
            owner_idle_ticks: default_owner_idle_ticks(),
            park_position: default_park_position(),
            cosmetic_items: default_cosmetic_items(),
            verify_indices: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(LOG_LEVEL_ENV) {
            if !val.trim().is_empty() {
                self.level = val;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Parameters for the simulation binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Real-time milliseconds per simulated tick. Zero runs flat out.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Number of ticks to run before stopping.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    /// Number of standard owners to create.
    #[serde(default = "default_owners")]
    pub owners: u32,

    /// Number of independent engine instances sharing the host.
    #[serde(default = "default_instances")]
    pub instances: u32,

    /// Random seed for the simulated host.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Where the snapshot is written at the end of the run and read from on
    /// start. `None` disables persistence.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: default_max_ticks(),
            owners: default_owners(),
            instances: default_instances(),
            seed: default_seed(),
            snapshot_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_max_respawn_attempts() -> u32 {
    10
}

const fn default_owner_idle_ticks() -> u64 {
    1
}

const fn default_park_position() -> [f32; 2] {
    [-1000.0, -1000.0]
}

fn default_cosmetic_items() -> Vec<i32> {
    vec![584]
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_tick_interval_ms() -> u64 {
    33
}

const fn default_max_ticks() -> u64 {
    300
}

const fn default_owners() -> u32 {
    2
}

const fn default_instances() -> u32 {
    2
}

const fn default_seed() -> u64 {
    42
}
