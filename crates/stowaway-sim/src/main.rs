//! Simulation binary for the hidden item engine.
//!
//! Wires a simulated host to one or more [`HiddenItemManager`] instances
//! and replays a scripted scenario against them on a fixed tick interval.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the path given as the first argument, or
//!    `stowaway-config.yaml` in the working directory
//! 2. Initialize structured logging (tracing)
//! 3. Build the host, its owners and the engine instances
//! 4. Continue from the saved snapshots, if any, or start fresh
//! 5. Run the scenario until the tick budget is spent or Ctrl-C
//! 6. Save one snapshot per instance
//!
//! [`HiddenItemManager`]: stowaway_core::HiddenItemManager

mod error;
mod scenario;

use std::path::{Path, PathBuf};
use std::time::Duration;

use stowaway_core::config::{LoggingConfig, StowawayConfig};
use stowaway_core::persistence::SnapshotFile;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::SimError;
use crate::scenario::{Scenario, Stage};

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG: &str = "stowaway-config.yaml";

/// Ticks between summary log lines.
const SUMMARY_EVERY: u64 = 30;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration or a snapshot cannot be loaded,
/// or a snapshot cannot be saved.
#[tokio::main]
async fn main() -> Result<(), SimError> {
    // 1. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let found = config_path.exists();
    let config = if found {
        StowawayConfig::from_file(&config_path)?
    } else {
        StowawayConfig::parse("")?
    };

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("stowaway-sim starting");
    if found {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        max_respawn_attempts = config.engine.max_respawn_attempts,
        owner_idle_ticks = config.engine.owner_idle_ticks,
        tick_interval_ms = config.simulation.tick_interval_ms,
        max_ticks = config.simulation.max_ticks,
        owners = config.simulation.owners,
        instances = config.simulation.instances,
        seed = config.simulation.seed,
        "Simulation parameters"
    );

    // 3. Build the world.
    let mut stage = Stage::new(&config);
    let mut scenario = Scenario::scripted(config.simulation.seed);

    // 4. Continue or start fresh.
    let snapshots = snapshot_files(config.simulation.snapshot_path.as_deref(), stage.instances());
    let states = snapshots
        .iter()
        .map(SnapshotFile::load)
        .collect::<Result<Vec<_>, _>>()?;
    let continued = states.iter().filter(|state| state.is_some()).count();
    stage.start(states);
    info!(instances = stage.instances(), continued, "Session started");

    // 5. Run the scenario.
    let interval = Duration::from_millis(config.simulation.tick_interval_ms);
    let mut ticks: u64 = 0;
    while ticks < config.simulation.max_ticks {
        let frame = stage.tick(&mut scenario);
        ticks = ticks.saturating_add(1);
        if frame.checked_rem(SUMMARY_EVERY) == Some(0) {
            stage.log_summary();
        }
        if interval.is_zero() {
            continue;
        }
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!(ticks, "Interrupted");
                break;
            }
        }
    }
    stage.log_summary();

    // 6. Save.
    for (file, state) in snapshots.iter().zip(stage.snapshots()) {
        file.save(&state)?;
        info!(path = %file.path().display(), effects = state.len(), "Snapshot saved");
    }

    info!(ticks, "stowaway-sim shutdown complete");
    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// One snapshot file per engine instance, derived from the configured
/// path. Empty when persistence is disabled.
fn snapshot_files(base: Option<&str>, instances: usize) -> Vec<SnapshotFile> {
    base.map_or_else(Vec::new, |base| {
        (0..instances)
            .map(|index| SnapshotFile::new(instance_path(Path::new(base), index)))
            .collect()
    })
}

/// `snap.json` becomes `snap-0.json`, `snap-1.json`, ...
fn instance_path(base: &Path, index: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map_or_else(|| "snapshot".to_owned(), |stem| stem.to_string_lossy().into_owned());
    let name = match base.extension() {
        Some(ext) => format!("{stem}-{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{index}"),
    };
    base.with_file_name(name)
}
