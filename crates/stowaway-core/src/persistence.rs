//! Snapshot and restore of the effect index across save/continue.
//!
//! Only the effect index is persisted. Carrier handles, the group index,
//! failure counters and initialization flags are runtime-only: the group
//! index is rebuilt from the restored records, and carriers are
//! re-attached by re-deriving each live carrier's key. Restored instances
//! without a matching carrier stay uninitialized until reconciliation
//! respawns them.
//!
//! The serialized form is JSON. An empty or blank payload, like a missing
//! snapshot file, means a fresh run.

use std::path::{Path, PathBuf};

use stowaway_index::EffectIndex;
use stowaway_types::{CarrierState, PersistableState};
use tracing::{debug, info};

use crate::guards::SeveringState;
use crate::host::Host;
use crate::lifecycle::ForeignTag;
use crate::manager::HiddenItemManager;

/// Errors that can occur while encoding, decoding or storing snapshots.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The payload is not a valid snapshot.
    #[error("invalid snapshot payload: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The snapshot file could not be read or written.
    #[error("snapshot file {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Serialize a snapshot to JSON.
///
/// # Errors
///
/// Returns [`PersistenceError::Json`] if serialization fails.
pub fn encode(state: &PersistableState) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string_pretty(state)?)
}

/// Parse a snapshot. Blank input means there is nothing to restore.
///
/// # Errors
///
/// Returns [`PersistenceError::Json`] if the payload is malformed.
pub fn decode(raw: &str) -> Result<Option<PersistableState>, PersistenceError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(raw)?))
}

/// A snapshot stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Point at `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing or empty file means a fresh run.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Io`] if the file exists but cannot be
    /// read, or [`PersistenceError::Json`] if it is malformed.
    pub fn load(&self) -> Result<Option<PersistableState>, PersistenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => decode(&raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Write the snapshot, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Io`] if the file cannot be written.
    pub fn save(&self, state: &PersistableState) -> Result<(), PersistenceError> {
        let raw = encode(state)?;
        std::fs::write(&self.path, raw).map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl HiddenItemManager {
    /// Capture the effect index for saving.
    pub fn snapshot(&self) -> PersistableState {
        let state = self.index.to_persisted();
        debug!(tag = %self.tag, effects = state.len(), "Snapshot taken");
        state
    }

    /// Replace all state with `state` (or nothing) and re-attach live
    /// carriers.
    ///
    /// Every carrier in the host runs through maintenance once: carriers
    /// whose key is in the restored index are claimed (even when another
    /// instance stamped them), carriers this instance tagged but no longer
    /// indexes are destroyed, and everything else is left alone. Owner
    /// sightings from the previous session are dropped.
    pub fn restore(&mut self, host: &mut dyn Host, state: Option<PersistableState>) {
        let frame = host.frame();
        self.index = state.map_or_else(EffectIndex::new, |state| {
            EffectIndex::from_persisted(state, frame)
        });
        self.carriers.clear();
        self.owners.clear();
        self.severing = SeveringState::default();

        let mut reattached: usize = 0;
        let mut destroyed: u32 = 0;
        for carrier in host.carriers() {
            match self.maintain_with(host, carrier.handle, ForeignTag::Adopt) {
                Some(CarrierState::Active) => reattached = reattached.saturating_add(1),
                Some(_) => destroyed = destroyed.saturating_add(1),
                None => {}
            }
        }
        let pending = self.index.len().saturating_sub(reattached);
        info!(
            tag = %self.tag,
            frame,
            restored = self.index.len(),
            reattached,
            destroyed,
            pending,
            "Effect index restored"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use stowaway_types::{Group, ItemId, OwnerVariant};

    use super::*;
    use crate::config::EngineConfig;
    use crate::manager::Grant;
    use crate::sim::SimHost;

    #[test]
    fn blank_payload_is_fresh_run() {
        assert!(decode("").unwrap().is_none());
        assert!(decode("  \n").unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(matches!(
            decode("{ not json"),
            Err(PersistenceError::Json { .. })
        ));
    }

    #[test]
    fn missing_file_is_fresh_run() {
        let file = SnapshotFile::new(
            std::env::temp_dir().join(format!("stowaway-missing-{}.json", uuid::Uuid::now_v7())),
        );
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn file_round_trip() {
        let mut host = SimHost::new(31);
        let owner = host.add_owner(OwnerVariant::Standard);
        let mut manager = HiddenItemManager::new(EngineConfig::default());
        manager.add(&mut host, owner, &Grant::new(ItemId(5)).count(2).duration(600));

        let file = SnapshotFile::new(
            std::env::temp_dir().join(format!("stowaway-{}.json", uuid::Uuid::now_v7())),
        );
        let state = manager.snapshot();
        file.save(&state).unwrap();
        assert_eq!(file.load().unwrap(), Some(state));
        std::fs::remove_file(file.path()).unwrap();
    }

    #[test]
    fn restore_reattaches_live_carriers() {
        let mut host = SimHost::new(31);
        let owner = host.add_owner(OwnerVariant::Standard);
        let mut manager = HiddenItemManager::new(EngineConfig::default());
        manager.add(&mut host, owner, &Grant::new(ItemId(5)).count(2));
        let saved = decode(&encode(&manager.snapshot()).unwrap()).unwrap();

        host.reload();
        let mut fresh = HiddenItemManager::new(EngineConfig::default());
        fresh.restore(&mut host, saved);

        assert_eq!(fresh.count_stack(&host, owner, ItemId(5), &Group::default()), 2);
        assert!(fresh.index().iter().all(|(_, effect)| effect.initialized));
        for carrier in host.carrier_handles() {
            assert_eq!(host.carrier_state(carrier).unwrap().tag, Some(fresh.tag()));
        }
    }

    #[test]
    fn restore_nothing_destroys_own_carriers() {
        let mut host = SimHost::new(31);
        let owner = host.add_owner(OwnerVariant::Standard);
        let mut manager = HiddenItemManager::new(EngineConfig::default());
        manager.add(&mut host, owner, &Grant::new(ItemId(5)));

        manager.restore(&mut host, None);
        assert!(manager.is_empty());
        assert!(host.carrier_handles().is_empty());
    }

    #[test]
    fn restore_forgets_owner_sightings() {
        let mut host = SimHost::new(31);
        let owner = host.add_owner(OwnerVariant::Standard);
        let mut manager = HiddenItemManager::new(EngineConfig::default());
        manager.add(&mut host, owner, &Grant::new(ItemId(5)));
        manager.observe_owner(&host, owner);
        assert!(!manager.owners.is_empty());

        manager.restore(&mut host, None);
        assert!(manager.owners.is_empty());
    }

    #[test]
    fn restore_adopts_carriers_stamped_this_frame() {
        let mut host = SimHost::new(31);
        let owner = host.add_owner(OwnerVariant::Standard);
        let mut previous = HiddenItemManager::new(EngineConfig::default());
        previous.add(&mut host, owner, &Grant::new(ItemId(5)).count(2));
        let saved = previous.snapshot();

        let mut successor = HiddenItemManager::new(EngineConfig::default());
        successor.restore(&mut host, Some(saved));

        assert_eq!(host.carrier_handles().len(), 2);
        for carrier in host.carrier_handles() {
            assert_eq!(host.carrier_state(carrier).unwrap().tag, Some(successor.tag()));
        }
        assert_eq!(successor.count_stack(&host, owner, ItemId(5), &Group::default()), 2);
    }
}
