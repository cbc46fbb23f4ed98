//! Owner directory: last-known handle and activity per owner key.
//!
//! Owner handles are not stable across reloads, so the engine tracks owners
//! by [`OwnerKey`] and resolves them back to a live handle on demand. The
//! directory caches the last handle seen for each key and the last frame on
//! which the host delivered an owner update for it.

use std::collections::BTreeMap;

use stowaway_types::{EntityHandle, OwnerKey};
use tracing::debug;

use crate::host::Host;
use crate::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sighting {
    handle: EntityHandle,
    last_update: Option<u64>,
}

/// Tracks owners by key.
#[derive(Debug, Clone, Default)]
pub struct OwnerDirectory {
    sightings: BTreeMap<OwnerKey, Sighting>,
}

impl OwnerDirectory {
    /// Create an empty directory.
    pub const fn new() -> Self {
        Self {
            sightings: BTreeMap::new(),
        }
    }

    /// Number of tracked owners.
    pub fn len(&self) -> usize {
        self.sightings.len()
    }

    /// Whether no owner is tracked.
    pub fn is_empty(&self) -> bool {
        self.sightings.is_empty()
    }

    /// Record an owner update callback on `frame`.
    pub fn observe(&mut self, key: OwnerKey, handle: EntityHandle, frame: u64) {
        self.sightings.insert(
            key,
            Sighting {
                handle,
                last_update: Some(frame),
            },
        );
    }

    /// Remember the handle behind `key` without counting it as an update.
    pub fn remember(&mut self, key: OwnerKey, handle: EntityHandle) {
        self.sightings
            .entry(key)
            .and_modify(|sighting| sighting.handle = handle)
            .or_insert(Sighting {
                handle,
                last_update: None,
            });
    }

    /// Whether the owner received an update within `idle_ticks` of `frame`.
    pub fn is_active(&self, key: &OwnerKey, frame: u64, idle_ticks: u64) -> bool {
        self.sightings
            .get(key)
            .and_then(|sighting| sighting.last_update)
            .is_some_and(|seen| frame.saturating_sub(seen) <= idle_ticks)
    }

    /// Resolve `key` to a live owner handle.
    ///
    /// Tries the cached handle first, then scans every owner in the host.
    /// A successful scan refreshes the cache.
    pub fn resolve(&mut self, host: &dyn Host, key: &OwnerKey) -> Option<EntityHandle> {
        if let Some(sighting) = self.sightings.get(key) {
            let still_valid = host
                .owner(sighting.handle)
                .is_some_and(|info| keys::owner_key_of(&info) == *key);
            if still_valid {
                return Some(sighting.handle);
            }
        }

        let handle = host
            .owners()
            .into_iter()
            .find(|info| keys::owner_key_of(info) == *key)
            .map(|info| info.handle)?;
        self.remember(key.clone(), handle);
        Some(handle)
    }

    /// Drop every tracked owner that no longer resolves. Returns the keys
    /// that were dropped.
    pub fn purge_unresolvable(&mut self, host: &dyn Host) -> Vec<OwnerKey> {
        let live: Vec<OwnerKey> = host.owners().iter().map(keys::owner_key_of).collect();
        let stale: Vec<OwnerKey> = self
            .sightings
            .keys()
            .filter(|key| !live.contains(key))
            .cloned()
            .collect();
        for key in &stale {
            self.sightings.remove(key);
            debug!(owner = %key, "Dropped stale owner reference");
        }
        stale
    }

    /// Forget every owner.
    pub fn clear(&mut self) {
        self.sightings.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use stowaway_types::OwnerVariant;

    use super::*;
    use crate::sim::SimHost;

    #[test]
    fn activity_window() {
        let mut directory = OwnerDirectory::new();
        let key = OwnerKey::from("owner:1");
        assert!(!directory.is_active(&key, 5, 1));

        directory.observe(key.clone(), EntityHandle(1), 5);
        assert!(directory.is_active(&key, 5, 1));
        assert!(directory.is_active(&key, 6, 1));
        assert!(!directory.is_active(&key, 7, 1));
    }

    #[test]
    fn remember_does_not_mark_active() {
        let mut directory = OwnerDirectory::new();
        let key = OwnerKey::from("owner:1");
        directory.remember(key.clone(), EntityHandle(1));
        assert_eq!(directory.len(), 1);
        assert!(!directory.is_active(&key, 0, 1));
    }

    #[test]
    fn resolve_scans_when_cache_is_stale() {
        let mut host = SimHost::new(3);
        let owner = host.add_owner(OwnerVariant::Standard);
        let key = keys::owner_key(&host, owner).unwrap();

        let mut directory = OwnerDirectory::new();
        directory.remember(key.clone(), EntityHandle(9999));
        assert_eq!(directory.resolve(&host, &key), Some(owner));
        assert_eq!(directory.resolve(&host, &key), Some(owner));
    }

    #[test]
    fn purge_drops_departed_owners() {
        let mut host = SimHost::new(3);
        let stays = host.add_owner(OwnerVariant::Standard);
        let leaves = host.add_owner(OwnerVariant::Standard);
        let stays_key = keys::owner_key(&host, stays).unwrap();
        let leaves_key = keys::owner_key(&host, leaves).unwrap();

        let mut directory = OwnerDirectory::new();
        directory.observe(stays_key.clone(), stays, 1);
        directory.observe(leaves_key.clone(), leaves, 1);
        host.remove_owner(leaves);

        assert_eq!(directory.purge_unresolvable(&host), vec![leaves_key]);
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.resolve(&host, &stays_key), Some(stays));
    }
}
