//! Guards against host behaviour that would otherwise expose, damage or
//! disown carriers.
//!
//! - **Ownership severing.** Some interactions null every carrier's owner
//!   link for a moment. The owner is cached on the carrier when the
//!   interaction begins and restored when it ends. If the end callback
//!   never arrives, a watchdog completes the interaction on the next tick.
//! - **Global reset.** Other interactions wipe every minion. The indices are
//!   cleared and every carrier is pushed through maintenance once, so it is
//!   recognised as orphaned and killed cleanly.
//! - **Projectiles and damage.** Carriers never fire, never take damage and
//!   never collide.

use stowaway_types::{EntityHandle, RetireReason};
use tracing::{debug, info, warn};

use crate::host::Host;
use crate::keys;
use crate::manager::HiddenItemManager;

/// Progress of an ownership-severing interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeveringState {
    begun_at: Option<u64>,
}

impl SeveringState {
    /// Whether an interaction began and has not ended.
    pub const fn is_pending(&self) -> bool {
        self.begun_at.is_some()
    }

    /// Frame the pending interaction began on.
    pub const fn begun_at(&self) -> Option<u64> {
        self.begun_at
    }
}

/// Whether `entity` is a carrier some engine instance manages.
pub fn is_managed(host: &dyn Host, entity: EntityHandle) -> bool {
    host.carrier(entity).is_some_and(|info| info.marked)
}

impl HiddenItemManager {
    // -----------------------------------------------------------------------
    // Ownership severing
    // -----------------------------------------------------------------------

    /// Cache each carrier's owner on the carrier and null the link.
    pub(crate) fn begin_severing(&mut self, host: &mut dyn Host) {
        if self.severing.is_pending() {
            warn!(tag = %self.tag, "Ownership severing began twice; completing the first");
            self.end_severing(host);
        }
        let frame = host.frame();
        let mut cached: u32 = 0;
        for carrier in self.carriers.values() {
            let Some(info) = carrier.resolve(&*host, self.tag) else {
                continue;
            };
            host.cache_owner(info.handle, info.owner);
            host.link_owner(info.handle, None);
            cached = cached.saturating_add(1);
        }
        self.severing = SeveringState {
            begun_at: Some(frame),
        };
        debug!(tag = %self.tag, frame, cached, "Ownership severing began");
    }

    /// Restore every carrier's owner link from its cache, falling back to a
    /// key lookup. Instances whose owner cannot be found are retired.
    pub(crate) fn end_severing(&mut self, host: &mut dyn Host) {
        if !self.severing.is_pending() {
            return;
        }
        self.severing = SeveringState::default();

        let mut restored: u32 = 0;
        let mut lost = Vec::new();
        for key in self.index.keys() {
            let Some(effect) = self.index.get(&key) else {
                continue;
            };
            let owner_key = effect.owner.clone();
            let Some(info) = self
                .carriers
                .get(&key)
                .and_then(|carrier| carrier.resolve(&*host, self.tag))
            else {
                continue;
            };

            let cached = info.cached_owner.filter(|owner| {
                host.owner(*owner)
                    .is_some_and(|owner| keys::owner_key_of(&owner) == owner_key)
            });
            let owner = match cached {
                Some(owner) => Some(owner),
                None => self.owners.resolve(&*host, &owner_key),
            };
            match owner {
                Some(owner) => {
                    host.link_owner(info.handle, Some(owner));
                    host.cache_owner(info.handle, None);
                    restored = restored.saturating_add(1);
                }
                None => lost.push(key),
            }
        }
        let retired = self.retire_all(host, &lost, RetireReason::OwnerUnresolvable);
        debug!(tag = %self.tag, restored, retired, "Ownership severing ended");
    }

    /// Complete a severing interaction whose end callback never arrived.
    pub(crate) fn severing_watchdog(&mut self, host: &mut dyn Host) {
        let frame = host.frame();
        let Some(begun) = self.severing.begun_at() else {
            return;
        };
        if begun < frame {
            warn!(
                tag = %self.tag,
                begun,
                frame,
                "Ownership severing never completed; forcing completion"
            );
            self.end_severing(host);
        }
    }

    // -----------------------------------------------------------------------
    // Global reset
    // -----------------------------------------------------------------------

    /// Drop every instance, then run each former carrier through
    /// maintenance so it is destroyed as an orphan.
    pub(crate) fn global_reset(&mut self, host: &mut dyn Host) {
        let handles: Vec<EntityHandle> = self
            .carriers
            .values()
            .map(|carrier| carrier.handle)
            .collect();
        let dropped = self.index.len();
        self.index.clear();
        self.carriers.clear();
        self.owners.clear();
        self.severing = SeveringState::default();
        info!(
            tag = %self.tag,
            reason = %RetireReason::GlobalReset,
            dropped,
            "All hidden items cleared"
        );
        for handle in handles {
            self.maintain(host, handle);
        }
    }

    // -----------------------------------------------------------------------
    // Projectiles, damage and collision
    // -----------------------------------------------------------------------

    /// Remove a projectile fired by a managed carrier. Returns whether it
    /// was removed.
    pub(crate) fn suppress_projectile(
        &self,
        host: &mut dyn Host,
        projectile: EntityHandle,
        spawner: Option<EntityHandle>,
    ) -> bool {
        let Some(spawner) = spawner else {
            return false;
        };
        if !is_managed(&*host, spawner) {
            return false;
        }
        debug!(tag = %self.tag, %projectile, %spawner, "Removing carrier projectile");
        host.remove_projectile(projectile);
        true
    }
}
