//! Carrier lifecycle: spawn, per-tick maintenance, retirement and the late
//! cull pass.
//!
//! A carrier moves through `Spawning -> Active` and ends in exactly one of
//! the terminal states of [`CarrierState`]. Maintenance runs on every
//! entity appear/update callback. It ignores carriers another engine
//! instance is still claiming and adopts indexed carriers whose previous
//! instance went quiet. It destroys carriers it tagged but no longer
//! indexes, kills duplicates of a carrier it already tracks, and otherwise
//! re-applies the concealment, checks expiry and checks that the owner link
//! still points at the right owner.
//!
//! The late cull runs after every instance has had its normal-priority
//! update. A marked carrier that nobody claimed on this frame has no living
//! engine instance behind it and is killed.

use stowaway_index::EffectBuilder;
use stowaway_types::{
    CarrierKey, CarrierState, EffectInstance, EngineTag, EntityHandle, ItemId, OwnerKey,
    RetireReason, Scope,
};
use tracing::{debug, info, warn};

use crate::host::{CarrierInfo, Host};
use crate::keys;
use crate::manager::{Grant, HiddenItemManager};

/// Attempts made per carrier when the host hands back a key that is
/// already taken.
const SPAWN_ATTEMPTS: u32 = 3;

/// Cached pointer from a carrier key to the host entity backing it.
///
/// Handles go stale whenever the host destroys the entity or reloads, so a
/// reference is only trusted after [`CarrierRef::resolve`] re-validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierRef {
    /// Host handle last seen for the carrier.
    pub handle: EntityHandle,
    /// Key the handle must still derive.
    pub key: CarrierKey,
}

impl CarrierRef {
    /// Create a reference.
    pub const fn new(handle: EntityHandle, key: CarrierKey) -> Self {
        Self { handle, key }
    }

    /// Re-validate the reference against the host.
    ///
    /// The entity must still exist, still derive the same key and carry
    /// either `tag` or no tag at all.
    pub fn resolve(&self, host: &dyn Host, tag: EngineTag) -> Option<CarrierInfo> {
        host.carrier(self.handle).filter(|info| {
            keys::carrier_key(info) == self.key && info.tag.is_none_or(|other| other == tag)
        })
    }
}

/// How maintenance treats an indexed carrier stamped by another engine
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ForeignTag {
    /// Adopt only when no instance claimed it this frame or the last one.
    Respect,
    /// Adopt unconditionally. Used by restore, where the restored state is
    /// the authority on which carriers belong to this instance.
    Adopt,
}

impl ForeignTag {
    fn allows(self, info: &CarrierInfo, frame: u64) -> bool {
        match self {
            Self::Adopt => true,
            Self::Respect => info
                .claimed_at
                .is_none_or(|at| at.saturating_add(1) < frame),
        }
    }
}

impl HiddenItemManager {
    // -----------------------------------------------------------------------
    // Spawn
    // -----------------------------------------------------------------------

    /// Ask the host for a carrier, stamp it and hide it.
    ///
    /// Retries when the new carrier's key collides with one this instance
    /// already tracks. Returns `None` if the host refuses or every attempt
    /// collides.
    pub(crate) fn spawn_hidden(
        &mut self,
        host: &mut dyn Host,
        owner: EntityHandle,
        item: ItemId,
    ) -> Option<CarrierInfo> {
        let frame = host.frame();
        for attempt in 1..=SPAWN_ATTEMPTS {
            let info = match host.spawn_carrier(owner, item) {
                Ok(info) => info,
                Err(err) => {
                    warn!(tag = %self.tag, %owner, %item, %err, "Carrier spawn failed");
                    return None;
                }
            };
            let key = keys::carrier_key(&info);
            if self.index.contains(&key) || self.carriers.contains_key(&key) {
                debug!(tag = %self.tag, %key, attempt, "Carrier key collision; respawning");
                host.silent_kill(info.handle);
                continue;
            }
            host.stamp(info.handle, self.tag);
            host.conceal(info.handle, self.concealment());
            host.claim(info.handle, frame);
            return Some(info);
        }
        warn!(tag = %self.tag, %owner, %item, "Gave up on colliding carrier keys");
        None
    }

    /// Spawn one carrier and index a new instance for it.
    pub(crate) fn create_instance(
        &mut self,
        host: &mut dyn Host,
        owner: EntityHandle,
        owner_key: &OwnerKey,
        grant: &Grant,
        scope: Scope,
    ) -> Option<CarrierKey> {
        let info = self.spawn_hidden(host, owner, grant.item)?;
        let key = keys::carrier_key(&info);
        let built = EffectBuilder::new(owner_key.clone(), grant.item)
            .carrier(key.clone())
            .group(grant.group.clone())
            .duration(grant.duration)
            .scope(scope)
            .created_at(host.frame())
            .build();
        let inserted = built.and_then(|effect| self.index.insert(effect));
        if let Err(err) = inserted {
            warn!(tag = %self.tag, %key, %err, "Could not index new carrier");
            host.silent_kill(info.handle);
            return None;
        }
        self.carriers
            .insert(key.clone(), CarrierRef::new(info.handle, key.clone()));
        Some(key)
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Per-entity maintenance. Returns the state the carrier ended up in,
    /// or `None` when the entity is not this instance's business.
    pub(crate) fn maintain(
        &mut self,
        host: &mut dyn Host,
        entity: EntityHandle,
    ) -> Option<CarrierState> {
        self.maintain_with(host, entity, ForeignTag::Respect)
    }

    /// [`Self::maintain`] with an explicit policy for carriers stamped by
    /// another engine instance.
    pub(crate) fn maintain_with(
        &mut self,
        host: &mut dyn Host,
        entity: EntityHandle,
        foreign: ForeignTag,
    ) -> Option<CarrierState> {
        let info = host.carrier(entity)?;
        let frame = host.frame();
        let key = keys::carrier_key(&info);
        if info.tag.is_some_and(|tag| tag != self.tag) {
            if !self.index.contains(&key) || !foreign.allows(&info, frame) {
                return None;
            }
            info!(
                tag = %self.tag,
                %key,
                %entity,
                "Adopting carrier stamped by another instance"
            );
        }

        let Some(effect) = self.index.get(&key) else {
            if info.tag == Some(self.tag) {
                debug!(tag = %self.tag, %key, "Destroying orphaned carrier");
                host.silent_kill(entity);
                return Some(CarrierState::Orphaned);
            }
            return None;
        };
        if effect.item != info.item {
            return None;
        }
        let owner_key = effect.owner.clone();
        let expired = effect.is_expired(frame);

        if let Some(existing) = self.carriers.get(&key) {
            if existing.handle != entity && existing.resolve(&*host, self.tag).is_some() {
                debug!(tag = %self.tag, %key, %entity, "Killing duplicate carrier");
                host.silent_kill(entity);
                return Some(CarrierState::Duplicate);
            }
        }

        host.stamp(entity, self.tag);
        host.conceal(entity, self.concealment());
        host.claim(entity, frame);
        self.carriers
            .insert(key.clone(), CarrierRef::new(entity, key.clone()));
        if self.index.mark_initialized(&key) {
            debug!(tag = %self.tag, %key, frame, "Carrier active");
        }

        if expired {
            self.retire(host, &key, RetireReason::Expired);
            return Some(CarrierState::Expired);
        }
        if self.severing.is_pending() {
            return Some(CarrierState::Active);
        }
        Some(self.validate_owner(host, &key, &info, &owner_key))
    }

    /// Check the carrier's owner link against the instance's owner key.
    fn validate_owner(
        &mut self,
        host: &mut dyn Host,
        key: &CarrierKey,
        info: &CarrierInfo,
        owner_key: &OwnerKey,
    ) -> CarrierState {
        match info.owner {
            Some(linked) => {
                let same_owner = host
                    .owner(linked)
                    .is_some_and(|owner| keys::owner_key_of(&owner) == *owner_key);
                if same_owner {
                    self.owners.remember(owner_key.clone(), linked);
                    return CarrierState::Active;
                }
                info!(tag = %self.tag, %key, owner = %owner_key, "Carrier owner replaced");
                self.retire(host, key, RetireReason::OwnerReplaced);
                CarrierState::OwnerLost
            }
            None => {
                if let Some(owner) = self.owners.resolve(&*host, owner_key) {
                    host.link_owner(info.handle, Some(owner));
                    return CarrierState::Active;
                }
                let purged = self.owners.purge_unresolvable(&*host);
                warn!(
                    tag = %self.tag,
                    %key,
                    owner = %owner_key,
                    purged = purged.len(),
                    "Carrier owner unresolvable; removing instance"
                );
                self.retire(host, key, RetireReason::OwnerUnresolvable);
                CarrierState::OwnerLost
            }
        }
    }

    /// Late-priority pass: kill marked carriers nobody claimed this frame.
    pub(crate) fn cull_unclaimed(
        &mut self,
        host: &mut dyn Host,
        entity: EntityHandle,
    ) -> Option<CarrierState> {
        let info = host.carrier(entity)?;
        if !info.marked || info.claimed_at == Some(host.frame()) {
            return None;
        }
        debug!(tag = %self.tag, %entity, "Culling unclaimed carrier");
        host.silent_kill(entity);
        Some(CarrierState::Orphaned)
    }

    // -----------------------------------------------------------------------
    // Retirement
    // -----------------------------------------------------------------------

    /// Drop an instance from every index and kill its carrier if it is
    /// still around.
    pub(crate) fn retire(
        &mut self,
        host: &mut dyn Host,
        key: &CarrierKey,
        reason: RetireReason,
    ) -> Option<EffectInstance> {
        let effect = self.index.remove(key)?;
        let cached = self.carriers.remove(key);
        if let Some(info) = cached.and_then(|carrier| carrier.resolve(&*host, self.tag)) {
            self.destroy_carrier(host, &info, &effect);
        }
        debug!(
            tag = %self.tag,
            %key,
            item = %effect.item,
            owner = %effect.owner,
            %reason,
            state = %reason.carrier_state(),
            "Instance retired"
        );
        Some(effect)
    }

    fn destroy_carrier(&self, host: &mut dyn Host, info: &CarrierInfo, effect: &EffectInstance) {
        if self.config.cosmetic_items.contains(&effect.item.into_inner()) {
            if let Some(owner) = info.owner.or(info.cached_owner) {
                host.undo_item_cosmetic(owner, effect.item);
            }
        }
        host.silent_kill(info.handle);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use stowaway_index::EffectIndex;
    use stowaway_types::{Group, OwnerVariant};

    use super::*;
    use crate::config::EngineConfig;
    use crate::sim::SimHost;

    fn setup() -> (SimHost, HiddenItemManager, EntityHandle) {
        let mut host = SimHost::new(5);
        let owner = host.add_owner(OwnerVariant::Standard);
        (host, HiddenItemManager::new(EngineConfig::default()), owner)
    }

    fn only_carrier(host: &SimHost) -> EntityHandle {
        host.carrier_handles().first().copied().unwrap()
    }

    #[test]
    fn maintain_keeps_carrier_hidden() {
        let (mut host, mut manager, owner) = setup();
        manager.add(&mut host, owner, &Grant::new(ItemId(5)));
        let carrier = only_carrier(&host);
        host.reveal(carrier);

        assert_eq!(
            manager.maintain(&mut host, carrier),
            Some(CarrierState::Active)
        );
        let state = host.carrier_state(carrier).unwrap();
        assert!(!state.visible);
        assert!(!state.collides);
        assert_eq!(
            state.position.map(f32::to_bits),
            manager.config().park_position.map(f32::to_bits)
        );
    }

    #[test]
    fn foreign_tag_is_ignored() {
        let (mut host, mut manager, owner) = setup();
        let mut other = HiddenItemManager::with_tag(EngineConfig::default(), EngineTag::new());
        other.add(&mut host, owner, &Grant::new(ItemId(5)));
        let carrier = only_carrier(&host);

        assert_eq!(manager.maintain(&mut host, carrier), None);
        assert!(host.carrier_state(carrier).is_some());
    }

    #[test]
    fn foreign_carrier_is_adopted_once_its_claim_goes_stale() {
        let (mut host, mut manager, owner) = setup();
        let mut other = HiddenItemManager::with_tag(EngineConfig::default(), EngineTag::new());
        other.add(&mut host, owner, &Grant::new(ItemId(5)));
        let carrier = only_carrier(&host);
        manager.index = EffectIndex::from_persisted(other.snapshot(), host.frame());

        host.advance_frame();
        assert_eq!(manager.maintain(&mut host, carrier), None);
        assert_eq!(host.carrier_state(carrier).unwrap().tag, Some(other.tag()));

        host.advance_frame();
        assert_eq!(
            manager.maintain(&mut host, carrier),
            Some(CarrierState::Active)
        );
        let state = host.carrier_state(carrier).unwrap();
        assert_eq!(state.tag, Some(manager.tag()));
        assert_eq!(state.claimed_at, Some(host.frame()));
    }

    #[test]
    fn tagged_but_unindexed_is_orphaned() {
        let (mut host, mut manager, owner) = setup();
        manager.add(&mut host, owner, &Grant::new(ItemId(5)));
        let carrier = only_carrier(&host);
        manager.index.clear();

        assert_eq!(
            manager.maintain(&mut host, carrier),
            Some(CarrierState::Orphaned)
        );
        assert!(host.carrier_state(carrier).is_none());
    }

    #[test]
    fn untagged_unknown_carrier_is_left_alone() {
        let (mut host, mut manager, owner) = setup();
        let stray = host.spawn_foreign_carrier(owner, ItemId(5), false);
        assert_eq!(manager.maintain(&mut host, stray), None);
        assert!(host.carrier_state(stray).is_some());
    }

    #[test]
    fn duplicate_is_killed() {
        let (mut host, mut manager, owner) = setup();
        manager.add(&mut host, owner, &Grant::new(ItemId(5)));
        let carrier = only_carrier(&host);
        let copy = host.duplicate_carrier(carrier).unwrap();

        assert_eq!(
            manager.maintain(&mut host, copy),
            Some(CarrierState::Duplicate)
        );
        assert!(host.carrier_state(copy).is_none());
        assert!(host.carrier_state(carrier).is_some());
    }

    #[test]
    fn expired_instance_retires() {
        let (mut host, mut manager, owner) = setup();
        manager.add(&mut host, owner, &Grant::new(ItemId(5)).duration(2));
        let carrier = only_carrier(&host);
        for _ in 0..3 {
            host.advance_frame();
        }
        assert_eq!(
            manager.maintain(&mut host, carrier),
            Some(CarrierState::Expired)
        );
        assert!(manager.is_empty());
        assert!(host.carrier_state(carrier).is_none());
    }

    #[test]
    fn replaced_owner_retires_instance() {
        let (mut host, mut manager, owner) = setup();
        let usurper = host.add_owner(OwnerVariant::Standard);
        manager.add(&mut host, owner, &Grant::new(ItemId(5)));
        let carrier = only_carrier(&host);
        host.link_owner(carrier, Some(usurper));

        assert_eq!(
            manager.maintain(&mut host, carrier),
            Some(CarrierState::OwnerLost)
        );
        assert!(manager.is_empty());
    }

    #[test]
    fn null_link_is_relinked() {
        let (mut host, mut manager, owner) = setup();
        manager.add(&mut host, owner, &Grant::new(ItemId(5)));
        let carrier = only_carrier(&host);
        host.link_owner(carrier, None);

        assert_eq!(
            manager.maintain(&mut host, carrier),
            Some(CarrierState::Active)
        );
        assert_eq!(host.carrier_state(carrier).unwrap().owner, Some(owner));
    }

    #[test]
    fn vanished_owner_retires_instance() {
        let (mut host, mut manager, owner) = setup();
        manager.add(&mut host, owner, &Grant::new(ItemId(5)));
        let carrier = only_carrier(&host);
        host.remove_owner(owner);

        assert_eq!(
            manager.maintain(&mut host, carrier),
            Some(CarrierState::OwnerLost)
        );
        assert!(manager.is_empty());
        assert!(host.carrier_state(carrier).is_none());
    }

    #[test]
    fn cosmetic_is_undone_on_retire() {
        let (mut host, mut manager, owner) = setup();
        let item = ItemId(manager.config().cosmetic_items.first().copied().unwrap());
        manager.add(&mut host, owner, &Grant::new(item));
        assert!(manager.remove(&mut host, owner, item, &Group::default()));
        assert_eq!(host.cosmetics_undone(), &[(owner, item)]);
    }

    #[test]
    fn cull_kills_unclaimed_marked_carriers() {
        let (mut host, mut manager, owner) = setup();
        let stale = host.spawn_foreign_carrier(owner, ItemId(5), true);
        host.advance_frame();
        assert_eq!(
            manager.cull_unclaimed(&mut host, stale),
            Some(CarrierState::Orphaned)
        );
        assert!(host.carrier_state(stale).is_none());
    }

    #[test]
    fn cull_spares_claimed_and_unmarked() {
        let (mut host, mut manager, owner) = setup();
        manager.add(&mut host, owner, &Grant::new(ItemId(5)));
        let mine = only_carrier(&host);
        let unmarked = host.spawn_foreign_carrier(owner, ItemId(6), false);

        assert_eq!(manager.cull_unclaimed(&mut host, mine), None);
        assert_eq!(manager.cull_unclaimed(&mut host, unmarked), None);
    }

    #[test]
    fn resolve_rejects_reused_handle() {
        let (mut host, mut manager, owner) = setup();
        manager.add(&mut host, owner, &Grant::new(ItemId(5)));
        let carrier = only_carrier(&host);
        let reference = CarrierRef::new(carrier, CarrierKey::from("carrier:0"));
        assert!(reference.resolve(&host, manager.tag()).is_none());
    }
}
