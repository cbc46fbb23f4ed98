//! The effect index: canonical records plus the derived group index.
//!
//! The [`EffectIndex`] is the source of truth for every hidden effect
//! instance an engine tracks. It holds one [`EffectInstance`] per carrier key
//! and keeps the [`GroupIndex`] projection in step on every mutation.
//!
//! # Design
//!
//! - **Canonical**: the carrier-key table is the only thing persisted.
//! - **Atomic**: inserting, removing and re-keying touch both tables inside
//!   one call, so callers never see them disagree.
//! - **Controlled mutation**: owner, group and item of a record are fixed
//!   once inserted; only lifecycle bookkeeping (failures, initialization,
//!   carrier request tick) can change in place.
//! - **Oldest first**: stacks are ordered by insertion; removal picks the
//!   smallest creation tick, and among equal ticks the first inserted.

use std::collections::BTreeMap;

use stowaway_types::{
    CarrierKey, EffectInstance, Group, ItemId, OwnerKey, PersistableState, Scope, StackKey,
};

use crate::consistency::{ConsistencyResult, verify_consistency};
use crate::{GroupIndex, IndexError};

/// Canonical table of effect instances with its group projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectIndex {
    /// Carrier key to instance record.
    effects: BTreeMap<CarrierKey, EffectInstance>,
    /// Derived `(owner, group, item)` projection.
    groups: GroupIndex,
}

impl EffectIndex {
    /// Create a new empty index.
    pub const fn new() -> Self {
        Self {
            effects: BTreeMap::new(),
            groups: GroupIndex::new(),
        }
    }

    /// Number of tracked instances.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Whether no instance is tracked.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Whether an instance is tracked under `key`.
    pub fn contains(&self, key: &CarrierKey) -> bool {
        self.effects.contains_key(key)
    }

    /// Look up the instance tracked under `key`.
    pub fn get(&self, key: &CarrierKey) -> Option<&EffectInstance> {
        self.effects.get(key)
    }

    /// Iterate every instance in carrier-key order.
    pub fn iter(&self) -> impl Iterator<Item = (&CarrierKey, &EffectInstance)> {
        self.effects.iter()
    }

    /// Point-in-time copy of every tracked carrier key.
    ///
    /// Sweeps that may remove instances iterate this copy.
    pub fn keys(&self) -> Vec<CarrierKey> {
        self.effects.keys().cloned().collect()
    }

    /// Read-only view of the group projection.
    pub const fn groups(&self) -> &GroupIndex {
        &self.groups
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Track a new instance under its carrier key.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DuplicateCarrier`] if the key is already tracked;
    /// a key is never shared by two instances.
    pub fn insert(&mut self, effect: EffectInstance) -> Result<(), IndexError> {
        if self.effects.contains_key(&effect.carrier) {
            return Err(IndexError::DuplicateCarrier(effect.carrier));
        }
        self.groups.insert(effect.stack_key(), effect.carrier.clone());
        self.effects.insert(effect.carrier.clone(), effect);
        Ok(())
    }

    /// Stop tracking the instance under `key`, removing it from both tables.
    pub fn remove(&mut self, key: &CarrierKey) -> Option<EffectInstance> {
        let effect = self.effects.remove(key)?;
        self.groups.remove(&effect.stack_key(), key);
        Some(effect)
    }

    /// Move the instance under `old` to a freshly spawned carrier `new`.
    ///
    /// Every recorded field carries over. The instance keeps its position in
    /// its stack, becomes uninitialized and records `frame` as its carrier
    /// request tick.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::MissingCarrier`] if `old` is not tracked, or
    /// [`IndexError::DuplicateCarrier`] if `new` already is.
    pub fn rekey(
        &mut self,
        old: &CarrierKey,
        new: CarrierKey,
        frame: u64,
    ) -> Result<(), IndexError> {
        if self.effects.contains_key(&new) {
            return Err(IndexError::DuplicateCarrier(new));
        }
        let mut effect = self
            .effects
            .remove(old)
            .ok_or_else(|| IndexError::MissingCarrier(old.clone()))?;
        let stack = effect.stack_key();
        if !self.groups.replace(&stack, old, new.clone()) {
            self.groups.insert(stack, new.clone());
        }
        effect.carrier = new.clone();
        effect.initialized = false;
        effect.spawned_at = frame;
        self.effects.insert(new, effect);
        Ok(())
    }

    /// Mark the instance under `key` as seen by a host callback.
    ///
    /// Returns `true` only on the first call after the carrier was
    /// requested (the `Spawning` to `Active` transition).
    pub fn mark_initialized(&mut self, key: &CarrierKey) -> bool {
        self.effects
            .get_mut(key)
            .is_some_and(|effect| !core::mem::replace(&mut effect.initialized, true))
    }

    /// Record one more consecutive carrier loss. Returns the new count.
    pub fn record_failure(&mut self, key: &CarrierKey) -> Option<u32> {
        let effect = self.effects.get_mut(key)?;
        effect.failures = effect.failures.saturating_add(1);
        Some(effect.failures)
    }

    /// Clear the consecutive-loss counter.
    pub fn reset_failures(&mut self, key: &CarrierKey) {
        if let Some(effect) = self.effects.get_mut(key) {
            effect.failures = 0;
        }
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.effects.clear();
        self.groups.clear();
    }

    /// Recompute the group projection from the canonical table.
    ///
    /// Stacks are rebuilt in creation-tick order, carrier-key order among
    /// equal ticks.
    pub fn rebuild_groups(&mut self) {
        self.groups.clear();
        let mut ordered: Vec<&EffectInstance> = self.effects.values().collect();
        ordered.sort_by_key(|effect| effect.created_at);
        for effect in ordered {
            self.groups.insert(effect.stack_key(), effect.carrier.clone());
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Carrier keys of one stack, oldest insertion first.
    pub fn stack(&self, stack: &StackKey) -> &[CarrierKey] {
        self.groups.members(stack)
    }

    /// Number of instances in one stack.
    pub fn count(&self, stack: &StackKey) -> u32 {
        self.groups.count(stack)
    }

    /// The instance of `stack` with the smallest creation tick. Among equal
    /// ticks the first inserted wins.
    pub fn oldest(&self, stack: &StackKey) -> Option<&CarrierKey> {
        let mut best: Option<(&CarrierKey, u64)> = None;
        for key in self.groups.members(stack) {
            let Some(effect) = self.effects.get(key) else {
                continue;
            };
            if best.is_none_or(|(_, created_at)| effect.created_at < created_at) {
                best = Some((key, effect.created_at));
            }
        }
        best.map(|(key, _)| key)
    }

    /// Item to count for every non-empty stack of `owner` in `group`.
    pub fn stacks(&self, owner: &OwnerKey, group: &Group) -> BTreeMap<ItemId, u32> {
        self.groups.stacks_for(owner, group)
    }

    /// Every carrier key held by `owner` in `group`.
    pub fn keys_for_owner(&self, owner: &OwnerKey, group: &Group) -> Vec<CarrierKey> {
        self.groups.keys_for(owner, group)
    }

    /// Keys of instances whose duration has elapsed at `frame`.
    pub fn expired(&self, frame: u64) -> Vec<CarrierKey> {
        self.effects
            .iter()
            .filter(|(_, effect)| effect.is_expired(frame))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Keys of instances whose scope satisfies `ends`.
    pub fn scoped(&self, ends: impl Fn(Scope) -> bool) -> Vec<CarrierKey> {
        self.effects
            .iter()
            .filter(|(_, effect)| ends(effect.scope))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Verify that the projection matches the canonical table.
    pub fn verify(&self) -> ConsistencyResult {
        verify_consistency(&self.effects, &self.groups)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Capture the canonical table in its persisted layout.
    pub fn to_persisted(&self) -> PersistableState {
        PersistableState {
            effects: self
                .effects
                .iter()
                .map(|(key, effect)| (key.clone(), effect.to_persisted()))
                .collect(),
        }
    }

    /// Rebuild an index from its persisted layout.
    ///
    /// Every instance comes back uninitialized with `frame` as its carrier
    /// request tick; the group projection is derived afresh.
    pub fn from_persisted(state: PersistableState, frame: u64) -> Self {
        let effects = state
            .effects
            .into_iter()
            .map(|(key, persisted)| {
                let effect = EffectInstance::from_persisted(key.clone(), persisted, frame);
                (key, effect)
            })
            .collect();
        let mut index = Self {
            effects,
            groups: GroupIndex::new(),
        };
        index.rebuild_groups();
        index
    }
}
