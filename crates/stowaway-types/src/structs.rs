//! Core record structs: the live effect instance and its persisted form.
//!
//! [`EffectInstance`] is what the effect index holds at runtime. Only the
//! subset captured by [`PersistedEffect`] ever reaches a save file; failure
//! counters, initialization state and host handles are rebuilt on restore.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::Scope;
use crate::ids::{CarrierKey, Group, ItemId, OwnerKey, StackKey};

// ---------------------------------------------------------------------------
// Effect instance
// ---------------------------------------------------------------------------

/// One stack of a hidden effect, backed by zero or one carrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectInstance {
    /// The item whose effect the carrier grants.
    pub item: ItemId,
    /// Namespace the instance belongs to.
    pub group: Group,
    /// Lifetime in host ticks. `None` means infinite.
    pub duration: Option<u64>,
    /// Room/floor scope.
    pub scope: Scope,
    /// Host tick at which the instance was created.
    pub created_at: u64,
    /// Consecutive ticks on which the carrier could not be resolved.
    pub failures: u32,
    /// Whether a host callback has seen the current carrier.
    pub initialized: bool,
    /// Owner the effect is granted to.
    pub owner: OwnerKey,
    /// Key of the carrier currently backing the instance.
    pub carrier: CarrierKey,
    /// Host tick at which the current carrier was requested (spawned,
    /// respawned or restored). Not persisted.
    pub spawned_at: u64,
}

impl EffectInstance {
    /// The composite group-index key of this instance.
    pub fn stack_key(&self) -> StackKey {
        StackKey::new(self.owner.clone(), self.group.clone(), self.item)
    }

    /// Whether the duration has elapsed at `frame`.
    ///
    /// An instance expires once `created_at + duration < frame`. Infinite
    /// instances never expire, and neither do instances whose deadline
    /// overflows the tick counter.
    pub fn is_expired(&self, frame: u64) -> bool {
        self.duration
            .and_then(|ticks| self.created_at.checked_add(ticks))
            .is_some_and(|deadline| deadline < frame)
    }

    /// Whether the instance was created with a non-positive item id.
    pub const fn is_suspect(&self) -> bool {
        !self.item.is_valid()
    }

    /// Capture the persisted subset of this instance.
    pub fn to_persisted(&self) -> PersistedEffect {
        PersistedEffect {
            item: self.item,
            group: self.group.clone(),
            duration: self.duration,
            room_scoped: self.scope.is_room_scoped(),
            floor_scoped: self.scope.is_floor_scoped(),
            created_at: self.created_at,
            owner: self.owner.clone(),
        }
    }

    /// Rebuild a live instance from its persisted form.
    ///
    /// The instance comes back uninitialized with a clean failure counter;
    /// `frame` becomes its `spawned_at` so reconciliation grants the host one
    /// tick to re-announce the surviving carrier.
    pub fn from_persisted(carrier: CarrierKey, persisted: PersistedEffect, frame: u64) -> Self {
        Self {
            item: persisted.item,
            group: persisted.group,
            duration: persisted.duration,
            scope: Scope::from_flags(persisted.room_scoped, persisted.floor_scoped),
            created_at: persisted.created_at,
            failures: 0,
            initialized: false,
            owner: persisted.owner,
            carrier,
            spawned_at: frame,
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted layout
// ---------------------------------------------------------------------------

/// The persisted fields of one effect instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PersistedEffect {
    /// Item id.
    pub item: ItemId,
    /// Group name.
    pub group: Group,
    /// Lifetime in ticks; `null` for infinite.
    pub duration: Option<u64>,
    /// Ends on room change.
    pub room_scoped: bool,
    /// Ends on floor change.
    pub floor_scoped: bool,
    /// Creation tick.
    pub created_at: u64,
    /// Owner key.
    pub owner: OwnerKey,
}

/// Everything the engine needs to survive a save/continue cycle.
///
/// Only the effect index is stored; the group index is derived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PersistableState {
    /// Carrier key to effect record.
    pub effects: BTreeMap<CarrierKey, PersistedEffect>,
}

impl PersistableState {
    /// Return the number of persisted effect instances.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Return whether nothing was persisted.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}
