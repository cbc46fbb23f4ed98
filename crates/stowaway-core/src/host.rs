//! Host engine abstraction.
//!
//! The host owns every entity: it creates carriers, simulates and renders
//! them, and may destroy them at any time without notice. The [`Host`] trait
//! is the narrow surface the engine needs to observe and steer those
//! entities. It could be backed by a real game runtime, a scripting bridge,
//! or the in-memory [`SimHost`](crate::sim::SimHost) used by tests and the
//! simulation binary.
//!
//! Every accessor returns a point-in-time copy ([`OwnerInfo`],
//! [`CarrierInfo`]); nothing handed out here stays valid across a tick.

use stowaway_types::{EngineTag, EntityHandle, EntityKind, ItemId, OwnerVariant};

/// Errors the host can report when asked to create an entity.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The referenced entity does not exist (or is not the expected kind).
    #[error("unknown entity {0}")]
    UnknownEntity(EntityHandle),

    /// The host refused to spawn the carrier.
    #[error("host refused to spawn carrier for item {item}: {reason}")]
    SpawnRejected {
        /// The item the carrier was meant to grant.
        item: ItemId,
        /// Host-supplied explanation.
        reason: String,
    },
}

/// Snapshot of a player-like actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerInfo {
    /// Host handle of the owner.
    pub handle: EntityHandle,
    /// Variant, which decides which seed keys the owner.
    pub variant: OwnerVariant,
    /// Secondary seed that survives save/continue.
    pub stable_seed: u64,
    /// Seed that stays distinct across an in-place identity flip.
    pub alternate_seed: u64,
}

/// Snapshot of a carrier minion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarrierInfo {
    /// Host handle of the carrier.
    pub handle: EntityHandle,
    /// Creation seed; the carrier key derives from it.
    pub seed: u64,
    /// The item whose effect the carrier grants.
    pub item: ItemId,
    /// Owner the carrier is currently linked to.
    pub owner: Option<EntityHandle>,
    /// Owner cached on the carrier while the link is severed.
    pub cached_owner: Option<EntityHandle>,
    /// Persistent marker: some engine instance once managed this carrier.
    /// Survives save/continue.
    pub marked: bool,
    /// Transient tag of the engine instance managing it. Lost on reload.
    pub tag: Option<EngineTag>,
    /// Last frame on which any engine instance claimed the carrier.
    pub claimed_at: Option<u64>,
}

/// How a carrier is hidden.
///
/// Applying a concealment makes the carrier non-collidable and invisible,
/// parks it at `park_at` with zero velocity, strips its reward/appear flags
/// and detaches it from any orbit grouping around its owner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Concealment {
    /// Off-screen coordinate the carrier is parked at.
    pub park_at: [f32; 2],
}

/// The host game simulation, as seen by the engine.
pub trait Host {
    /// Current host tick.
    fn frame(&self) -> u64;

    /// Classify an entity, or `None` if it no longer exists.
    fn kind_of(&self, entity: EntityHandle) -> Option<EntityKind>;

    /// Look up an owner.
    fn owner(&self, entity: EntityHandle) -> Option<OwnerInfo>;

    /// Every owner currently in the world, active or not.
    fn owners(&self) -> Vec<OwnerInfo>;

    /// Look up a carrier.
    fn carrier(&self, entity: EntityHandle) -> Option<CarrierInfo>;

    /// Every carrier currently in the world, managed or not.
    fn carriers(&self) -> Vec<CarrierInfo>;

    /// Create a carrier granting `item`, linked to `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the owner is gone or the host refuses.
    fn spawn_carrier(&mut self, owner: EntityHandle, item: ItemId)
    -> Result<CarrierInfo, HostError>;

    /// Stamp the engine tag and the persistent managed marker.
    fn stamp(&mut self, carrier: EntityHandle, tag: EngineTag);

    /// Record that an engine instance claimed the carrier on `frame`.
    fn claim(&mut self, carrier: EntityHandle, frame: u64);

    /// Force the carrier into its hidden, inert state.
    fn conceal(&mut self, carrier: EntityHandle, concealment: Concealment);

    /// Set or clear the carrier's owner link.
    fn link_owner(&mut self, carrier: EntityHandle, owner: Option<EntityHandle>);

    /// Set or clear the owner cached on the carrier.
    fn cache_owner(&mut self, carrier: EntityHandle, owner: Option<EntityHandle>);

    /// Undo the cosmetic a carrier of `item` leaves on its owner.
    fn undo_item_cosmetic(&mut self, owner: EntityHandle, item: ItemId);

    /// Remove orbit and visual effects, then kill the carrier without death
    /// animation or sound.
    fn silent_kill(&mut self, carrier: EntityHandle);

    /// Remove a projectile before it does anything.
    fn remove_projectile(&mut self, projectile: EntityHandle);
}
