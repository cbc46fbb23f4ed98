//! In-memory host used by the test suites and the simulation binary.
//!
//! [`SimHost`] keeps owners, carriers and projectiles in ordered maps and
//! replays the host callback sequence one tick at a time through an
//! [`EventBus`]. It also exposes the host misbehaviour the engine has to
//! survive: carriers vanishing without notice, duplicated carriers, owners
//! leaving or flipping form, reloads that drop transient tags, and
//! interactions that sever ownership or wipe every minion.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stowaway_types::{
    EngineTag, EntityHandle, EntityKind, InteractionKind, ItemId, OwnerVariant,
};

use crate::events::{EventBus, HostEvent, Outcome, Subscriber};
use crate::host::{CarrierInfo, Concealment, Host, HostError, OwnerInfo};

/// A simulated owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimOwner {
    /// Owner variant.
    pub variant: OwnerVariant,
    /// Seed shared by both forms of a flipping owner.
    pub stable_seed: u64,
    /// Seed unique to this form.
    pub alternate_seed: u64,
    /// Inactive owners exist but receive no update callbacks.
    pub active: bool,
}

/// A simulated carrier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimCarrier {
    /// Creation seed.
    pub seed: u64,
    /// Granted item.
    pub item: ItemId,
    /// Owner link.
    pub owner: Option<EntityHandle>,
    /// Owner cached on the entity.
    pub cached_owner: Option<EntityHandle>,
    /// Persistent managed marker.
    pub marked: bool,
    /// Transient engine tag.
    pub tag: Option<EngineTag>,
    /// Last claim frame.
    pub claimed_at: Option<u64>,
    /// Rendered.
    pub visible: bool,
    /// Takes part in collisions.
    pub collides: bool,
    /// World position.
    pub position: [f32; 2],
    /// Velocity.
    pub velocity: [f32; 2],
    /// Drops rewards and plays its appear animation.
    pub grants_rewards: bool,
    /// Part of the orbit grouping around its owner.
    pub orbiting: bool,
}

impl SimCarrier {
    const fn info(&self, handle: EntityHandle) -> CarrierInfo {
        CarrierInfo {
            handle,
            seed: self.seed,
            item: self.item,
            owner: self.owner,
            cached_owner: self.cached_owner,
            marked: self.marked,
            tag: self.tag,
            claimed_at: self.claimed_at,
        }
    }
}

/// In-memory host.
#[derive(Debug)]
pub struct SimHost {
    frame: u64,
    next_handle: u64,
    rng: StdRng,
    owners: BTreeMap<EntityHandle, SimOwner>,
    carriers: BTreeMap<EntityHandle, SimCarrier>,
    projectiles: BTreeSet<EntityHandle>,
    pending: Vec<HostEvent>,
    forced_seeds: VecDeque<u64>,
    reject_spawns: bool,
    cosmetics_undone: Vec<(EntityHandle, ItemId)>,
    kills: u64,
}

impl SimHost {
    /// Create an empty world at frame 0.
    pub fn new(seed: u64) -> Self {
        Self {
            frame: 0,
            next_handle: 1,
            rng: StdRng::seed_from_u64(seed),
            owners: BTreeMap::new(),
            carriers: BTreeMap::new(),
            projectiles: BTreeSet::new(),
            pending: Vec::new(),
            forced_seeds: VecDeque::new(),
            reject_spawns: false,
            cosmetics_undone: Vec::new(),
            kills: 0,
        }
    }

    fn allocate(&mut self) -> EntityHandle {
        let handle = EntityHandle(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);
        handle
    }

    // -----------------------------------------------------------------------
    // World setup
    // -----------------------------------------------------------------------

    /// Add an active owner with random seeds.
    pub fn add_owner(&mut self, variant: OwnerVariant) -> EntityHandle {
        let owner = SimOwner {
            variant,
            stable_seed: self.rng.random(),
            alternate_seed: self.rng.random(),
            active: true,
        };
        self.insert_owner(owner)
    }

    /// Add both forms of a flipping owner. The first is active.
    pub fn add_flipping_pair(&mut self) -> (EntityHandle, EntityHandle) {
        let stable_seed = self.rng.random();
        let front = SimOwner {
            variant: OwnerVariant::Flipping,
            stable_seed,
            alternate_seed: self.rng.random(),
            active: true,
        };
        let back = SimOwner {
            alternate_seed: self.rng.random(),
            active: false,
            ..front
        };
        (self.insert_owner(front), self.insert_owner(back))
    }

    fn insert_owner(&mut self, owner: SimOwner) -> EntityHandle {
        let handle = self.allocate();
        self.owners.insert(handle, owner);
        self.pending.push(HostEvent::OwnerAppeared(handle));
        handle
    }

    /// Swap which of two owner forms is active.
    pub fn flip(&mut self, a: EntityHandle, b: EntityHandle) {
        for handle in [a, b] {
            if let Some(owner) = self.owners.get_mut(&handle) {
                owner.active = !owner.active;
            }
        }
    }

    /// Start or stop delivering update callbacks for an owner.
    pub fn set_owner_active(&mut self, owner: EntityHandle, active: bool) {
        if let Some(entry) = self.owners.get_mut(&owner) {
            entry.active = active;
        }
    }

    /// Remove an owner. Carrier links pointing at it are cleared.
    pub fn remove_owner(&mut self, owner: EntityHandle) {
        self.owners.remove(&owner);
        for carrier in self.carriers.values_mut() {
            if carrier.owner == Some(owner) {
                carrier.owner = None;
            }
            if carrier.cached_owner == Some(owner) {
                carrier.cached_owner = None;
            }
        }
    }

    /// Make the next carrier spawn use `seed`.
    pub fn force_next_seed(&mut self, seed: u64) {
        self.forced_seeds.push_back(seed);
    }

    /// Refuse every carrier spawn while `reject` is set.
    pub const fn reject_spawns(&mut self, reject: bool) {
        self.reject_spawns = reject;
    }

    /// Create a carrier no live engine instance knows about.
    pub fn spawn_foreign_carrier(
        &mut self,
        owner: EntityHandle,
        item: ItemId,
        marked: bool,
    ) -> EntityHandle {
        let seed = self.rng.random();
        let handle = self.insert_carrier(seed, item, Some(owner));
        if let Some(carrier) = self.carriers.get_mut(&handle) {
            carrier.marked = marked;
        }
        handle
    }

    /// Copy a carrier the way the host does during certain identity flips:
    /// same seed, item, owner and marker, but no tag.
    pub fn duplicate_carrier(&mut self, original: EntityHandle) -> Option<EntityHandle> {
        let source = *self.carriers.get(&original)?;
        let handle = self.allocate();
        self.carriers.insert(
            handle,
            SimCarrier {
                tag: None,
                claimed_at: None,
                visible: true,
                collides: true,
                ..source
            },
        );
        self.pending.push(HostEvent::EntityAppear(handle));
        Some(handle)
    }

    fn insert_carrier(&mut self, seed: u64, item: ItemId, owner: Option<EntityHandle>) -> EntityHandle {
        let handle = self.allocate();
        self.carriers.insert(
            handle,
            SimCarrier {
                seed,
                item,
                owner,
                cached_owner: None,
                marked: false,
                tag: None,
                claimed_at: None,
                visible: true,
                collides: true,
                position: [0.0, 0.0],
                velocity: [0.0, 0.0],
                grants_rewards: true,
                orbiting: true,
            },
        );
        self.pending.push(HostEvent::EntityAppear(handle));
        handle
    }

    /// Add a projectile with no spawner.
    pub fn add_projectile(&mut self) -> EntityHandle {
        let handle = self.allocate();
        self.projectiles.insert(handle);
        handle
    }

    // -----------------------------------------------------------------------
    // Host misbehaviour
    // -----------------------------------------------------------------------

    /// Destroy an entity without any callback. Returns whether it existed.
    pub fn destroy(&mut self, entity: EntityHandle) -> bool {
        self.carriers.remove(&entity).is_some()
            || self.projectiles.remove(&entity)
            || self.owners.remove(&entity).is_some()
    }

    /// Make a carrier visible and collidable again, as some host effects do.
    pub fn reveal(&mut self, carrier: EntityHandle) {
        if let Some(entry) = self.carriers.get_mut(&carrier) {
            entry.visible = true;
            entry.collides = true;
            entry.position = [0.0, 0.0];
        }
    }

    /// Simulate save and continue: transient tags, claims and cached owners
    /// are lost, persistent markers survive, and every entity appears again.
    pub fn reload(&mut self) {
        self.pending.clear();
        for (handle, carrier) in &mut self.carriers {
            carrier.tag = None;
            carrier.claimed_at = None;
            carrier.cached_owner = None;
            self.pending.push(HostEvent::EntityAppear(*handle));
        }
        for handle in self.owners.keys() {
            self.pending.push(HostEvent::OwnerAppeared(*handle));
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Move the clock forward one tick without dispatching anything.
    pub const fn advance_frame(&mut self) {
        self.frame = self.frame.saturating_add(1);
    }

    /// Every carrier handle, oldest first.
    pub fn carrier_handles(&self) -> Vec<EntityHandle> {
        self.carriers.keys().copied().collect()
    }

    /// Inspect a carrier.
    pub fn carrier_state(&self, carrier: EntityHandle) -> Option<&SimCarrier> {
        self.carriers.get(&carrier)
    }

    /// Number of live carriers linked to `owner` that grant `item`.
    pub fn carriers_for(&self, owner: EntityHandle, item: ItemId) -> usize {
        self.carriers
            .values()
            .filter(|carrier| carrier.owner == Some(owner) && carrier.item == item)
            .count()
    }

    /// Whether a projectile still exists.
    pub fn projectile_exists(&self, projectile: EntityHandle) -> bool {
        self.projectiles.contains(&projectile)
    }

    /// Cosmetic undo requests received so far.
    pub fn cosmetics_undone(&self) -> &[(EntityHandle, ItemId)] {
        &self.cosmetics_undone
    }

    /// Carriers killed through [`Host::silent_kill`].
    pub const fn kills(&self) -> u64 {
        self.kills
    }

    // -----------------------------------------------------------------------
    // Callback replay
    // -----------------------------------------------------------------------

    /// Run one host tick.
    ///
    /// Order: queued appear callbacks, one update per active owner, one
    /// update per carrier, then the tick update. Returns the new frame.
    pub fn step<S: Subscriber>(&mut self, bus: &mut EventBus<S>) -> u64 {
        self.advance_frame();
        for event in std::mem::take(&mut self.pending) {
            bus.dispatch(self, &event);
        }
        let active: Vec<EntityHandle> = self
            .owners
            .iter()
            .filter(|(_, owner)| owner.active)
            .map(|(handle, _)| *handle)
            .collect();
        for owner in active {
            bus.dispatch(self, &HostEvent::OwnerUpdated(owner));
        }
        for carrier in self.carrier_handles() {
            if self.carriers.contains_key(&carrier) {
                bus.dispatch(self, &HostEvent::EntityUpdate(carrier));
            }
        }
        bus.dispatch(self, &HostEvent::TickUpdate);
        self.frame
    }

    /// Run `ticks` host ticks.
    pub fn run<S: Subscriber>(&mut self, bus: &mut EventBus<S>, ticks: u64) {
        for _ in 0..ticks {
            self.step(bus);
        }
    }

    /// Enter a new room.
    pub fn change_room<S: Subscriber>(&mut self, bus: &mut EventBus<S>) {
        bus.dispatch(self, &HostEvent::RoomChanged);
    }

    /// Enter a new level, which also enters a new room.
    pub fn change_level<S: Subscriber>(&mut self, bus: &mut EventBus<S>) {
        bus.dispatch(self, &HostEvent::LevelChanged);
        bus.dispatch(self, &HostEvent::RoomChanged);
    }

    /// Start a session.
    pub fn start_session<S: Subscriber>(&mut self, bus: &mut EventBus<S>, continued: bool) {
        bus.dispatch(self, &HostEvent::SessionStarted { continued });
    }

    /// Begin a special interaction.
    pub fn begin_interaction<S: Subscriber>(&mut self, bus: &mut EventBus<S>, kind: InteractionKind) {
        bus.dispatch(self, &HostEvent::InteractionBegin(kind));
    }

    /// End a special interaction.
    pub fn end_interaction<S: Subscriber>(&mut self, bus: &mut EventBus<S>, kind: InteractionKind) {
        bus.dispatch(self, &HostEvent::InteractionEnd(kind));
    }

    /// Fire a projectile from `spawner`. Returns the projectile handle.
    pub fn fire_projectile<S: Subscriber>(
        &mut self,
        bus: &mut EventBus<S>,
        spawner: EntityHandle,
    ) -> EntityHandle {
        let projectile = self.add_projectile();
        bus.dispatch(
            self,
            &HostEvent::ProjectileSpawn {
                projectile,
                spawner: Some(spawner),
            },
        );
        projectile
    }

    /// Ask whether `target` may take damage from `source`.
    pub fn damage<S: Subscriber>(
        &mut self,
        bus: &mut EventBus<S>,
        target: EntityHandle,
        source: Option<EntityHandle>,
    ) -> Outcome {
        bus.dispatch(self, &HostEvent::Damage { target, source })
    }

    /// Ask whether `entity` may collide with `other`.
    pub fn collide<S: Subscriber>(
        &mut self,
        bus: &mut EventBus<S>,
        entity: EntityHandle,
        other: EntityHandle,
    ) -> Outcome {
        bus.dispatch(self, &HostEvent::PreCollision { entity, other })
    }
}

impl Host for SimHost {
    fn frame(&self) -> u64 {
        self.frame
    }

    fn kind_of(&self, entity: EntityHandle) -> Option<EntityKind> {
        if self.owners.contains_key(&entity) {
            Some(EntityKind::Owner)
        } else if self.carriers.contains_key(&entity) {
            Some(EntityKind::Carrier)
        } else if self.projectiles.contains(&entity) {
            Some(EntityKind::Projectile)
        } else {
            None
        }
    }

    fn owner(&self, entity: EntityHandle) -> Option<OwnerInfo> {
        self.owners.get(&entity).map(|owner| OwnerInfo {
            handle: entity,
            variant: owner.variant,
            stable_seed: owner.stable_seed,
            alternate_seed: owner.alternate_seed,
        })
    }

    fn owners(&self) -> Vec<OwnerInfo> {
        self.owners
            .keys()
            .filter_map(|handle| self.owner(*handle))
            .collect()
    }

    fn carrier(&self, entity: EntityHandle) -> Option<CarrierInfo> {
        self.carriers.get(&entity).map(|carrier| carrier.info(entity))
    }

    fn carriers(&self) -> Vec<CarrierInfo> {
        self.carriers
            .iter()
            .map(|(handle, carrier)| carrier.info(*handle))
            .collect()
    }

    fn spawn_carrier(
        &mut self,
        owner: EntityHandle,
        item: ItemId,
    ) -> Result<CarrierInfo, HostError> {
        if self.reject_spawns {
            return Err(HostError::SpawnRejected {
                item,
                reason: "spawning disabled".to_owned(),
            });
        }
        if !self.owners.contains_key(&owner) {
            return Err(HostError::UnknownEntity(owner));
        }
        let seed = match self.forced_seeds.pop_front() {
            Some(seed) => seed,
            None => self.rng.random(),
        };
        let handle = self.insert_carrier(seed, item, Some(owner));
        self.carrier(handle).ok_or(HostError::UnknownEntity(handle))
    }

    fn stamp(&mut self, carrier: EntityHandle, tag: EngineTag) {
        if let Some(entry) = self.carriers.get_mut(&carrier) {
            entry.tag = Some(tag);
            entry.marked = true;
        }
    }

    fn claim(&mut self, carrier: EntityHandle, frame: u64) {
        if let Some(entry) = self.carriers.get_mut(&carrier) {
            entry.claimed_at = Some(frame);
        }
    }

    fn conceal(&mut self, carrier: EntityHandle, concealment: Concealment) {
        if let Some(entry) = self.carriers.get_mut(&carrier) {
            entry.visible = false;
            entry.collides = false;
            entry.position = concealment.park_at;
            entry.velocity = [0.0, 0.0];
            entry.grants_rewards = false;
            entry.orbiting = false;
        }
    }

    fn link_owner(&mut self, carrier: EntityHandle, owner: Option<EntityHandle>) {
        if let Some(entry) = self.carriers.get_mut(&carrier) {
            entry.owner = owner;
        }
    }

    fn cache_owner(&mut self, carrier: EntityHandle, owner: Option<EntityHandle>) {
        if let Some(entry) = self.carriers.get_mut(&carrier) {
            entry.cached_owner = owner;
        }
    }

    fn undo_item_cosmetic(&mut self, owner: EntityHandle, item: ItemId) {
        self.cosmetics_undone.push((owner, item));
    }

    fn silent_kill(&mut self, carrier: EntityHandle) {
        if self.carriers.remove(&carrier).is_some() {
            self.kills = self.kills.saturating_add(1);
        }
    }

    fn remove_projectile(&mut self, projectile: EntityHandle) {
        self.projectiles.remove(&projectile);
    }
}
