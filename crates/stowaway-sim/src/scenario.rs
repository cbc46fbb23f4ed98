//! Scripted host scenarios.
//!
//! A [`Stage`] owns the simulated host, its owners and the event bus the
//! engine instances listen on. A [`Scenario`] is a repeating timeline of
//! [`Action`]s that poke the host the way a real session would: grants,
//! room and level changes, carriers vanishing or being duplicated, form
//! flips, save/continue reloads and the two special interactions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stowaway_core::config::StowawayConfig;
use stowaway_core::events::{EventBus, SubscriberId};
use stowaway_core::host::Host;
use stowaway_core::sim::SimHost;
use stowaway_core::{Grant, HiddenItemManager};
use stowaway_types::{
    EntityHandle, Group, InteractionKind, ItemId, OwnerVariant, PersistableState, Scope,
};
use tracing::{debug, info};

/// Length of one scenario cycle, in ticks.
pub const PERIOD: u64 = 120;

/// Item offset between engine instances, so each grants its own items.
const INSTANCE_ITEM_STRIDE: i32 = 100;

// -----------------------------------------------------------------------
// Actions
// -----------------------------------------------------------------------

/// Which owner an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The n-th standard owner.
    Owner(usize),
    /// The front form of the flipping pair.
    Front,
}

/// One scripted host event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Every instance grants an effect to `target`.
    Grant {
        /// Owner receiving the effect.
        target: Target,
        /// Base item; offset per instance.
        item: ItemId,
        /// Number of instances.
        count: u32,
        /// Lifetime in ticks, `-1` for unlimited.
        duration: i64,
        /// Scope of the grant.
        scope: Scope,
        /// Group name, `None` for the default group.
        group: Option<&'static str>,
    },
    /// Every instance resizes a stack.
    CheckStack {
        /// Stack owner.
        target: Target,
        /// Base item.
        item: ItemId,
        /// Desired size.
        size: u32,
    },
    /// Every instance removes a whole stack.
    RemoveStack {
        /// Stack owner.
        target: Target,
        /// Base item.
        item: ItemId,
    },
    /// The host deletes carriers without telling anyone.
    DestroyCarriers {
        /// Chance for each carrier to be deleted.
        chance: f64,
    },
    /// The host clones the oldest carrier.
    DuplicateCarrier,
    /// The oldest carrier tries to shoot and to get hurt.
    Provoke,
    /// The owners enter a new room.
    ChangeRoom,
    /// The owners enter a new level.
    ChangeLevel,
    /// The flipping pair swaps forms.
    Flip,
    /// Save, reload and continue.
    Reload,
    /// A special interaction begins.
    Begin(InteractionKind),
    /// A special interaction ends.
    End(InteractionKind),
}

/// A repeating timeline of actions.
#[derive(Debug)]
pub struct Scenario {
    timeline: Vec<(u64, Action)>,
    rng: StdRng,
}

impl Scenario {
    /// Build a scenario from `(tick within cycle, action)` pairs.
    pub fn new(timeline: Vec<(u64, Action)>, seed: u64) -> Self {
        Self {
            timeline,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The built-in script exercising every engine path once per cycle.
    pub fn scripted(seed: u64) -> Self {
        let timeline = vec![
            (
                1,
                Action::Grant {
                    target: Target::Owner(0),
                    item: ItemId(5),
                    count: 2,
                    duration: -1,
                    scope: Scope::Persistent,
                    group: None,
                },
            ),
            (
                1,
                Action::Grant {
                    target: Target::Owner(1),
                    item: ItemId(7),
                    count: 1,
                    duration: 90,
                    scope: Scope::Persistent,
                    group: Some("bonus"),
                },
            ),
            (
                1,
                Action::Grant {
                    target: Target::Front,
                    item: ItemId(9),
                    count: 1,
                    duration: -1,
                    scope: Scope::Persistent,
                    group: None,
                },
            ),
            (
                5,
                Action::Grant {
                    target: Target::Owner(0),
                    item: ItemId(12),
                    count: 1,
                    duration: -1,
                    scope: Scope::Room,
                    group: None,
                },
            ),
            (
                5,
                Action::Grant {
                    target: Target::Owner(1),
                    item: ItemId(13),
                    count: 1,
                    duration: -1,
                    scope: Scope::Floor,
                    group: None,
                },
            ),
            (15, Action::DestroyCarriers { chance: 0.5 }),
            (20, Action::DuplicateCarrier),
            (25, Action::Provoke),
            (30, Action::ChangeRoom),
            (40, Action::Begin(InteractionKind::OwnershipSevering)),
            (40, Action::End(InteractionKind::OwnershipSevering)),
            // Never ended; the watchdog completes it on the next tick.
            (50, Action::Begin(InteractionKind::OwnershipSevering)),
            (60, Action::Flip),
            (65, Action::DestroyCarriers { chance: 1.0 }),
            (70, Action::Flip),
            (75, Action::Reload),
            (
                80,
                Action::CheckStack {
                    target: Target::Owner(0),
                    item: ItemId(5),
                    size: 3,
                },
            ),
            (90, Action::ChangeLevel),
            (
                100,
                Action::RemoveStack {
                    target: Target::Owner(0),
                    item: ItemId(5),
                },
            ),
            (110, Action::Begin(InteractionKind::GlobalReset)),
            (110, Action::End(InteractionKind::GlobalReset)),
        ];
        Self::new(timeline, seed)
    }

    /// Actions due on host tick `tick`.
    pub fn due(&self, tick: u64) -> Vec<Action> {
        let at = tick.checked_rem(PERIOD).unwrap_or_default();
        self.timeline
            .iter()
            .filter(|(when, _)| *when == at)
            .map(|(_, action)| *action)
            .collect()
    }
}

// -----------------------------------------------------------------------
// Stage
// -----------------------------------------------------------------------

/// The simulated world the scenario runs against.
#[derive(Debug)]
pub struct Stage {
    /// The simulated host.
    pub host: SimHost,
    /// Engine instances sharing the host.
    pub bus: EventBus<HiddenItemManager>,
    owners: Vec<EntityHandle>,
    front: EntityHandle,
    back: EntityHandle,
}

impl Stage {
    /// Build the host, its owners and one manager per configured instance.
    pub fn new(config: &StowawayConfig) -> Self {
        let mut host = SimHost::new(config.simulation.seed);
        let owners = (0..config.simulation.owners)
            .map(|_| host.add_owner(OwnerVariant::Standard))
            .collect();
        let (front, back) = host.add_flipping_pair();
        let mut bus = EventBus::new();
        for _ in 0..config.simulation.instances.max(1) {
            bus.register(HiddenItemManager::new(config.engine.clone()));
        }
        Self {
            host,
            bus,
            owners,
            front,
            back,
        }
    }

    /// Number of engine instances.
    pub const fn instances(&self) -> usize {
        self.bus.len()
    }

    fn ids(&self) -> Vec<SubscriberId> {
        self.bus.iter().map(|(id, _)| id).collect()
    }

    fn each_manager(&mut self, mut f: impl FnMut(&mut HiddenItemManager, &mut SimHost, usize)) {
        for (index, id) in self.ids().into_iter().enumerate() {
            if let Some(manager) = self.bus.get_mut(id) {
                f(manager, &mut self.host, index);
            }
        }
    }

    fn resolve(&self, target: Target) -> Option<EntityHandle> {
        match target {
            Target::Owner(index) => index
                .checked_rem(self.owners.len())
                .and_then(|index| self.owners.get(index))
                .copied(),
            Target::Front => Some(self.front),
        }
    }

    /// Start the session. Instances with a saved state continue it; when
    /// nothing was saved the session starts fresh.
    pub fn start(&mut self, states: Vec<Option<PersistableState>>) {
        let continued = states.iter().any(Option::is_some);
        self.host.start_session(&mut self.bus, continued);
        if !continued {
            return;
        }
        for (id, state) in self.ids().into_iter().zip(states) {
            if let Some(manager) = self.bus.get_mut(id) {
                manager.restore(&mut self.host, state);
            }
        }
    }

    /// Capture every instance's effect index, in registration order.
    pub fn snapshots(&self) -> Vec<PersistableState> {
        self.bus
            .iter()
            .map(|(_, manager)| manager.snapshot())
            .collect()
    }

    /// Apply the actions due on the next tick, then run it. Returns the
    /// tick that ran.
    pub fn tick(&mut self, scenario: &mut Scenario) -> u64 {
        let next = self.host.frame().saturating_add(1);
        for action in scenario.due(next) {
            self.apply(action, &mut scenario.rng);
        }
        self.host.step(&mut self.bus)
    }

    /// Perform one action against the host and every instance.
    pub fn apply(&mut self, action: Action, rng: &mut StdRng) {
        debug!(?action, frame = self.host.frame(), "Scenario action");
        match action {
            Action::Grant {
                target,
                item,
                count,
                duration,
                scope,
                group,
            } => {
                let Some(owner) = self.resolve(target) else {
                    return;
                };
                let group = group.map_or_else(Group::default, Group::from);
                self.each_manager(|manager, host, index| {
                    let grant = Grant::new(instance_item(item, index))
                        .count(count)
                        .duration(duration)
                        .group(group.clone());
                    match scope {
                        Scope::Persistent => manager.add(host, owner, &grant),
                        Scope::Floor => manager.add_for_floor(host, owner, &grant),
                        Scope::Room => manager.add_for_room(host, owner, &grant),
                    }
                });
            }
            Action::CheckStack { target, item, size } => {
                if let Some(owner) = self.resolve(target) {
                    self.each_manager(|manager, host, index| {
                        let item = instance_item(item, index);
                        manager.check_stack(host, owner, item, size, &Group::default());
                    });
                }
            }
            Action::RemoveStack { target, item } => {
                if let Some(owner) = self.resolve(target) {
                    self.each_manager(|manager, host, index| {
                        let item = instance_item(item, index);
                        manager.remove_stack(host, owner, item, &Group::default());
                    });
                }
            }
            Action::DestroyCarriers { chance } => {
                let mut destroyed: u32 = 0;
                for carrier in self.host.carrier_handles() {
                    if rng.random_bool(chance.clamp(0.0, 1.0)) && self.host.destroy(carrier) {
                        destroyed = destroyed.saturating_add(1);
                    }
                }
                info!(destroyed, "Host deleted carriers");
            }
            Action::DuplicateCarrier => {
                if let Some(carrier) = self.host.carrier_handles().first().copied() {
                    let copy = self.host.duplicate_carrier(carrier);
                    info!(%carrier, copy = ?copy, "Host duplicated a carrier");
                }
            }
            Action::Provoke => {
                let Some(carrier) = self.host.carrier_handles().first().copied() else {
                    return;
                };
                let projectile = self.host.fire_projectile(&mut self.bus, carrier);
                let damage = self.host.damage(&mut self.bus, carrier, None);
                debug!(
                    %carrier,
                    projectile_kept = self.host.projectile_exists(projectile),
                    damage_cancelled = damage.is_cancel(),
                    "Carrier provoked"
                );
            }
            Action::ChangeRoom => self.host.change_room(&mut self.bus),
            Action::ChangeLevel => self.host.change_level(&mut self.bus),
            Action::Flip => self.host.flip(self.front, self.back),
            Action::Reload => {
                let states = self.snapshots();
                self.host.reload();
                self.start(states.into_iter().map(Some).collect());
            }
            Action::Begin(kind) => self.host.begin_interaction(&mut self.bus, kind),
            Action::End(kind) => self.host.end_interaction(&mut self.bus, kind),
        }
    }

    /// Log per-instance and host totals.
    pub fn log_summary(&self) {
        for (_, manager) in self.bus.iter() {
            let report = manager.last_report();
            info!(
                instance = %manager.tag(),
                frame = report.frame,
                effects = manager.len(),
                expired = report.expired,
                waiting = report.waiting,
                respawned = report.respawned,
                abandoned = report.abandoned,
                healed = report.healed,
                "Instance summary"
            );
        }
        info!(
            frame = self.host.frame(),
            carriers = self.host.carrier_handles().len(),
            kills = self.host.kills(),
            "Host summary"
        );
    }
}

/// The item instance `index` grants for a scripted base item.
fn instance_item(item: ItemId, index: usize) -> ItemId {
    let offset = i32::try_from(index)
        .unwrap_or_default()
        .saturating_mul(INSTANCE_ITEM_STRIDE);
    ItemId(item.into_inner().saturating_add(offset))
}
