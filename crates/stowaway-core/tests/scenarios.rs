//! End-to-end scenarios driven through the simulated host and event bus.

#![allow(clippy::unwrap_used)]

use stowaway_core::config::EngineConfig;
use stowaway_core::events::{EventBus, Outcome, SubscriberId};
use stowaway_core::persistence::{decode, encode};
use stowaway_core::sim::SimHost;
use stowaway_core::{Grant, HiddenItemManager};
use stowaway_types::{EntityHandle, Group, InteractionKind, ItemId, OwnerVariant};

const ITEM: ItemId = ItemId(5);

struct World {
    host: SimHost,
    bus: EventBus<HiddenItemManager>,
    id: SubscriberId,
    owner: EntityHandle,
}

impl World {
    fn new() -> Self {
        let mut host = SimHost::new(1234);
        let owner = host.add_owner(OwnerVariant::Standard);
        let mut bus = EventBus::new();
        let id = bus.register(HiddenItemManager::new(EngineConfig::default()));
        let mut world = Self {
            host,
            bus,
            id,
            owner,
        };
        world.step();
        world
    }

    fn manager(&self) -> &HiddenItemManager {
        self.bus.get(self.id).unwrap()
    }

    fn add(&mut self, grant: &Grant) {
        let owner = self.owner;
        let manager = self.bus.get_mut(self.id).unwrap();
        manager.add(&mut self.host, owner, grant);
    }

    fn step(&mut self) {
        self.host.step(&mut self.bus);
    }

    fn run(&mut self, ticks: u64) {
        self.host.run(&mut self.bus, ticks);
    }

    fn count(&self, item: ItemId) -> u32 {
        self.manager()
            .count_stack(&self.host, self.owner, item, &Group::default())
    }

    fn live(&self, item: ItemId) -> usize {
        self.host.carriers_for(self.owner, item)
    }

    fn destroy_all_carriers(&mut self) {
        for carrier in self.host.carrier_handles() {
            self.host.destroy(carrier);
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn granted_effects_stay_hidden_across_ticks() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM).count(2));
    world.run(5);

    assert_eq!(world.count(ITEM), 2);
    assert_eq!(world.live(ITEM), 2);
    for carrier in world.host.carrier_handles() {
        let state = world.host.carrier_state(carrier).unwrap();
        assert!(!state.visible);
        assert!(!state.collides);
        assert!(!state.orbiting);
        assert!(!state.grants_rewards);
    }
}

#[test]
fn destroyed_carrier_is_respawned() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM));
    world.step();

    world.destroy_all_carriers();
    world.step();

    assert_eq!(world.count(ITEM), 1);
    assert_eq!(world.live(ITEM), 1);
    assert_eq!(world.manager().last_report().respawned, 1);
}

#[test]
fn eleventh_consecutive_loss_deletes_the_instance() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM));
    world.step();

    for _ in 0..10 {
        world.destroy_all_carriers();
        world.step();
        assert_eq!(world.count(ITEM), 1);
        assert_eq!(world.live(ITEM), 1);
    }

    world.destroy_all_carriers();
    world.step();
    assert_eq!(world.count(ITEM), 0);
    assert_eq!(world.live(ITEM), 0);
    assert_eq!(world.manager().last_report().abandoned, 1);

    world.run(3);
    assert_eq!(world.live(ITEM), 0);
}

#[test]
fn surviving_a_tick_resets_the_loss_counter() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM));
    world.step();

    for _ in 0..8 {
        world.destroy_all_carriers();
        world.step();
    }
    world.run(2);
    for _ in 0..8 {
        world.destroy_all_carriers();
        world.step();
    }
    assert_eq!(world.count(ITEM), 1);
    assert_eq!(world.live(ITEM), 1);
}

#[test]
fn duplicated_carrier_is_removed() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM));
    world.step();

    let carrier = world.host.carrier_handles().first().copied().unwrap();
    let copy = world.host.duplicate_carrier(carrier).unwrap();
    world.step();

    assert!(world.host.carrier_state(copy).is_none());
    assert!(world.host.carrier_state(carrier).is_some());
    assert_eq!(world.live(ITEM), 1);
    assert_eq!(world.count(ITEM), 1);
}

#[test]
fn timed_effect_expires() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM).duration(3));
    world.add(&Grant::new(ItemId(6)));
    world.run(2);
    assert_eq!(world.count(ITEM), 1);

    world.run(3);
    assert_eq!(world.count(ITEM), 0);
    assert_eq!(world.live(ITEM), 0);
    assert_eq!(world.count(ItemId(6)), 1);
}

#[test]
fn departed_owner_loses_its_effects() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM).count(2));
    world.step();

    world.host.remove_owner(world.owner);
    world.step();

    assert!(world.manager().is_empty());
    assert!(world.host.carrier_handles().is_empty());
}

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

#[test]
fn room_and_floor_scopes_end_at_their_boundary() {
    let mut world = World::new();
    let owner = world.owner;
    let room = ItemId(10);
    let floor = ItemId(11);
    let forever = ItemId(12);
    {
        let manager = world.bus.get_mut(world.id).unwrap();
        manager.add_for_room(&mut world.host, owner, &Grant::new(room));
        manager.add_for_floor(&mut world.host, owner, &Grant::new(floor));
        manager.add(&mut world.host, owner, &Grant::new(forever));
    }
    world.step();

    world.host.change_room(&mut world.bus);
    assert_eq!(world.count(room), 0);
    assert_eq!(world.count(floor), 1);

    world
        .bus
        .get_mut(world.id)
        .unwrap()
        .add_for_room(&mut world.host, owner, &Grant::new(room));
    world.host.change_level(&mut world.bus);
    assert_eq!(world.count(room), 0);
    assert_eq!(world.count(floor), 0);
    assert_eq!(world.count(forever), 1);

    world.step();
    assert_eq!(world.live(room), 0);
    assert_eq!(world.live(floor), 0);
    assert_eq!(world.live(forever), 1);
}

// ---------------------------------------------------------------------------
// Owners
// ---------------------------------------------------------------------------

#[test]
fn flipping_forms_keep_separate_effects() {
    let mut world = World::new();
    let (front, back) = world.host.add_flipping_pair();
    {
        let manager = world.bus.get_mut(world.id).unwrap();
        manager.add(&mut world.host, front, &Grant::new(ITEM));
        manager.add(&mut world.host, back, &Grant::new(ITEM).count(2));
    }
    world.step();

    let group = Group::default();
    assert_eq!(world.manager().count_stack(&world.host, front, ITEM, &group), 1);
    assert_eq!(world.manager().count_stack(&world.host, back, ITEM, &group), 2);
}

#[test]
fn inactive_form_does_not_respawn_until_it_returns() {
    let mut world = World::new();
    let (front, back) = world.host.add_flipping_pair();
    world
        .bus
        .get_mut(world.id)
        .unwrap()
        .add(&mut world.host, front, &Grant::new(ITEM));
    world.step();

    world.host.flip(front, back);
    world.step();
    for carrier in world.host.carrier_handles() {
        world.host.destroy(carrier);
    }
    world.run(5);
    assert_eq!(world.host.carriers_for(front, ITEM), 0);
    assert_eq!(world.manager().len(), 1);

    world.host.flip(front, back);
    world.run(2);
    assert_eq!(world.host.carriers_for(front, ITEM), 1);
}

#[test]
fn invalid_owner_calls_are_harmless() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM));
    let carrier = world.host.carrier_handles().first().copied().unwrap();
    let group = Group::default();

    let manager = world.bus.get_mut(world.id).unwrap();
    manager.add(&mut world.host, carrier, &Grant::new(ITEM));
    assert!(!manager.remove(&mut world.host, carrier, ITEM, &group));
    assert_eq!(manager.remove_all(&mut world.host, EntityHandle(4040), &group), 0);
    assert!(!manager.has(&world.host, EntityHandle(4040), ITEM, &group));
    assert_eq!(manager.len(), 1);
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

#[test]
fn carriers_are_immune_and_never_fire() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM));
    world.step();
    let carrier = world.host.carrier_handles().first().copied().unwrap();
    let owner = world.owner;

    assert_eq!(
        world.host.damage(&mut world.bus, carrier, None),
        Outcome::Cancel
    );
    assert_eq!(
        world.host.damage(&mut world.bus, owner, Some(carrier)),
        Outcome::Cancel
    );
    assert_eq!(world.host.damage(&mut world.bus, owner, None), Outcome::Pass);
    assert_eq!(
        world.host.collide(&mut world.bus, carrier, owner),
        Outcome::Cancel
    );

    let shot = world.host.fire_projectile(&mut world.bus, carrier);
    assert!(!world.host.projectile_exists(shot));
    let legit = world.host.fire_projectile(&mut world.bus, owner);
    assert!(world.host.projectile_exists(legit));
}

#[test]
fn severing_interaction_restores_ownership() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM).count(2));
    world.step();

    world
        .host
        .begin_interaction(&mut world.bus, InteractionKind::OwnershipSevering);
    assert!(world.manager().is_severing());
    assert_eq!(world.live(ITEM), 0);

    world
        .host
        .end_interaction(&mut world.bus, InteractionKind::OwnershipSevering);
    assert!(!world.manager().is_severing());
    assert_eq!(world.live(ITEM), 2);
    assert_eq!(world.count(ITEM), 2);
}

#[test]
fn stuck_severing_is_completed_by_the_watchdog() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM));
    world.step();

    world
        .host
        .begin_interaction(&mut world.bus, InteractionKind::OwnershipSevering);
    world.step();

    assert!(!world.manager().is_severing());
    assert_eq!(world.live(ITEM), 1);
    assert_eq!(world.count(ITEM), 1);
}

#[test]
fn global_reset_wipes_every_instance() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM).count(3));
    world.step();

    world
        .host
        .begin_interaction(&mut world.bus, InteractionKind::GlobalReset);
    world
        .host
        .end_interaction(&mut world.bus, InteractionKind::GlobalReset);
    world.run(2);

    assert!(world.manager().is_empty());
    assert!(world.host.carrier_handles().is_empty());
}

// ---------------------------------------------------------------------------
// Multiple instances
// ---------------------------------------------------------------------------

#[test]
fn instances_sharing_a_host_do_not_interfere() {
    let mut host = SimHost::new(77);
    let owner = host.add_owner(OwnerVariant::Standard);
    let mut bus = EventBus::new();
    let a = bus.register(HiddenItemManager::new(EngineConfig::default()));
    let b = bus.register(HiddenItemManager::new(EngineConfig::default()));
    host.step(&mut bus);

    bus.get_mut(a)
        .unwrap()
        .add(&mut host, owner, &Grant::new(ITEM).count(2));
    bus.get_mut(b)
        .unwrap()
        .add(&mut host, owner, &Grant::new(ITEM));
    host.run(&mut bus, 3);

    let group = Group::default();
    assert_eq!(bus.get(a).unwrap().count_stack(&host, owner, ITEM, &group), 2);
    assert_eq!(bus.get(b).unwrap().count_stack(&host, owner, ITEM, &group), 1);
    assert_eq!(host.carriers_for(owner, ITEM), 3);

    assert_eq!(
        bus.get_mut(b)
            .unwrap()
            .remove_stack(&mut host, owner, ITEM, &group),
        1
    );
    host.run(&mut bus, 2);
    assert_eq!(bus.get(a).unwrap().count_stack(&host, owner, ITEM, &group), 2);
    assert_eq!(host.carriers_for(owner, ITEM), 2);
}

#[test]
fn carriers_of_a_vanished_instance_are_culled() {
    let mut host = SimHost::new(78);
    let owner = host.add_owner(OwnerVariant::Standard);
    let mut bus = EventBus::new();
    let gone = bus.register(HiddenItemManager::new(EngineConfig::default()));
    let kept = bus.register(HiddenItemManager::new(EngineConfig::default()));
    host.step(&mut bus);
    bus.get_mut(gone)
        .unwrap()
        .add(&mut host, owner, &Grant::new(ItemId(1)).count(2));
    bus.get_mut(kept)
        .unwrap()
        .add(&mut host, owner, &Grant::new(ItemId(2)));
    host.step(&mut bus);
    let saved = bus.get(kept).unwrap().snapshot();

    // Continue with only one of the two instances alive.
    host.reload();
    let mut next = EventBus::new();
    let survivor = next.register(HiddenItemManager::new(EngineConfig::default()));
    host.start_session(&mut next, true);
    next.get_mut(survivor).unwrap().restore(&mut host, Some(saved));
    host.run(&mut next, 2);

    assert_eq!(host.carriers_for(owner, ItemId(1)), 0);
    assert_eq!(host.carriers_for(owner, ItemId(2)), 1);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn save_and_continue_reattaches_without_respawning() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM).count(2));
    world.add(&Grant::new(ItemId(6)).group("side"));
    world.step();
    let payload = encode(&world.manager().snapshot()).unwrap();
    let handles = world.host.carrier_handles();

    world.host.reload();
    let mut bus = EventBus::new();
    let id = bus.register(HiddenItemManager::new(EngineConfig::default()));
    world.host.start_session(&mut bus, true);
    bus.get_mut(id)
        .unwrap()
        .restore(&mut world.host, decode(&payload).unwrap());
    world.host.run(&mut bus, 3);

    assert_eq!(world.host.carrier_handles(), handles);
    let manager = bus.get(id).unwrap();
    let owner = world.owner;
    assert_eq!(
        manager.count_stack(&world.host, owner, ITEM, &Group::default()),
        2
    );
    assert_eq!(
        manager.count_stack(&world.host, owner, ItemId(6), &Group::from("side")),
        1
    );
    assert_eq!(manager.last_report().respawned, 0);
}

#[test]
fn restore_adopts_carriers_still_stamped_by_the_previous_instance() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM).count(2));
    world.step();
    let saved = world.manager().snapshot();
    let handles = world.host.carrier_handles();

    // The host keeps the old stamps and the old instance stops claiming.
    world.host.advance_frame();
    world.host.advance_frame();
    let mut bus = EventBus::new();
    let id = bus.register(HiddenItemManager::new(EngineConfig::default()));
    bus.get_mut(id).unwrap().restore(&mut world.host, Some(saved));
    world.host.run(&mut bus, 3);

    assert_eq!(world.host.carrier_handles(), handles);
    let manager = bus.get(id).unwrap();
    let owner = world.owner;
    assert_eq!(
        manager.count_stack(&world.host, owner, ITEM, &Group::default()),
        2
    );
    assert_eq!(manager.last_report().respawned, 0);
    for carrier in handles {
        assert_eq!(
            world.host.carrier_state(carrier).unwrap().tag,
            Some(manager.tag())
        );
    }
}

#[test]
fn restored_instance_without_carrier_is_respawned() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM).count(2));
    world.step();
    let saved = world.manager().snapshot();

    world.host.reload();
    let lost = world.host.carrier_handles().first().copied().unwrap();
    world.host.destroy(lost);
    let mut bus = EventBus::new();
    let id = bus.register(HiddenItemManager::new(EngineConfig::default()));
    bus.get_mut(id).unwrap().restore(&mut world.host, Some(saved));
    world.host.run(&mut bus, 2);

    let owner = world.owner;
    let manager = bus.get(id).unwrap();
    assert_eq!(
        manager.count_stack(&world.host, owner, ITEM, &Group::default()),
        2
    );
    assert_eq!(world.host.carriers_for(owner, ITEM), 2);
}

#[test]
fn fresh_session_discards_previous_carriers() {
    let mut world = World::new();
    world.add(&Grant::new(ITEM).count(2));
    world.step();

    world.host.start_session(&mut world.bus, false);
    world.step();

    assert!(world.manager().is_empty());
    assert!(world.host.carrier_handles().is_empty());
}
