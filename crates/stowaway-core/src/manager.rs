//! The hidden item manager: public API and event wiring.
//!
//! A [`HiddenItemManager`] grants owners item effects by keeping invisible
//! carrier minions alive in the host. Callers talk to it through the
//! operations on this type (add, remove, query, snapshot, restore). The host
//! talks to it through the [`Subscriber`] implementation at the bottom of
//! this file, which routes each callback to the lifecycle, reconciliation
//! and guard handlers.
//!
//! Owner arguments are host handles. Anything that is not a live owner is
//! logged and ignored: mutations become no-ops, queries return empty
//! results.

use std::collections::BTreeMap;

use stowaway_index::EffectIndex;
use stowaway_types::{
    CarrierKey, EffectInstance, EngineTag, EntityHandle, Group, InteractionKind, ItemId, OwnerKey,
    RetireReason, Scope, StackKey,
};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::events::{Hook, HostEvent, Outcome, Priority, Subscriber};
use crate::guards::{self, SeveringState};
use crate::host::{Concealment, Host};
use crate::keys;
use crate::lifecycle::CarrierRef;
use crate::owners::OwnerDirectory;
use crate::reconcile::ReconcileReport;

/// Hooks the manager listens on.
const SUBSCRIPTIONS: [(Hook, Priority); 15] = [
    (Hook::TickUpdate, Priority::Early),
    (Hook::TickUpdate, Priority::Normal),
    (Hook::EntityAppear, Priority::Normal),
    (Hook::EntityUpdate, Priority::Normal),
    (Hook::EntityUpdate, Priority::Late),
    (Hook::PreCollision, Priority::Early),
    (Hook::Damage, Priority::Early),
    (Hook::ProjectileSpawn, Priority::Normal),
    (Hook::RoomChanged, Priority::Normal),
    (Hook::LevelChanged, Priority::Normal),
    (Hook::SessionStarted, Priority::Normal),
    (Hook::OwnerAppeared, Priority::Normal),
    (Hook::OwnerUpdated, Priority::Normal),
    (Hook::InteractionBegin, Priority::Normal),
    (Hook::InteractionEnd, Priority::Normal),
];

// ---------------------------------------------------------------------------
// Grant parameters
// ---------------------------------------------------------------------------

/// Parameters for granting an item effect.
///
/// ```
/// use stowaway_core::Grant;
/// use stowaway_types::{Group, ItemId};
///
/// let grant = Grant::new(ItemId(12)).count(3).duration(90).group("buffs");
/// assert_eq!(grant.count, 3);
/// assert_eq!(grant.group, Group::from("buffs"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// The item whose effect is granted.
    pub item: ItemId,
    /// Lifetime in ticks. Zero or negative means infinite.
    pub duration: i64,
    /// How many instances to create.
    pub count: u32,
    /// Namespace the instances belong to.
    pub group: Group,
}

impl Grant {
    /// One infinite instance of `item` in the default group.
    pub fn new(item: ItemId) -> Self {
        Self {
            item,
            duration: -1,
            count: 1,
            group: Group::default(),
        }
    }

    /// Set the lifetime in ticks.
    #[must_use]
    pub const fn duration(mut self, ticks: i64) -> Self {
        self.duration = ticks;
        self
    }

    /// Set the number of instances.
    #[must_use]
    pub const fn count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Set the namespace.
    #[must_use]
    pub fn group(mut self, group: impl Into<Group>) -> Self {
        self.group = group.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// One engine instance.
#[derive(Debug)]
pub struct HiddenItemManager {
    pub(crate) config: EngineConfig,
    pub(crate) tag: EngineTag,
    pub(crate) index: EffectIndex,
    pub(crate) carriers: BTreeMap<CarrierKey, CarrierRef>,
    pub(crate) owners: OwnerDirectory,
    pub(crate) severing: SeveringState,
    pub(crate) last_report: ReconcileReport,
}

impl HiddenItemManager {
    /// Create an engine instance with a fresh tag.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_tag(config, EngineTag::new())
    }

    /// Create an engine instance with a specific tag.
    pub fn with_tag(config: EngineConfig, tag: EngineTag) -> Self {
        debug!(%tag, "Hidden item manager created");
        Self {
            config,
            tag,
            index: EffectIndex::new(),
            carriers: BTreeMap::new(),
            owners: OwnerDirectory::new(),
            severing: SeveringState::default(),
            last_report: ReconcileReport::default(),
        }
    }

    /// This instance's tag.
    pub const fn tag(&self) -> EngineTag {
        self.tag
    }

    /// Engine tuning in effect.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of live effect instances across all owners.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no effect instance exists.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Read-only view of the effect index.
    pub const fn index(&self) -> &EffectIndex {
        &self.index
    }

    /// Every instance belonging to the owner behind `owner`, in carrier key
    /// order.
    pub fn instances_for(&self, host: &dyn Host, owner: EntityHandle) -> Vec<&EffectInstance> {
        let Some(key) = self.owner_key_or_log(host, owner) else {
            return Vec::new();
        };
        self.index
            .iter()
            .filter(|(_, effect)| effect.owner == key)
            .map(|(_, effect)| effect)
            .collect()
    }

    /// Summary of the most recent reconciliation pass.
    pub const fn last_report(&self) -> &ReconcileReport {
        &self.last_report
    }

    /// Whether an ownership-severing interaction is in progress.
    pub const fn is_severing(&self) -> bool {
        self.severing.is_pending()
    }

    pub(crate) const fn concealment(&self) -> Concealment {
        Concealment {
            park_at: self.config.park_position,
        }
    }

    fn owner_key_or_log(&self, host: &dyn Host, owner: EntityHandle) -> Option<OwnerKey> {
        match keys::owner_key(host, owner) {
            Ok(key) => Some(key),
            Err(err) => {
                debug!(tag = %self.tag, %err, "Ignoring call for invalid owner");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Grant
    // -----------------------------------------------------------------------

    /// Grant persistent instances of an item effect.
    pub fn add(&mut self, host: &mut dyn Host, owner: EntityHandle, grant: &Grant) {
        self.grant(host, owner, grant, Scope::Persistent);
    }

    /// Grant instances that end when the owner group leaves the room.
    pub fn add_for_room(&mut self, host: &mut dyn Host, owner: EntityHandle, grant: &Grant) {
        self.grant(host, owner, grant, Scope::Room);
    }

    /// Grant instances that end when the owner group leaves the level.
    pub fn add_for_floor(&mut self, host: &mut dyn Host, owner: EntityHandle, grant: &Grant) {
        self.grant(host, owner, grant, Scope::Floor);
    }

    fn grant(&mut self, host: &mut dyn Host, owner: EntityHandle, grant: &Grant, scope: Scope) {
        let Some(owner_key) = self.owner_key_or_log(&*host, owner) else {
            return;
        };
        if !grant.item.is_valid() {
            warn!(
                tag = %self.tag,
                item = %grant.item,
                "Granting invalid item id; instance kept for compatibility"
            );
        }
        self.owners.remember(owner_key.clone(), owner);

        let mut created: u32 = 0;
        for _ in 0..grant.count {
            if self
                .create_instance(host, owner, &owner_key, grant, scope)
                .is_none()
            {
                break;
            }
            created = created.saturating_add(1);
        }
        debug!(
            tag = %self.tag,
            owner = %owner_key,
            item = %grant.item,
            group = %grant.group,
            ?scope,
            created,
            requested = grant.count,
            "Granted hidden item"
        );
    }

    /// Adjust a stack to exactly `target` instances.
    ///
    /// Missing instances are created with infinite duration and persistent
    /// scope. Surplus instances are removed oldest first.
    pub fn check_stack(
        &mut self,
        host: &mut dyn Host,
        owner: EntityHandle,
        item: ItemId,
        target: u32,
        group: &Group,
    ) {
        let Some(owner_key) = self.owner_key_or_log(&*host, owner) else {
            return;
        };
        let current = self
            .index
            .count(&StackKey::new(owner_key, group.clone(), item));
        if current < target {
            let grant = Grant::new(item)
                .count(target.saturating_sub(current))
                .group(group.clone());
            self.add(host, owner, &grant);
        } else {
            for _ in target..current {
                self.remove(host, owner, item, group);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Remove the oldest instance of `item` in `group`. Returns whether one
    /// was removed.
    pub fn remove(
        &mut self,
        host: &mut dyn Host,
        owner: EntityHandle,
        item: ItemId,
        group: &Group,
    ) -> bool {
        let Some(owner_key) = self.owner_key_or_log(&*host, owner) else {
            return false;
        };
        let stack = StackKey::new(owner_key, group.clone(), item);
        let Some(oldest) = self.index.oldest(&stack).cloned() else {
            return false;
        };
        self.retire(host, &oldest, RetireReason::Removed).is_some()
    }

    /// Remove every instance of `item` in `group`. Returns how many were
    /// removed.
    pub fn remove_stack(
        &mut self,
        host: &mut dyn Host,
        owner: EntityHandle,
        item: ItemId,
        group: &Group,
    ) -> u32 {
        let Some(owner_key) = self.owner_key_or_log(&*host, owner) else {
            return 0;
        };
        let stack = StackKey::new(owner_key, group.clone(), item);
        let members = self.index.stack(&stack).to_vec();
        self.retire_all(host, &members, RetireReason::Removed)
    }

    /// Remove every instance in `group`. Returns how many were removed.
    pub fn remove_all(&mut self, host: &mut dyn Host, owner: EntityHandle, group: &Group) -> u32 {
        let Some(owner_key) = self.owner_key_or_log(&*host, owner) else {
            return 0;
        };
        let members = self.index.keys_for_owner(&owner_key, group);
        self.retire_all(host, &members, RetireReason::Removed)
    }

    pub(crate) fn retire_all(
        &mut self,
        host: &mut dyn Host,
        keys: &[CarrierKey],
        reason: RetireReason,
    ) -> u32 {
        let mut retired: u32 = 0;
        for key in keys {
            if self.retire(host, key, reason).is_some() {
                retired = retired.saturating_add(1);
            }
        }
        retired
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Whether the owner has at least one instance of `item` in `group`.
    pub fn has(&self, host: &dyn Host, owner: EntityHandle, item: ItemId, group: &Group) -> bool {
        self.count_stack(host, owner, item, group) > 0
    }

    /// Number of instances of `item` in `group`.
    pub fn count_stack(
        &self,
        host: &dyn Host,
        owner: EntityHandle,
        item: ItemId,
        group: &Group,
    ) -> u32 {
        self.owner_key_or_log(host, owner)
            .map_or(0, |key| self.index.count(&StackKey::new(key, group.clone(), item)))
    }

    /// Instance count per item for the owner in `group`.
    pub fn get_stacks(
        &self,
        host: &dyn Host,
        owner: EntityHandle,
        group: &Group,
    ) -> BTreeMap<ItemId, u32> {
        self.owner_key_or_log(host, owner)
            .map(|key| self.index.stacks(&key, group))
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Scope and activity
    // -----------------------------------------------------------------------

    fn end_scope(&mut self, host: &mut dyn Host, ends: fn(Scope) -> bool, boundary: &str) {
        let keys = self.index.scoped(ends);
        if keys.is_empty() {
            return;
        }
        let retired = self.retire_all(host, &keys, RetireReason::ScopeEnded);
        debug!(tag = %self.tag, boundary, retired, "Scoped instances ended");
    }

    pub(crate) fn observe_owner(&mut self, host: &dyn Host, owner: EntityHandle) {
        if let Ok(key) = keys::owner_key(host, owner) {
            self.owners.observe(key, owner, host.frame());
        }
    }
}

// ---------------------------------------------------------------------------
// Event wiring
// ---------------------------------------------------------------------------

impl Subscriber for HiddenItemManager {
    fn subscriptions(&self) -> Vec<(Hook, Priority)> {
        SUBSCRIPTIONS.to_vec()
    }

    fn on_event(
        &mut self,
        host: &mut dyn Host,
        event: &HostEvent,
        priority: Priority,
    ) -> Outcome {
        match (*event, priority) {
            (HostEvent::TickUpdate, Priority::Early) => self.severing_watchdog(host),
            (HostEvent::TickUpdate, Priority::Normal) => {
                self.last_report = self.reconcile(host);
            }
            (HostEvent::EntityAppear(entity) | HostEvent::EntityUpdate(entity), Priority::Normal) => {
                self.maintain(host, entity);
            }
            (HostEvent::EntityUpdate(entity), Priority::Late) => {
                self.cull_unclaimed(host, entity);
            }
            (HostEvent::PreCollision { entity, other }, _) => {
                if guards::is_managed(&*host, entity) || guards::is_managed(&*host, other) {
                    return Outcome::Cancel;
                }
            }
            (HostEvent::Damage { target, source }, _) => {
                let from_carrier = source.is_some_and(|source| guards::is_managed(&*host, source));
                if guards::is_managed(&*host, target) || from_carrier {
                    return Outcome::Cancel;
                }
            }
            (HostEvent::ProjectileSpawn { projectile, spawner }, _) => {
                self.suppress_projectile(host, projectile, spawner);
            }
            (HostEvent::RoomChanged, _) => self.end_scope(host, Scope::is_room_scoped, "room"),
            (HostEvent::LevelChanged, _) => {
                self.end_scope(host, Scope::is_floor_scoped, "level");
            }
            (HostEvent::SessionStarted { continued }, _) => {
                if continued {
                    debug!(tag = %self.tag, "Continued session; awaiting restore");
                } else {
                    self.restore(host, None);
                }
            }
            (HostEvent::OwnerAppeared(owner) | HostEvent::OwnerUpdated(owner), _) => {
                self.observe_owner(&*host, owner);
            }
            (HostEvent::InteractionBegin(kind), _) => match kind {
                InteractionKind::OwnershipSevering => self.begin_severing(host),
                InteractionKind::GlobalReset => self.global_reset(host),
            },
            (HostEvent::InteractionEnd(kind), _) => match kind {
                InteractionKind::OwnershipSevering => self.end_severing(host),
                InteractionKind::GlobalReset => {
                    debug!(tag = %self.tag, "Global reset interaction ended");
                }
            },
            _ => {}
        }
        Outcome::Pass
    }
}
