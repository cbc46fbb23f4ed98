//! Host event dispatch.
//!
//! The host drives the engine exclusively through callbacks. A
//! [`HostEvent`] names what happened; each [`Subscriber`] declares which
//! [`Hook`]s it listens to and at which [`Priority`]. The [`EventBus`]
//! delivers an event to its listeners in a fixed order: every `Early`
//! registration first, then `Normal`, then `Late`, each band in
//! registration order. Any listener may return [`Outcome::Cancel`] to veto
//! the host's default handling (damage, collision); the remaining listeners
//! still run.
//!
//! Several engine instances can share one bus. They never talk to each
//! other; the host entities they touch carry the instance tag that tells
//! them apart.

use stowaway_types::{EntityHandle, InteractionKind};

use crate::host::Host;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The callback points a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Hook {
    /// Once per host tick, after entity updates.
    TickUpdate,
    /// An entity was created or restored.
    EntityAppear,
    /// Per-entity update.
    EntityUpdate,
    /// Two entities are about to collide.
    PreCollision,
    /// An entity is about to take damage.
    Damage,
    /// A projectile was created.
    ProjectileSpawn,
    /// The owner group entered a new room.
    RoomChanged,
    /// The owner group entered a new level.
    LevelChanged,
    /// A new session started or a saved one was continued.
    SessionStarted,
    /// An owner entity appeared.
    OwnerAppeared,
    /// Per-owner update.
    OwnerUpdated,
    /// A special interaction began.
    InteractionBegin,
    /// A special interaction ended.
    InteractionEnd,
}

/// Something the host reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// Once per host tick.
    TickUpdate,
    /// An entity was created or restored.
    EntityAppear(EntityHandle),
    /// Per-entity update.
    EntityUpdate(EntityHandle),
    /// `entity` is about to collide with `other`.
    PreCollision {
        /// The entity being updated.
        entity: EntityHandle,
        /// What it collides with.
        other: EntityHandle,
    },
    /// `target` is about to take damage.
    Damage {
        /// The entity being hurt.
        target: EntityHandle,
        /// Whatever dealt the damage, if known.
        source: Option<EntityHandle>,
    },
    /// A projectile was created.
    ProjectileSpawn {
        /// The new projectile.
        projectile: EntityHandle,
        /// The entity that fired it, if known.
        spawner: Option<EntityHandle>,
    },
    /// The owner group entered a new room.
    RoomChanged,
    /// The owner group entered a new level.
    LevelChanged,
    /// A session started.
    SessionStarted {
        /// `true` when a saved run was continued.
        continued: bool,
    },
    /// An owner entity appeared.
    OwnerAppeared(EntityHandle),
    /// Per-owner update.
    OwnerUpdated(EntityHandle),
    /// A special interaction began.
    InteractionBegin(InteractionKind),
    /// A special interaction ended.
    InteractionEnd(InteractionKind),
}

impl HostEvent {
    /// The hook this event is delivered on.
    pub const fn hook(&self) -> Hook {
        match self {
            Self::TickUpdate => Hook::TickUpdate,
            Self::EntityAppear(_) => Hook::EntityAppear,
            Self::EntityUpdate(_) => Hook::EntityUpdate,
            Self::PreCollision { .. } => Hook::PreCollision,
            Self::Damage { .. } => Hook::Damage,
            Self::ProjectileSpawn { .. } => Hook::ProjectileSpawn,
            Self::RoomChanged => Hook::RoomChanged,
            Self::LevelChanged => Hook::LevelChanged,
            Self::SessionStarted { .. } => Hook::SessionStarted,
            Self::OwnerAppeared(_) => Hook::OwnerAppeared,
            Self::OwnerUpdated(_) => Hook::OwnerUpdated,
            Self::InteractionBegin(_) => Hook::InteractionBegin,
            Self::InteractionEnd(_) => Hook::InteractionEnd,
        }
    }
}

/// Ordering band within one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Runs before everything else.
    Early,
    /// Default band.
    Normal,
    /// Runs after everything else.
    Late,
}

impl Priority {
    /// Every band, in dispatch order.
    pub const ALL: [Self; 3] = [Self::Early, Self::Normal, Self::Late];
}

/// What a listener wants done with the host's default handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Outcome {
    /// Let the host proceed.
    #[default]
    Pass,
    /// Suppress the host's default handling.
    Cancel,
}

impl Outcome {
    /// Combine two outcomes; any cancel wins.
    #[must_use]
    pub const fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::Pass, Self::Pass) => Self::Pass,
            _ => Self::Cancel,
        }
    }

    /// Whether the host should skip its default handling.
    pub const fn is_cancel(self) -> bool {
        matches!(self, Self::Cancel)
    }
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// A listener on the event bus.
pub trait Subscriber {
    /// The hooks and bands this subscriber listens on. Read once at
    /// registration.
    fn subscriptions(&self) -> Vec<(Hook, Priority)>;

    /// Handle one event delivered at `priority`.
    fn on_event(&mut self, host: &mut dyn Host, event: &HostEvent, priority: Priority)
    -> Outcome;
}

/// Index of a subscriber within its bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(usize);

#[derive(Debug, Clone, Copy)]
struct Registration {
    hook: Hook,
    priority: Priority,
    subscriber: usize,
}

/// Dispatches host events to registered subscribers.
#[derive(Debug)]
pub struct EventBus<S> {
    subscribers: Vec<S>,
    registrations: Vec<Registration>,
}

impl<S> Default for EventBus<S> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
            registrations: Vec::new(),
        }
    }
}

impl<S: Subscriber> EventBus<S> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Its subscriptions are read once, now.
    pub fn register(&mut self, subscriber: S) -> SubscriberId {
        let index = self.subscribers.len();
        for (hook, priority) in subscriber.subscriptions() {
            self.registrations.push(Registration {
                hook,
                priority,
                subscriber: index,
            });
        }
        self.subscribers.push(subscriber);
        SubscriberId(index)
    }

    /// Number of registered subscribers.
    pub const fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether no subscriber is registered.
    pub const fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Borrow a subscriber.
    pub fn get(&self, id: SubscriberId) -> Option<&S> {
        self.subscribers.get(id.0)
    }

    /// Mutably borrow a subscriber.
    pub fn get_mut(&mut self, id: SubscriberId) -> Option<&mut S> {
        self.subscribers.get_mut(id.0)
    }

    /// Iterate over subscribers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (SubscriberId, &S)> {
        self.subscribers
            .iter()
            .enumerate()
            .map(|(index, subscriber)| (SubscriberId(index), subscriber))
    }

    /// Deliver `event` to every listener on its hook.
    pub fn dispatch(&mut self, host: &mut dyn Host, event: &HostEvent) -> Outcome {
        let hook = event.hook();
        let mut outcome = Outcome::Pass;
        for priority in Priority::ALL {
            for registration in &self.registrations {
                if registration.hook != hook || registration.priority != priority {
                    continue;
                }
                if let Some(subscriber) = self.subscribers.get_mut(registration.subscriber) {
                    outcome = outcome.and(subscriber.on_event(host, event, priority));
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sim::SimHost;

    #[derive(Debug, Default)]
    struct Recorder {
        name: &'static str,
        subscriptions: Vec<(Hook, Priority)>,
        cancel: bool,
        seen: Vec<(Hook, Priority)>,
    }

    impl Recorder {
        fn new(name: &'static str, subscriptions: Vec<(Hook, Priority)>) -> Self {
            Self {
                name,
                subscriptions,
                ..Self::default()
            }
        }
    }

    impl Subscriber for Recorder {
        fn subscriptions(&self) -> Vec<(Hook, Priority)> {
            self.subscriptions.clone()
        }

        fn on_event(
            &mut self,
            _host: &mut dyn Host,
            event: &HostEvent,
            priority: Priority,
        ) -> Outcome {
            self.seen.push((event.hook(), priority));
            if self.cancel {
                Outcome::Cancel
            } else {
                Outcome::Pass
            }
        }
    }

    #[test]
    fn bands_run_in_order() {
        let mut host = SimHost::new(1);
        let mut bus = EventBus::new();
        let late = bus.register(Recorder::new(
            "late",
            vec![(Hook::TickUpdate, Priority::Late)],
        ));
        let early = bus.register(Recorder::new(
            "early",
            vec![
                (Hook::TickUpdate, Priority::Early),
                (Hook::TickUpdate, Priority::Normal),
            ],
        ));

        bus.dispatch(&mut host, &HostEvent::TickUpdate);

        let early = bus.get(early).unwrap();
        assert_eq!(early.name, "early");
        assert_eq!(
            early.seen,
            vec![
                (Hook::TickUpdate, Priority::Early),
                (Hook::TickUpdate, Priority::Normal),
            ]
        );
        assert_eq!(
            bus.get(late).unwrap().seen,
            vec![(Hook::TickUpdate, Priority::Late)]
        );
    }

    #[test]
    fn unrelated_hooks_are_skipped() {
        let mut host = SimHost::new(1);
        let mut bus = EventBus::new();
        let id = bus.register(Recorder::new(
            "room",
            vec![(Hook::RoomChanged, Priority::Normal)],
        ));
        bus.dispatch(&mut host, &HostEvent::LevelChanged);
        assert!(bus.get(id).unwrap().seen.is_empty());
    }

    #[test]
    fn any_cancel_wins_and_everyone_runs() {
        let mut host = SimHost::new(1);
        let mut bus = EventBus::new();
        let mut vetoer = Recorder::new("veto", vec![(Hook::Damage, Priority::Early)]);
        vetoer.cancel = true;
        bus.register(vetoer);
        let observer = bus.register(Recorder::new(
            "observer",
            vec![(Hook::Damage, Priority::Normal)],
        ));

        let outcome = bus.dispatch(
            &mut host,
            &HostEvent::Damage {
                target: EntityHandle(1),
                source: None,
            },
        );
        assert!(outcome.is_cancel());
        assert_eq!(bus.get(observer).unwrap().seen.len(), 1);
    }

    #[test]
    fn outcome_combination() {
        assert_eq!(Outcome::Pass.and(Outcome::Pass), Outcome::Pass);
        assert_eq!(Outcome::Pass.and(Outcome::Cancel), Outcome::Cancel);
        assert_eq!(Outcome::Cancel.and(Outcome::Pass), Outcome::Cancel);
    }
}
