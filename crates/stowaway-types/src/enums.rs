//! Enumeration types for the hidden item manager.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Effect scope
// ---------------------------------------------------------------------------

/// How long an effect instance survives host transitions.
///
/// A room change is implied by every floor change, so room-scoped instances
/// also end on a floor change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub enum Scope {
    /// Survives room and floor changes.
    #[default]
    Persistent,
    /// Ends on the next floor change.
    Floor,
    /// Ends on the next room change (and therefore on a floor change).
    Room,
}

impl Scope {
    /// Build a scope from the two persisted flags.
    pub const fn from_flags(room_scoped: bool, floor_scoped: bool) -> Self {
        if room_scoped {
            Self::Room
        } else if floor_scoped {
            Self::Floor
        } else {
            Self::Persistent
        }
    }

    /// Whether the instance ends when the owner leaves the current room.
    pub const fn is_room_scoped(self) -> bool {
        matches!(self, Self::Room)
    }

    /// Whether the instance ends when the owner leaves the current floor.
    pub const fn is_floor_scoped(self) -> bool {
        matches!(self, Self::Room | Self::Floor)
    }
}

// ---------------------------------------------------------------------------
// Host entity classification
// ---------------------------------------------------------------------------

/// Owner variants that matter for key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OwnerVariant {
    /// An ordinary player-like actor.
    #[default]
    Standard,
    /// An owner that swaps identity in place (flip mechanics). Its primary
    /// seed is shared across both forms, so the key comes from the
    /// alternate seed instead.
    Flipping,
}

/// Coarse classification of a host entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A player-like actor that can receive effects.
    Owner,
    /// A minion entity that can back an effect instance.
    Carrier,
    /// A projectile.
    Projectile,
    /// Anything else.
    Other,
}

/// The two host interactions the engine must cooperate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    /// Temporarily severs every minion from its owner.
    OwnershipSevering,
    /// Wipes every minion and expects a clean slate.
    GlobalReset,
}

// ---------------------------------------------------------------------------
// Carrier lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a carrier as observed by one maintenance pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarrierState {
    /// Spawned and tagged, but no host callback has seen it yet.
    Spawning,
    /// Hidden, tagged and claimed by its effect instance.
    Active,
    /// Duration elapsed or the owner was replaced.
    Expired,
    /// The owner can no longer be found.
    OwnerLost,
    /// A second live carrier for an instance that is already satisfied.
    Duplicate,
    /// Marked as managed, but claimed by no index.
    Orphaned,
    /// Destroyed.
    Removed,
}

impl core::fmt::Display for CarrierState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spawning => write!(f, "spawning"),
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
            Self::OwnerLost => write!(f, "owner_lost"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Orphaned => write!(f, "orphaned"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// Why an effect instance was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetireReason {
    /// A caller removed it.
    Removed,
    /// Its duration elapsed.
    Expired,
    /// Its room or floor scope ended.
    ScopeEnded,
    /// Its carrier is linked to a different owner.
    OwnerReplaced,
    /// Its owner could not be resolved.
    OwnerUnresolvable,
    /// Its carrier was lost more times than the respawn bound allows.
    RetryExhausted,
    /// A global reset interaction cleared everything.
    GlobalReset,
}

impl RetireReason {
    /// The lifecycle state a carrier passes through for this reason.
    pub const fn carrier_state(self) -> CarrierState {
        match self {
            Self::Expired | Self::OwnerReplaced => CarrierState::Expired,
            Self::OwnerUnresolvable => CarrierState::OwnerLost,
            Self::Removed | Self::ScopeEnded | Self::RetryExhausted | Self::GlobalReset => {
                CarrierState::Removed
            }
        }
    }
}

impl core::fmt::Display for RetireReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Removed => write!(f, "removed"),
            Self::Expired => write!(f, "expired"),
            Self::ScopeEnded => write!(f, "scope_ended"),
            Self::OwnerReplaced => write!(f, "owner_replaced"),
            Self::OwnerUnresolvable => write!(f, "owner_unresolvable"),
            Self::RetryExhausted => write!(f, "retry_exhausted"),
            Self::GlobalReset => write!(f, "global_reset"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_scope_implies_floor_scope() {
        assert!(Scope::Room.is_floor_scoped());
        assert!(Scope::Room.is_room_scoped());
        assert!(Scope::Floor.is_floor_scoped());
        assert!(!Scope::Floor.is_room_scoped());
        assert!(!Scope::Persistent.is_floor_scoped());
    }

    #[test]
    fn scope_from_flags_prefers_room() {
        assert_eq!(Scope::from_flags(true, false), Scope::Room);
        assert_eq!(Scope::from_flags(true, true), Scope::Room);
        assert_eq!(Scope::from_flags(false, true), Scope::Floor);
        assert_eq!(Scope::from_flags(false, false), Scope::Persistent);
    }

    #[test]
    fn retire_reasons_map_to_terminal_states() {
        assert_eq!(RetireReason::Expired.carrier_state(), CarrierState::Expired);
        assert_eq!(
            RetireReason::OwnerUnresolvable.carrier_state(),
            CarrierState::OwnerLost
        );
        assert_eq!(RetireReason::Removed.carrier_state(), CarrierState::Removed);
    }
}
