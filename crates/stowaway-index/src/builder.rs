//! Builder and normalization for new effect instance records.
//!
//! Provides an [`EffectBuilder`] that enforces the record contract before an
//! instance reaches the index: a carrier key and creation tick are required,
//! durations are normalized (absent, zero or negative means infinite), and
//! the failure counter and initialization flag always start clean.

use stowaway_types::{CarrierKey, EffectInstance, Group, ItemId, OwnerKey, Scope};

use crate::IndexError;

// ---------------------------------------------------------------------------
// Duration normalization
// ---------------------------------------------------------------------------

/// Normalize a caller-supplied duration in ticks.
///
/// Zero and negative values mean "infinite" and map to `None`.
pub fn normalize_duration(ticks: i64) -> Option<u64> {
    u64::try_from(ticks).ok().filter(|&ticks| ticks > 0)
}

// ---------------------------------------------------------------------------
// Effect builder
// ---------------------------------------------------------------------------

/// Builder for constructing validated [`EffectInstance`] values.
///
/// # Examples
///
/// ```
/// use stowaway_index::EffectBuilder;
/// use stowaway_types::{CarrierKey, Group, ItemId, OwnerKey, Scope};
///
/// let effect = EffectBuilder::new(OwnerKey::from("owner:1"), ItemId(12))
///     .carrier(CarrierKey::from("carrier:99"))
///     .group(Group::from("buffs"))
///     .duration(-1)
///     .scope(Scope::Room)
///     .created_at(40)
///     .build();
///
/// assert!(effect.is_ok_and(|e| e.duration.is_none()));
/// ```
#[derive(Debug)]
pub struct EffectBuilder {
    owner: OwnerKey,
    item: ItemId,
    carrier: Option<CarrierKey>,
    group: Group,
    duration: Option<u64>,
    scope: Scope,
    created_at: Option<u64>,
}

impl EffectBuilder {
    /// Start building a record granting `item` to `owner` in the default
    /// group, with infinite duration and persistent scope.
    pub fn new(owner: OwnerKey, item: ItemId) -> Self {
        Self {
            owner,
            item,
            carrier: None,
            group: Group::default(),
            duration: None,
            scope: Scope::Persistent,
            created_at: None,
        }
    }

    /// Set the key of the carrier backing the instance.
    #[must_use]
    pub fn carrier(mut self, key: CarrierKey) -> Self {
        self.carrier = Some(key);
        self
    }

    /// Set the namespace.
    #[must_use]
    pub fn group(mut self, group: Group) -> Self {
        self.group = group;
        self
    }

    /// Set the lifetime in ticks; see [`normalize_duration`].
    #[must_use]
    pub fn duration(mut self, ticks: i64) -> Self {
        self.duration = normalize_duration(ticks);
        self
    }

    /// Set the room/floor scope.
    #[must_use]
    pub const fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the creation tick.
    #[must_use]
    pub const fn created_at(mut self, frame: u64) -> Self {
        self.created_at = Some(frame);
        self
    }

    /// Validate inputs and produce an [`EffectInstance`].
    ///
    /// The creation tick doubles as the carrier request tick.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::MissingField`] if the carrier key or creation
    /// tick was not set.
    pub fn build(self) -> Result<EffectInstance, IndexError> {
        let carrier = self.carrier.ok_or(IndexError::MissingField("carrier"))?;
        let created_at = self
            .created_at
            .ok_or(IndexError::MissingField("created_at"))?;

        Ok(EffectInstance {
            item: self.item,
            group: self.group,
            duration: self.duration,
            scope: self.scope,
            created_at,
            failures: 0,
            initialized: false,
            owner: self.owner,
            carrier,
            spawned_at: created_at,
        })
    }
}
