//! Effect index and derived group index for the Stowaway hidden item manager.
//!
//! Every hidden effect instance is tracked through the [`EffectIndex`]. The
//! index owns the canonical table (carrier key to instance record) and keeps
//! the derived [`GroupIndex`] in lockstep with it, so callers can never
//! observe one without the other.
//!
//! # Architecture
//!
//! - [`effect_index`] -- The [`EffectIndex`] struct: canonical records plus
//!   all mutation and query methods.
//! - [`group_index`] -- The [`GroupIndex`]: `(owner, group, item)` to the
//!   carrier keys of that stack, in insertion order.
//! - [`builder`] -- The [`EffectBuilder`] for validated record construction.
//! - [`consistency`] -- Verification that the two tables agree.
//!
//! # Consistency Law
//!
//! For every carrier key K:
//!
//! ```text
//! K in effects  <=>  K appears exactly once in groups[stack_key(effects[K])]
//! ```
//!
//! A violation produces an [`IndexAnomaly`]. The group index is always
//! rebuildable from the effect index, so the caller's remedy is
//! [`EffectIndex::rebuild_groups`].
//!
//! # Usage
//!
//! ```
//! use stowaway_index::{EffectBuilder, EffectIndex};
//! use stowaway_index::consistency::ConsistencyResult;
//! use stowaway_types::{CarrierKey, Group, ItemId, OwnerKey, StackKey};
//!
//! let mut index = EffectIndex::new();
//! let owner = OwnerKey::from("owner:17");
//!
//! let effect = EffectBuilder::new(owner.clone(), ItemId(5))
//!     .carrier(CarrierKey::from("carrier:1"))
//!     .created_at(3)
//!     .build();
//! if let Ok(effect) = effect {
//!     index.insert(effect).ok();
//! }
//!
//! let stack = StackKey::new(owner, Group::default(), ItemId(5));
//! assert_eq!(index.count(&stack), 1);
//! assert_eq!(index.verify(), ConsistencyResult::Consistent);
//! ```

pub mod builder;
pub mod consistency;
pub mod effect_index;
pub mod group_index;

// Re-export primary types at crate root.
pub use builder::EffectBuilder;
pub use consistency::ConsistencyResult;
pub use effect_index::EffectIndex;
pub use group_index::GroupIndex;

use stowaway_types::CarrierKey;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when mutating the index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The carrier key is already claimed by another instance.
    #[error("carrier key {0} is already tracked")]
    DuplicateCarrier(CarrierKey),

    /// No instance is tracked under the carrier key.
    #[error("carrier key {0} is not tracked")]
    MissingCarrier(CarrierKey),

    /// A required field was not set on the builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A divergence between the effect index and the group index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexAnomaly {
    /// Keys listed in the group index with no effect record.
    pub dangling: Vec<CarrierKey>,
    /// Keys listed under a stack that does not match their record.
    pub misfiled: Vec<CarrierKey>,
    /// Keys with an effect record that no stack lists.
    pub unindexed: Vec<CarrierKey>,
    /// Keys listed more than once across the group index.
    pub repeated: Vec<CarrierKey>,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for IndexAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
