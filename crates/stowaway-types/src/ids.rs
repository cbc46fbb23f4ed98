//! Type-safe identifier wrappers.
//!
//! Identity in the hidden item manager comes in three flavours:
//!
//! - **Derived keys** ([`OwnerKey`], [`CarrierKey`]) -- strings computed from
//!   stable host attributes. They survive save/continue because the host
//!   restores those attributes verbatim.
//! - **Namespaces** ([`Group`]) -- caller-chosen strings isolating sets of
//!   effect instances.
//! - **Host handles** ([`EntityHandle`]) -- opaque, reusable, never persisted.
//!
//! [`EngineTag`] is the only UUID-backed id: each engine instance mints one
//! (UUID v7) at construction and stamps it on every carrier it claims.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an already-derived key string.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_key! {
    /// Stable identity of an owner, derived from a secondary seed rather than
    /// the host's primary identity field.
    OwnerKey
}

define_key! {
    /// Identity of a carrier, derived from the carrier's creation seed.
    ///
    /// Unique within one engine instance; two unrelated instances sharing a
    /// host may derive the same key, which is why carriers also carry an
    /// [`EngineTag`].
    CarrierKey
}

define_key! {
    /// Namespace isolating independent sets of effect instances.
    Group
}

impl Group {
    /// Sentinel used when a caller does not name a group.
    pub const DEFAULT_NAME: &'static str = "HIDDEN_ITEM_MANAGER_DEFAULT";
}

impl Default for Group {
    fn default() -> Self {
        Self(Self::DEFAULT_NAME.to_owned())
    }
}

/// Identifier of an effect type (the host's item id).
///
/// Only positive values are valid. Non-positive ids are still accepted by the
/// engine for compatibility, but instances created with them are suspect.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub struct ItemId(pub i32);

impl ItemId {
    /// Return whether the id names a real item (strictly positive).
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }

    /// Return the raw host value.
    pub const fn into_inner(self) -> i32 {
        self.0
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque host entity handle.
///
/// The host may destroy the entity behind a handle at any moment and may
/// reuse the number later, so a handle alone never proves identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityHandle(pub u64);

impl core::fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-engine-instance tag stamped on every claimed carrier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub struct EngineTag(pub Uuid);

impl EngineTag {
    /// Mint a new tag using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for EngineTag {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EngineTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key of the group index: one stack of one item for one owner
/// inside one group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackKey {
    /// The owner holding the stack.
    pub owner: OwnerKey,
    /// The namespace the stack lives in.
    pub group: Group,
    /// The item the stack grants.
    pub item: ItemId,
}

impl StackKey {
    /// Build a stack key from its parts.
    pub const fn new(owner: OwnerKey, group: Group, item: ItemId) -> Self {
        Self { owner, group, item }
    }
}
