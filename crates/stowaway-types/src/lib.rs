//! Shared type definitions for the Stowaway hidden item effect manager.
//!
//! This crate is the single source of truth for the identifiers, enums and
//! records used across the workspace. The persisted snapshot layout flows to
//! `TypeScript` via `ts-rs` so host-side tooling can read save files.
//!
//! # Modules
//!
//! - [`ids`] -- Derived keys, namespaces, host handles and engine tags
//! - [`enums`] -- Scope, entity classification and lifecycle enums
//! - [`structs`] -- Effect instance records and the persisted layout

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{CarrierState, EntityKind, InteractionKind, OwnerVariant, RetireReason, Scope};
pub use ids::{CarrierKey, EngineTag, EntityHandle, Group, ItemId, OwnerKey, StackKey};
pub use structs::{EffectInstance, PersistableState, PersistedEffect};
