//! Hidden item effect engine.
//!
//! This crate keeps item effects alive on owners by way of invisible,
//! inert carrier entities that the host simulation may destroy, duplicate
//! or disown at any moment. One [`HiddenItemManager`] is one independent
//! engine instance; several can share a host without interfering.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `stowaway-config.yaml` into
//!   strongly-typed structs.
//! - [`host`] -- [`Host`] trait: the narrow surface of the host engine.
//! - [`events`] -- Host callbacks and the priority-ordered [`EventBus`].
//! - [`keys`] -- Stable owner and carrier key derivation.
//! - [`owners`] -- Owner directory: last-known handles and activity.
//! - [`manager`] -- The public add/remove/query API and event wiring.
//! - [`lifecycle`] -- Carrier spawn, maintenance, retirement and culling.
//! - [`reconcile`] -- Once-per-tick repair of lost carriers.
//! - [`guards`] -- Ownership severing, global reset, damage and projectile
//!   suppression.
//! - [`persistence`] -- Snapshot, restore and the on-disk snapshot file.
//! - [`sim`] -- In-memory [`SimHost`] for tests and the simulation binary.
//!
//! [`Host`]: host::Host
//! [`EventBus`]: events::EventBus
//! [`SimHost`]: sim::SimHost

pub mod config;
pub mod events;
pub mod guards;
pub mod host;
pub mod keys;
pub mod lifecycle;
pub mod manager;
pub mod owners;
pub mod persistence;
pub mod reconcile;
pub mod sim;

pub use manager::{Grant, HiddenItemManager};
