//! Key derivation for owners and carriers.
//!
//! The host's primary identity field is unreliable for exactly the owners
//! that need hidden effects most: it changes when an owner flips form in
//! place. Owner keys therefore come from a secondary stable seed, and for
//! [`OwnerVariant::Flipping`] owners from the alternate seed, because both
//! forms share the stable one.
//!
//! Carrier keys come from the carrier's creation seed, which the host
//! restores verbatim on continue.

use stowaway_types::{CarrierKey, EntityHandle, EntityKind, OwnerKey, OwnerVariant};

use crate::host::{CarrierInfo, Host, OwnerInfo};

/// Errors that can occur while deriving an owner key.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The entity exists but is not an owner.
    #[error("entity {entity} is a {kind:?}, not an owner")]
    InvalidOwner {
        /// The offending entity.
        entity: EntityHandle,
        /// What it actually is.
        kind: EntityKind,
    },

    /// The entity no longer exists.
    #[error("owner {0} cannot be resolved")]
    OwnerUnresolvable(EntityHandle),
}

/// Derive the key of the owner behind `entity`.
///
/// # Errors
///
/// Returns [`KeyError::InvalidOwner`] if the entity is not an owner, or
/// [`KeyError::OwnerUnresolvable`] if it is gone.
pub fn owner_key(host: &dyn Host, entity: EntityHandle) -> Result<OwnerKey, KeyError> {
    match host.kind_of(entity) {
        None => Err(KeyError::OwnerUnresolvable(entity)),
        Some(EntityKind::Owner) => host
            .owner(entity)
            .map(|info| owner_key_of(&info))
            .ok_or(KeyError::OwnerUnresolvable(entity)),
        Some(kind) => Err(KeyError::InvalidOwner { entity, kind }),
    }
}

/// Derive the key of an owner snapshot.
pub fn owner_key_of(info: &OwnerInfo) -> OwnerKey {
    let seed = match info.variant {
        OwnerVariant::Standard => info.stable_seed,
        OwnerVariant::Flipping => info.alternate_seed,
    };
    OwnerKey::new(format!("owner:{seed}"))
}

/// Derive the key of a carrier snapshot.
pub fn carrier_key(info: &CarrierInfo) -> CarrierKey {
    CarrierKey::new(format!("carrier:{}", info.seed))
}
