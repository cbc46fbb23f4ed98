//! Consistency verification between the effect index and the group index.
//!
//! The group index is a pure projection of the effect index. Every mutation
//! on [`EffectIndex`](crate::EffectIndex) updates both tables, so this check
//! passes by construction; the reconciliation loop runs it once per tick to
//! catch corruption and heal it by rebuilding the projection.
//!
//! For every carrier key K the check is:
//!
//! ```text
//! K in effects  <=>  K listed exactly once, under stack_key(effects[K])
//! ```

use std::collections::{BTreeMap, BTreeSet};

use stowaway_types::{CarrierKey, EffectInstance};

use crate::{GroupIndex, IndexAnomaly};

/// The result of a consistency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyResult {
    /// Both tables agree.
    Consistent,
    /// The group index diverged from the effect index.
    Divergent(IndexAnomaly),
}

impl ConsistencyResult {
    /// Whether the tables agree.
    pub const fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }
}

/// Verify that `groups` is exactly the projection of `effects`.
pub fn verify_consistency(
    effects: &BTreeMap<CarrierKey, EffectInstance>,
    groups: &GroupIndex,
) -> ConsistencyResult {
    let mut anomaly = IndexAnomaly::default();
    let mut seen: BTreeSet<&CarrierKey> = BTreeSet::new();

    for (stack, members) in groups.iter() {
        for key in members {
            if !seen.insert(key) {
                anomaly.repeated.push(key.clone());
                continue;
            }
            match effects.get(key) {
                None => anomaly.dangling.push(key.clone()),
                Some(effect) if effect.stack_key() != *stack => {
                    anomaly.misfiled.push(key.clone());
                }
                Some(_) => {}
            }
        }
    }

    for key in effects.keys() {
        if !seen.contains(key) {
            anomaly.unindexed.push(key.clone());
        }
    }

    let problems = anomaly
        .dangling
        .len()
        .saturating_add(anomaly.misfiled.len())
        .saturating_add(anomaly.unindexed.len())
        .saturating_add(anomaly.repeated.len());

    if problems == 0 {
        ConsistencyResult::Consistent
    } else {
        anomaly.message = format!(
            "INDEX_DIVERGENCE: {problems} carrier key(s) disagree between effect and group index \
             (dangling {}, misfiled {}, unindexed {}, repeated {})",
            anomaly.dangling.len(),
            anomaly.misfiled.len(),
            anomaly.unindexed.len(),
            anomaly.repeated.len(),
        );
        ConsistencyResult::Divergent(anomaly)
    }
}
