//! Reconciliation loop: once per host tick, bring the set of live carriers
//! back in line with the effect index.
//!
//! Each pass:
//!
//! 1. retires every timed instance past its lifetime;
//! 2. visits every indexed instance and, if its carrier cannot be
//!    resolved, respawns it, unless the instance is still inside its grace
//!    tick or its owner is unresolvable or idle;
//! 3. deletes instances whose carrier has been lost more than
//!    `max_respawn_attempts` times in a row;
//! 4. verifies the two index tables agree and rebuilds the group index if
//!    they do not.

use serde::Serialize;
use stowaway_index::consistency::ConsistencyResult;
use stowaway_types::RetireReason;
use tracing::{debug, error, warn};

use crate::host::Host;
use crate::keys;
use crate::lifecycle::CarrierRef;
use crate::manager::HiddenItemManager;

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Host tick the pass ran on.
    pub frame: u64,
    /// Instances retired for exceeding their lifetime.
    pub expired: u32,
    /// Instances whose carrier resolved.
    pub resolved: u32,
    /// Instances left alone because they are new or their owner is idle.
    pub waiting: u32,
    /// Carriers respawned.
    pub respawned: u32,
    /// Instances deleted after exhausting their respawn attempts.
    pub abandoned: u32,
    /// Whether the group index had to be rebuilt.
    pub healed: bool,
}

impl HiddenItemManager {
    /// Run one reconciliation pass.
    pub(crate) fn reconcile(&mut self, host: &mut dyn Host) -> ReconcileReport {
        let frame = host.frame();
        let mut report = ReconcileReport {
            frame,
            ..ReconcileReport::default()
        };

        let expired = self.index.expired(frame);
        report.expired = self.retire_all(host, &expired, RetireReason::Expired);

        for key in self.index.keys() {
            let Some(effect) = self.index.get(&key) else {
                continue;
            };
            if !effect.initialized && effect.spawned_at >= frame {
                report.waiting = report.waiting.saturating_add(1);
                continue;
            }
            let owner_key = effect.owner.clone();
            let item = effect.item;

            let resolved = self
                .carriers
                .get(&key)
                .and_then(|carrier| carrier.resolve(&*host, self.tag))
                .is_some();
            if resolved {
                self.index.reset_failures(&key);
                report.resolved = report.resolved.saturating_add(1);
                continue;
            }

            let Some(owner) = self.owners.resolve(&*host, &owner_key) else {
                report.waiting = report.waiting.saturating_add(1);
                continue;
            };
            if !self
                .owners
                .is_active(&owner_key, frame, self.config.owner_idle_ticks)
            {
                report.waiting = report.waiting.saturating_add(1);
                continue;
            }

            let Some(failures) = self.index.record_failure(&key) else {
                continue;
            };
            if failures == 1 {
                warn!(tag = %self.tag, frame, %key, %item, owner = %owner_key, "Carrier lost; respawning");
            }
            if failures > self.config.max_respawn_attempts {
                warn!(
                    tag = %self.tag,
                    frame,
                    %key,
                    %item,
                    owner = %owner_key,
                    failures,
                    "Carrier keeps disappearing; deleting instance"
                );
                self.retire(host, &key, RetireReason::RetryExhausted);
                report.abandoned = report.abandoned.saturating_add(1);
                continue;
            }

            self.carriers.remove(&key);
            let Some(info) = self.spawn_hidden(host, owner, item) else {
                continue;
            };
            let new_key = keys::carrier_key(&info);
            match self.index.rekey(&key, new_key.clone(), frame) {
                Ok(()) => {
                    debug!(tag = %self.tag, frame, old = %key, new = %new_key, failures, "Carrier respawned");
                    self.carriers
                        .insert(new_key.clone(), CarrierRef::new(info.handle, new_key));
                    report.respawned = report.respawned.saturating_add(1);
                }
                Err(err) => {
                    warn!(tag = %self.tag, frame, %key, %err, "Could not rekey respawned carrier");
                    host.silent_kill(info.handle);
                }
            }
        }

        if self.config.verify_indices {
            if let ConsistencyResult::Divergent(anomaly) = self.index.verify() {
                error!(tag = %self.tag, frame, %anomaly, "Index divergence detected; rebuilding group index");
                self.index.rebuild_groups();
                report.healed = true;
            }
        }

        report
    }
}
