//! Actuator: idempotent application of duty commands to BMC fan zones.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::hardware::types::{DutyCommand, Zone};
use crate::hardware::FanInterface;

#[derive(Debug, Default)]
pub struct Actuator {
    /// Last duty the interface accepted, per zone
    last_applied: HashMap<Zone, u8>,
    /// Zones whose next command must reach the interface even if unchanged
    forced: HashSet<Zone>,
}

impl Actuator {
    /// Starts with every zone force-flagged so the first command always goes out.
    pub fn new() -> Self {
        let mut actuator = Self::default();
        actuator.force_resync_all();
        actuator
    }

    pub fn force_resync_all(&mut self) {
        self.forced.extend(Zone::ALL);
    }

    pub fn last_applied(&self, zone: Zone) -> Option<u8> {
        self.last_applied.get(&zone).copied()
    }

    pub fn is_forced(&self, zone: Zone) -> bool {
        self.forced.contains(&zone)
    }

    /// Returns true when the interface was called and accepted the command.
    /// A failure is logged only; the next consistency check catches its effect.
    pub async fn apply(&mut self, iface: &dyn FanInterface, cmd: DutyCommand) -> bool {
        let forced = self.is_forced(cmd.zone);
        if !forced && self.last_applied(cmd.zone) == Some(cmd.duty_percent) {
            debug!("{} zone already at {}%, skipping", cmd.zone, cmd.duty_percent);
            return false;
        }

        match iface.set_duty(cmd.zone, cmd.duty_percent).await {
            Ok(()) => {
                if forced {
                    info!("{} zone resynced at {}%", cmd.zone, cmd.duty_percent);
                }
                self.last_applied.insert(cmd.zone, cmd.duty_percent);
                self.forced.remove(&cmd.zone);
                true
            }
            Err(e) => {
                warn!("Failed to set {} zone to {}%: {}", cmd.zone, cmd.duty_percent, e);
                false
            }
        }
    }
}
