//! Consistency checker: decides whether commanded duty and observed fan state agree,
//! and tracks the bounded correction state machine.
//!
//! ```text
//! Ok --mismatch--> Mismatch{0} --retry fails--> ... Mismatch{n} --n == max_retries--> Escalated
//! Escalated --still mismatched--> Accepted      (any healthy observation --> Ok)
//! ```

use std::fmt;

use crate::config::types::ControllerConfig;
use crate::hardware::types::{FanMode, Zone};

/// Duty at or above which the fans must be near their calibrated maximum.
pub const HIGH_DUTY: u8 = 95;
/// Duty below which the fans must be near their calibrated 30% speed.
pub const LOW_DUTY: u8 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Ok,
    /// `failed` correction attempts have been tried without effect
    Mismatch { failed: u32 },
    Escalated,
    /// Mismatch survived a controller reset; tolerated until a healthy reading
    Accepted,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckState::Ok => write!(f, "ok"),
            CheckState::Mismatch { failed } => write!(f, "mismatch ({} failed)", failed),
            CheckState::Escalated => write!(f, "escalated"),
            CheckState::Accepted => write!(f, "accepted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckAction {
    None,
    /// Re-apply fan mode and duties, then re-check. `attempt` counts from 1.
    Retry { attempt: u32 },
    /// Cold-reset the controller, force-reapply, re-check once
    Escalate,
    /// Give up on this mismatch and carry on
    Accept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub rpm_at_30: u32,
    pub rpm_at_100: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneObservation {
    pub zone: Zone,
    pub commanded: u8,
    pub rpm: Option<u32>,
    pub readback: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub fan_mode: Option<FanMode>,
    pub zones: Vec<ZoneObservation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    TooSlow { zone: Zone, duty: u8, rpm: u32, floor: u32 },
    TooFast { zone: Zone, duty: u8, rpm: u32, ceiling: u32 },
    FanMode { expected: FanMode, actual: FanMode },
    Readback { zone: Zone, commanded: u8, actual: u8 },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::TooSlow { zone, duty, rpm, floor } => {
                write!(f, "{} fans at {} RPM with {}% duty (expected >= {})", zone, rpm, duty, floor)
            }
            Mismatch::TooFast { zone, duty, rpm, ceiling } => {
                write!(f, "{} fans at {} RPM with {}% duty (expected <= {})", zone, rpm, duty, ceiling)
            }
            Mismatch::FanMode { expected, actual } => write!(f, "BMC fan mode is {} (expected {})", actual, expected),
            Mismatch::Readback { zone, commanded, actual } => {
                write!(f, "{} zone reads back {}% (commanded {}%)", zone, actual, commanded)
            }
        }
    }
}

pub struct ConsistencyChecker {
    state: CheckState,
    max_retries: u32,
    tolerance: f64,
    control_mode: FanMode,
    cpu: Calibration,
    peripheral: Calibration,
}

impl ConsistencyChecker {
    pub fn new(config: &ControllerConfig) -> Self {
        let calibration = |zone: Zone| {
            let z = config.zone(zone);
            Calibration { rpm_at_30: z.rpm_at_30, rpm_at_100: z.rpm_at_100 }
        };
        Self {
            state: CheckState::Ok,
            max_retries: config.consistency.max_retries,
            tolerance: config.consistency.tolerance,
            control_mode: config.ipmi.control_mode,
            cpu: calibration(Zone::Cpu),
            peripheral: calibration(Zone::Peripheral),
        }
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    fn calibration(&self, zone: Zone) -> Calibration {
        match zone {
            Zone::Cpu => self.cpu,
            Zone::Peripheral => self.peripheral,
        }
    }

    /// Everything implausible about an observation. Missing readings are no evidence.
    pub fn find_mismatches(&self, obs: &Observation) -> Vec<Mismatch> {
        let mut found = Vec::new();

        if let Some(actual) = obs.fan_mode {
            if actual != self.control_mode {
                found.push(Mismatch::FanMode { expected: self.control_mode, actual });
            }
        }

        for z in &obs.zones {
            let cal = self.calibration(z.zone);
            if let Some(rpm) = z.rpm {
                let floor = (cal.rpm_at_100 as f64 * (1.0 - self.tolerance)).round() as u32;
                let ceiling = (cal.rpm_at_30 as f64 * (1.0 + self.tolerance)).round() as u32;
                if z.commanded >= HIGH_DUTY && rpm < floor {
                    found.push(Mismatch::TooSlow { zone: z.zone, duty: z.commanded, rpm, floor });
                } else if z.commanded < LOW_DUTY && rpm > ceiling {
                    found.push(Mismatch::TooFast { zone: z.zone, duty: z.commanded, rpm, ceiling });
                }
            }
            if let Some(actual) = z.readback {
                if actual != z.commanded {
                    found.push(Mismatch::Readback { zone: z.zone, commanded: z.commanded, actual });
                }
            }
        }

        found
    }

    /// Advance the state machine with the outcome of one evaluation.
    pub fn observe(&mut self, mismatched: bool) -> CheckAction {
        if !mismatched {
            self.state = CheckState::Ok;
            return CheckAction::None;
        }

        let (next, action) = match self.state {
            CheckState::Ok if self.max_retries == 0 => (CheckState::Escalated, CheckAction::Escalate),
            CheckState::Ok => (CheckState::Mismatch { failed: 0 }, CheckAction::Retry { attempt: 1 }),
            CheckState::Mismatch { failed } => {
                let failed = failed + 1;
                if failed >= self.max_retries {
                    (CheckState::Escalated, CheckAction::Escalate)
                } else {
                    (CheckState::Mismatch { failed }, CheckAction::Retry { attempt: failed + 1 })
                }
            }
            CheckState::Escalated => (CheckState::Accepted, CheckAction::Accept),
            CheckState::Accepted => (CheckState::Accepted, CheckAction::None),
        };

        self.state = next;
        action
    }
}
