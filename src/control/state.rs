//! Process-wide regulator state.

use crate::config::types::{ControllerConfig, ZoneSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyLimits {
    pub min: u8,
    pub max: u8,
}

impl DutyLimits {
    pub fn clamp(&self, duty: i32) -> u8 {
        duty.clamp(self.min as i32, self.max as i32) as u8
    }
}

impl From<&ZoneSettings> for DutyLimits {
    fn from(zone: &ZoneSettings) -> Self {
        Self { min: zone.duty_min, max: zone.duty_max }
    }
}

/// Mutated only by the regulators, once per (sub-)cycle.
#[derive(Debug, Clone)]
pub struct ControlState {
    pub setpoint: f64,
    pub kp: f64,
    pub kd: f64,
    /// Error of the last cycle that had at least one valid drive sample
    pub previous_error: f64,
    pub drive_duty: u8,
    pub cpu_duty: u8,
    pub drive_limits: DutyLimits,
    pub cpu_limits: DutyLimits,
    /// Correction computed by the last drive cycle (0 on blackout)
    pub last_drive_delta: i32,
    pub last_mean_temp: Option<f64>,
    pub last_max_temp: Option<i32>,
    pub last_cpu_temp: Option<i32>,
    /// False until each channel has issued its first command
    pub drive_synced: bool,
    pub cpu_synced: bool,
}

impl ControlState {
    pub fn from_config(config: &ControllerConfig) -> Self {
        let drive_limits = DutyLimits::from(&config.drive_fans);
        let cpu_limits = DutyLimits::from(&config.cpu_fans);
        Self {
            setpoint: config.pid.setpoint,
            kp: config.pid.kp,
            kd: config.pid.kd,
            previous_error: 0.0,
            drive_duty: drive_limits.clamp(config.drive_fans.start_duty as i32),
            cpu_duty: cpu_limits.clamp(config.cpu_fans.start_duty as i32),
            drive_limits,
            cpu_limits,
            last_drive_delta: 0,
            last_mean_temp: None,
            last_max_temp: None,
            last_cpu_temp: None,
            drive_synced: false,
            cpu_synced: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp() {
        let limits = DutyLimits { min: 20, max: 80 };
        assert_eq!(limits.clamp(-5), 20);
        assert_eq!(limits.clamp(50), 50);
        assert_eq!(limits.clamp(300), 80);
    }

    #[test]
    fn test_start_duty_is_clamped() {
        let mut config = ControllerConfig::default();
        config.cpu_fans.start_duty = 10;
        let state = ControlState::from_config(&config);
        assert_eq!(state.cpu_duty, config.cpu_fans.duty_min);
        assert_eq!(state.previous_error, 0.0);
        assert!(!state.drive_synced);
    }
}
