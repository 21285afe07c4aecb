//! CPU-channel regulator: purely proportional, no history. Also hosts the
//! peripheral-fan coast-down step that runs on the CPU cadence.

use crate::config::types::CpuSettings;
use crate::control::state::ControlState;
use crate::hardware::types::{DutyCommand, Zone};

pub struct CpuRegulator {
    reference_temp: f64,
    scale: f64,
}

impl CpuRegulator {
    pub fn new(settings: &CpuSettings) -> Self {
        Self { reference_temp: settings.reference_temp, scale: settings.scale }
    }

    /// Duty for a CPU temperature, clamped to the CPU zone's limits.
    pub fn duty_for(&self, state: &ControlState, cpu_temp: i32) -> u8 {
        let min = state.cpu_limits.min as f64;
        let raw = ((cpu_temp as f64 - self.reference_temp) * self.scale + min).round();
        state.cpu_limits.clamp(raw as i32)
    }

    /// Without a reading the duty is held and nothing is sent.
    pub fn update(&self, state: &mut ControlState, cpu_temp: Option<i32>) -> Option<DutyCommand> {
        state.last_cpu_temp = cpu_temp;
        let temp = cpu_temp?;

        let duty = self.duty_for(state, temp);
        if duty == state.cpu_duty && state.cpu_synced {
            return None;
        }
        state.cpu_duty = duty;
        state.cpu_synced = true;
        Some(DutyCommand { zone: Zone::Cpu, duty_percent: duty })
    }
}

/// Relax the peripheral fans between drive cycles while the drives are cooling.
///
/// Applies when the last drive correction was negative and the mean drive
/// temperature is at least one degree below the setpoint; the last correction is
/// applied again, bounded at the drive minimum.
pub fn coast_down(state: &mut ControlState) -> Option<DutyCommand> {
    let mean = state.last_mean_temp?;
    if state.last_drive_delta >= 0 || mean > state.setpoint - 1.0 {
        return None;
    }

    let duty = state.drive_limits.clamp((state.drive_duty as i32).saturating_add(state.last_drive_delta));
    if duty == state.drive_duty {
        return None;
    }
    state.drive_duty = duty;
    Some(DutyCommand { zone: Zone::Peripheral, duty_percent: duty })
}
