//! Drive-channel regulator: proportional-derivative control of the peripheral fans
//! from the mean temperature of the spinning drives.

use tracing::debug;

use crate::control::state::ControlState;
use crate::hardware::types::{DutyCommand, SensorSample, Zone};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveStats {
    pub mean: f64,
    pub max: i32,
    pub count: usize,
}

impl DriveStats {
    /// Mean/max over spinning drives with a temperature; None when there are none.
    pub fn from_samples(samples: &[SensorSample]) -> Option<Self> {
        let temps: Vec<i32> = samples.iter().filter_map(SensorSample::valid_temperature).collect();
        let max = *temps.iter().max()?;
        let mean = temps.iter().map(|t| *t as f64).sum::<f64>() / temps.len() as f64;
        Some(Self { mean, max, count: temps.len() })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriveUpdate {
    pub stats: Option<DriveStats>,
    pub error: f64,
    pub proportional: f64,
    pub derivative: f64,
    pub delta: i32,
    pub previous_duty: u8,
    pub duty: u8,
    pub command: Option<DutyCommand>,
}

pub struct DriveRegulator {
    period_minutes: f64,
}

impl DriveRegulator {
    pub fn new(period_minutes: f64) -> Self {
        Self { period_minutes }
    }

    pub fn update(&self, state: &mut ControlState, samples: &[SensorSample]) -> DriveUpdate {
        let previous_duty = state.drive_duty;

        let update = match DriveStats::from_samples(samples) {
            None => {
                // Sensor blackout: let the disks cool passively, keep previous_error for the D term
                state.drive_duty = state.drive_limits.min;
                state.last_drive_delta = 0;
                state.last_mean_temp = None;
                state.last_max_temp = None;
                DriveUpdate {
                    stats: None,
                    error: state.previous_error,
                    proportional: 0.0,
                    derivative: 0.0,
                    delta: 0,
                    previous_duty,
                    duty: state.drive_duty,
                    command: None,
                }
            }
            Some(stats) => {
                let error = stats.mean - state.setpoint;
                let derivative = state.kd * (error - state.previous_error) / self.period_minutes;
                let proportional = state.kp * error;
                let delta = (proportional + derivative).round() as i32;
                let duty = state.drive_limits.clamp((previous_duty as i32).saturating_add(delta));

                state.previous_error = error;
                state.drive_duty = duty;
                state.last_drive_delta = delta;
                state.last_mean_temp = Some(stats.mean);
                state.last_max_temp = Some(stats.max);

                debug!(
                    "Drive PD: mean={:.2} max={} err={:.2} P={:.2} D={:.2} delta={} duty {}->{}",
                    stats.mean, stats.max, error, proportional, derivative, delta, previous_duty, duty
                );

                DriveUpdate {
                    stats: Some(stats),
                    error,
                    proportional,
                    derivative,
                    delta,
                    previous_duty,
                    duty,
                    command: None,
                }
            }
        };

        let command = if update.duty != previous_duty || !state.drive_synced {
            state.drive_synced = true;
            Some(DutyCommand { zone: Zone::Peripheral, duty_percent: update.duty })
        } else {
            None
        };

        DriveUpdate { command, ..update }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ControllerConfig;
    use approx::assert_relative_eq;

    fn state(setpoint: f64, kp: f64, kd: f64, start: u8) -> ControlState {
        let mut config = ControllerConfig::default();
        config.pid.setpoint = setpoint;
        config.pid.kp = kp;
        config.pid.kd = kd;
        config.drive_fans.duty_min = 10;
        config.drive_fans.duty_max = 100;
        config.drive_fans.start_duty = start;
        ControlState::from_config(&config)
    }

    fn spinning(temps: &[i32]) -> Vec<SensorSample> {
        temps.iter().enumerate().map(|(i, t)| SensorSample::spinning(format!("/dev/sd{}", i), *t)).collect()
    }

    #[test]
    fn test_stats_skip_standby_and_errored() {
        let mut samples = spinning(&[36, 40]);
        samples.push(SensorSample::standby("/dev/sdx"));
        samples.push(SensorSample::unavailable("/dev/sdy"));
        let stats = DriveStats::from_samples(&samples).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.max, 40);
        assert_relative_eq!(stats.mean, 38.0);
    }

    #[test]
    fn test_reference_sequence() {
        // setpoint 40, Kp 3, Kd 10, period 2 minutes, mean temps [42, 42]
        let regulator = DriveRegulator::new(2.0);
        let mut st = state(40.0, 3.0, 10.0, 50);

        let first = regulator.update(&mut st, &spinning(&[42, 42]));
        assert_relative_eq!(first.error, 2.0);
        assert_relative_eq!(first.proportional, 6.0);
        assert_relative_eq!(first.derivative, 10.0);
        assert_eq!(first.delta, 16);
        assert_eq!(first.duty, 66);

        let second = regulator.update(&mut st, &spinning(&[42, 42]));
        assert_relative_eq!(second.error, 2.0);
        assert_relative_eq!(second.derivative, 0.0);
        assert_eq!(second.delta, 6);
        assert_eq!(second.duty, 72);
        assert_eq!(second.command, Some(DutyCommand { zone: Zone::Peripheral, duty_percent: 72 }));
    }

    #[test]
    fn test_first_cycle_always_commands() {
        let regulator = DriveRegulator::new(3.0);
        let mut st = state(40.0, 3.0, 10.0, 50);
        let update = regulator.update(&mut st, &spinning(&[40]));
        assert_eq!(update.delta, 0);
        assert_eq!(update.command, Some(DutyCommand { zone: Zone::Peripheral, duty_percent: 50 }));

        let update = regulator.update(&mut st, &spinning(&[40]));
        assert_eq!(update.command, None);
    }

    #[test]
    fn test_steady_at_setpoint_has_no_correction() {
        let regulator = DriveRegulator::new(3.0);
        let mut st = state(38.0, 5.0, 120.0, 40);
        for _ in 0..3 {
            let update = regulator.update(&mut st, &spinning(&[37, 39]));
            assert_relative_eq!(update.derivative, 0.0);
            assert_eq!(update.delta, 0);
            assert_eq!(update.duty, 40);
        }
    }

    #[test]
    fn test_linear_rise_gives_constant_derivative() {
        let (kd, period, rate) = (12.0, 3.0, 0.5);
        let regulator = DriveRegulator::new(period);
        let mut st = state(30.0, 0.0, kd, 50);

        // Prime previous_error with the first point of the ramp
        regulator.update(&mut st, &[SensorSample::spinning("a", 30), SensorSample::spinning("b", 30)]);
        // Two drives: the mean rises by 0.5 each cycle
        let ramp = [(30, 31), (31, 31), (31, 32), (32, 32)];
        for (a, b) in ramp {
            let update = regulator.update(&mut st, &[SensorSample::spinning("a", a), SensorSample::spinning("b", b)]);
            assert_relative_eq!(update.derivative, kd * rate / period);
        }
    }

    #[test]
    fn test_blackout_goes_to_min_and_keeps_previous_error() {
        let regulator = DriveRegulator::new(3.0);
        let mut st = state(40.0, 3.0, 10.0, 50);
        regulator.update(&mut st, &spinning(&[44]));
        assert_relative_eq!(st.previous_error, 4.0);

        let blackout = vec![SensorSample::standby("/dev/sda"), SensorSample::unavailable("/dev/sdb")];
        let update = regulator.update(&mut st, &blackout);
        assert_eq!(update.stats, None);
        assert_eq!(update.duty, 10);
        assert_eq!(update.command, Some(DutyCommand { zone: Zone::Peripheral, duty_percent: 10 }));
        assert_relative_eq!(st.previous_error, 4.0);

        // Still blacked out: duty already at min, nothing to send
        let update = regulator.update(&mut st, &[]);
        assert_eq!(update.command, None);
        assert_relative_eq!(st.previous_error, 4.0);
    }

    #[test]
    fn test_duty_stays_within_limits() {
        let regulator = DriveRegulator::new(1.0);
        let mut st = state(35.0, 20.0, 200.0, 50);
        for temps in [[60, 62], [20, 21], [70, 71], [10, 10], [35, 35]] {
            let update = regulator.update(&mut st, &spinning(&temps));
            assert!(update.duty >= 10 && update.duty <= 100, "duty {} out of range", update.duty);
        }
    }

    #[test]
    fn test_extreme_gain_saturates_at_limits() {
        let regulator = DriveRegulator::new(3.0);
        let mut st = state(36.0, 1e12, 0.0, 50);
        let update = regulator.update(&mut st, &spinning(&[60]));
        assert_eq!(update.delta, i32::MAX);
        assert_eq!(update.duty, 100);

        let update = regulator.update(&mut st, &spinning(&[20]));
        assert_eq!(update.delta, i32::MIN);
        assert_eq!(update.duty, 10);
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        let regulator = DriveRegulator::new(1.0);
        let mut st = state(40.0, 1.0, 0.0, 50);
        // mean 40.5 -> P = 0.5 -> delta 1
        assert_eq!(regulator.update(&mut st, &spinning(&[40, 41])).delta, 1);
        // mean 39.5 -> P = -0.5 -> delta -1
        assert_eq!(regulator.update(&mut st, &spinning(&[39, 40])).delta, -1);
    }
}
