//! Controller configuration structs, defaults, and validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hardware::types::{FanMode, Zone};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{section}: duty_min ({min}) must not exceed duty_max ({max})")]
    DutyRange { section: &'static str, min: u8, max: u8 },
    #[error("{section}: {field} ({value}) is above 100%")]
    DutyAbove100 { section: &'static str, field: &'static str, value: u8 },
    #[error("timing: {0} must be greater than zero")]
    ZeroPeriod(&'static str),
    #[error("timing: cpu_period_secs ({cpu}) must not exceed drive_period_secs ({drive})")]
    CpuSlowerThanDrive { cpu: u64, drive: u64 },
    #[error("consistency: tolerance ({0}) must be within (0, 1)")]
    Tolerance(f64),
    #[error("{0} must be a finite number")]
    NotFinite(&'static str),
    #[error("{section}: rpm_at_30 ({low}) must be below rpm_at_100 ({high})")]
    Calibration { section: &'static str, low: u32, high: u32 },
    #[error("ipmi: control_mode must be a known fan mode")]
    ControlMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub pid: PidSettings,
    pub drive_fans: ZoneSettings,
    pub cpu_fans: ZoneSettings,
    pub cpu: CpuSettings,
    pub timing: TimingSettings,
    pub consistency: ConsistencySettings,
    pub ipmi: IpmiSettings,
    /// Explicit drive list. Empty means discover /dev/sd* and /dev/nvme*n1.
    pub drives: Vec<String>,
    pub exclude_drives: Vec<String>,
    /// Let CPU sub-iterations relax the peripheral fans while the drives are cooling.
    pub coast_down: bool,
    pub status_file: String,
    pub lock_file: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PidSettings {
    /// Target mean drive temperature, °C
    pub setpoint: f64,
    pub kp: f64,
    pub kd: f64,
}

/// Zone sections are taken whole: a section present in the file must name every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSettings {
    /// BMC zone byte used in the raw duty commands
    pub zone_id: u8,
    pub duty_min: u8,
    pub duty_max: u8,
    pub start_duty: u8,
    /// SDR fan sensor watched by the consistency checker
    pub fan_sensor: String,
    /// Calibrated RPM at 30% and 100% duty
    pub rpm_at_30: u32,
    pub rpm_at_100: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuSettings {
    pub temp_sensor: String,
    /// CPU temperature at which the CPU fans sit at duty_min
    pub reference_temp: f64,
    /// Duty percent added per degree above reference_temp
    pub scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub drive_period_secs: u64,
    pub cpu_period_secs: u64,
    /// Wait between commanding a duty and reading back fan RPM
    pub fan_settle_secs: u64,
    pub bmc_reset_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencySettings {
    pub enabled: bool,
    /// Fractional band around the calibration RPMs
    pub tolerance: f64,
    pub max_retries: u32,
    pub verify_duty_readback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpmiSettings {
    /// Mode held while this controller owns the fans
    pub control_mode: FanMode,
    /// Mode restored on shutdown so the BMC takes over again
    pub exit_fan_mode: FanMode,
    pub commands: IpmiCommands,
    pub speed_translation: SpeedTranslation,
}

/// Raw byte templates. Placeholders: {{ZONE}}, {{DUTY}}, {{MODE}}.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpmiCommands {
    pub get_fan_mode: String,
    pub set_fan_mode: String,
    pub get_duty: String,
    pub set_duty: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedTranslation {
    /// 50% -> "0x32"
    DecimalHex,
    /// 50% -> "0x7f" (percentage of 0..=255)
    ByteScale,
    /// 50% -> "50"
    Integer,
}

impl ControllerConfig {
    pub fn zone(&self, zone: Zone) -> &ZoneSettings {
        match zone {
            Zone::Cpu => &self.cpu_fans,
            Zone::Peripheral => &self.drive_fans,
        }
    }

    pub fn drive_period_minutes(&self) -> f64 {
        self.timing.drive_period_secs as f64 / 60.0
    }

    /// Number of CPU-channel iterations nested in one drive cycle.
    pub fn cpu_iterations_per_cycle(&self) -> u64 {
        (self.timing.drive_period_secs / self.timing.cpu_period_secs.max(1)).max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (section, zone) in [("drive_fans", &self.drive_fans), ("cpu_fans", &self.cpu_fans)] {
            for (field, value) in [("duty_min", zone.duty_min), ("duty_max", zone.duty_max), ("start_duty", zone.start_duty)] {
                if value > 100 {
                    return Err(ConfigError::DutyAbove100 { section, field, value });
                }
            }
            if zone.duty_min > zone.duty_max {
                return Err(ConfigError::DutyRange { section, min: zone.duty_min, max: zone.duty_max });
            }
            if zone.rpm_at_30 >= zone.rpm_at_100 {
                return Err(ConfigError::Calibration { section, low: zone.rpm_at_30, high: zone.rpm_at_100 });
            }
        }

        for (name, value) in [
            ("pid.setpoint", self.pid.setpoint),
            ("pid.kp", self.pid.kp),
            ("pid.kd", self.pid.kd),
            ("cpu.reference_temp", self.cpu.reference_temp),
            ("cpu.scale", self.cpu.scale),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite(name));
            }
        }

        if self.timing.drive_period_secs == 0 {
            return Err(ConfigError::ZeroPeriod("drive_period_secs"));
        }
        if self.timing.cpu_period_secs == 0 {
            return Err(ConfigError::ZeroPeriod("cpu_period_secs"));
        }
        if self.timing.cpu_period_secs > self.timing.drive_period_secs {
            return Err(ConfigError::CpuSlowerThanDrive {
                cpu: self.timing.cpu_period_secs,
                drive: self.timing.drive_period_secs,
            });
        }

        let tol = self.consistency.tolerance;
        if !(tol > 0.0 && tol < 1.0) {
            return Err(ConfigError::Tolerance(tol));
        }

        if matches!(self.ipmi.control_mode, FanMode::Unknown(_)) {
            return Err(ConfigError::ControlMode);
        }

        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pid: PidSettings::default(),
            drive_fans: ZoneSettings {
                zone_id: 1,
                duty_min: 15,
                duty_max: 100,
                start_duty: 60,
                fan_sensor: "FANA".to_string(),
                rpm_at_30: 600,
                rpm_at_100: 1800,
            },
            cpu_fans: ZoneSettings {
                zone_id: 0,
                duty_min: 30,
                duty_max: 100,
                start_duty: 60,
                fan_sensor: "FAN1".to_string(),
                rpm_at_30: 500,
                rpm_at_100: 1600,
            },
            cpu: CpuSettings::default(),
            timing: TimingSettings::default(),
            consistency: ConsistencySettings::default(),
            ipmi: IpmiSettings::default(),
            drives: Vec::new(),
            exclude_drives: Vec::new(),
            coast_down: true,
            status_file: "/run/nas-fanctl/status.json".to_string(),
            lock_file: "/run/nas-fanctl/nas-fanctl.lock".to_string(),
            log_level: "INFO".to_string(),
        }
    }
}

impl Default for PidSettings {
    fn default() -> Self {
        Self { setpoint: 36.0, kp: 16.0 / 3.0, kd: 120.0 }
    }
}

impl Default for CpuSettings {
    fn default() -> Self {
        Self { temp_sensor: "CPU Temp".to_string(), reference_temp: 35.0, scale: 2.0 }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self { drive_period_secs: 180, cpu_period_secs: 10, fan_settle_secs: 5, bmc_reset_wait_secs: 120 }
    }
}

impl Default for ConsistencySettings {
    fn default() -> Self {
        Self { enabled: true, tolerance: 0.2, max_retries: 2, verify_duty_readback: false }
    }
}

impl Default for IpmiSettings {
    fn default() -> Self {
        Self {
            control_mode: FanMode::Full,
            exit_fan_mode: FanMode::Optimal,
            commands: IpmiCommands::default(),
            speed_translation: SpeedTranslation::DecimalHex,
        }
    }
}

impl Default for IpmiCommands {
    fn default() -> Self {
        Self {
            get_fan_mode: "0x30 0x45 0x00".to_string(),
            set_fan_mode: "0x30 0x45 0x01 {{MODE}}".to_string(),
            get_duty: "0x30 0x70 0x66 0x00 {{ZONE}}".to_string(),
            set_duty: "0x30 0x70 0x66 0x01 {{ZONE}} {{DUTY}}".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ControllerConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.cpu_iterations_per_cycle(), 18);
        assert_eq!(config.drive_period_minutes(), 3.0);
    }

    #[test]
    fn test_cpu_iterations_floor() {
        let mut config = ControllerConfig::default();
        config.timing.drive_period_secs = 100;
        config.timing.cpu_period_secs = 30;
        assert_eq!(config.cpu_iterations_per_cycle(), 3);
    }

    #[test]
    fn test_rejects_inverted_duty_range() {
        let mut config = ControllerConfig::default();
        config.cpu_fans.duty_min = 80;
        config.cpu_fans.duty_max = 50;
        assert_eq!(config.validate(), Err(ConfigError::DutyRange { section: "cpu_fans", min: 80, max: 50 }));
    }

    #[test]
    fn test_rejects_bad_timing_and_tolerance() {
        let mut config = ControllerConfig::default();
        config.timing.cpu_period_secs = 600;
        assert!(matches!(config.validate(), Err(ConfigError::CpuSlowerThanDrive { .. })));

        let mut config = ControllerConfig::default();
        config.timing.drive_period_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPeriod("drive_period_secs")));

        let mut config = ControllerConfig::default();
        config.consistency.tolerance = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::Tolerance(1.5)));
    }

    #[test]
    fn test_rejects_nan_gain() {
        let mut config = ControllerConfig::default();
        config.pid.kd = f64::NAN;
        assert_eq!(config.validate(), Err(ConfigError::NotFinite("pid.kd")));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{ "pid": { "setpoint": 38.0 }, "timing": { "cpu_period_secs": 20 } }"#).unwrap();
        assert_eq!(config.pid.setpoint, 38.0);
        assert_eq!(config.pid.kd, 120.0);
        assert_eq!(config.timing.cpu_period_secs, 20);
        assert_eq!(config.timing.drive_period_secs, 180);
        assert_eq!(config.cpu_fans.fan_sensor, "FAN1");
        assert_eq!(config.ipmi.control_mode, FanMode::Full);
    }

    #[test]
    fn test_partial_zone_section_is_rejected() {
        let parsed = serde_json::from_str::<ControllerConfig>(r#"{ "cpu_fans": { "duty_min": 25 } }"#);
        assert!(parsed.is_err());
    }
}
