//! Hardware data types: sensor samples, fan zones, fan modes, and the parsed SDR table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Independently controllable fan group on the BMC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Cpu,
    Peripheral,
}

impl Zone {
    pub const ALL: [Zone; 2] = [Zone::Cpu, Zone::Peripheral];
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Cpu => write!(f, "cpu"),
            Zone::Peripheral => write!(f, "peripheral"),
        }
    }
}

/// Supermicro BMC fan mode as reported by `raw 0x30 0x45 0x00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanMode {
    Standard,
    Full,
    Optimal,
    HeavyIo,
    #[serde(skip)]
    Unknown(u8),
}

impl FanMode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => FanMode::Standard,
            1 => FanMode::Full,
            2 => FanMode::Optimal,
            4 => FanMode::HeavyIo,
            other => FanMode::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            FanMode::Standard => 0,
            FanMode::Full => 1,
            FanMode::Optimal => 2,
            FanMode::HeavyIo => 4,
            FanMode::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanMode::Standard => write!(f, "Standard"),
            FanMode::Full => write!(f, "Full"),
            FanMode::Optimal => write!(f, "Optimal"),
            FanMode::HeavyIo => write!(f, "HeavyIO"),
            FanMode::Unknown(code) => write!(f, "Unknown(0x{:02x})", code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinState {
    Spinning,
    Standby,
    /// smartctl failed or produced nothing usable
    Unknown,
}

/// One temperature reading taken during the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub source_id: String,
    pub temperature: Option<i32>,
    pub spin: SpinState,
}

impl SensorSample {
    pub fn spinning(source_id: impl Into<String>, temperature: i32) -> Self {
        Self { source_id: source_id.into(), temperature: Some(temperature), spin: SpinState::Spinning }
    }

    pub fn standby(source_id: impl Into<String>) -> Self {
        Self { source_id: source_id.into(), temperature: None, spin: SpinState::Standby }
    }

    pub fn unavailable(source_id: impl Into<String>) -> Self {
        Self { source_id: source_id.into(), temperature: None, spin: SpinState::Unknown }
    }

    /// Temperature that may take part in the drive regulator's mean and max.
    pub fn valid_temperature(&self) -> Option<i32> {
        match self.spin {
            SpinState::Spinning => self.temperature,
            _ => None,
        }
    }
}

/// Request to drive a zone at a given duty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCommand {
    pub zone: Zone,
    pub duty_percent: u8,
}

/// Single row of `ipmitool -c sdr list full`.
#[derive(Debug, Clone, PartialEq)]
pub struct SdrReading {
    pub name: String,
    pub value: Option<f64>,
    pub unit: String,
    pub status: String,
}

/// Parsed SDR snapshot. One of these is fetched per logical cycle and shared by every consumer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorTable {
    pub readings: Vec<SdrReading>,
}

impl SensorTable {
    fn find(&self, name: &str) -> Option<&SdrReading> {
        self.readings.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Temperature in whole degrees Celsius of the named sensor.
    pub fn temperature(&self, name: &str) -> Option<i32> {
        self.find(name)
            .filter(|r| r.unit.contains("degrees C"))
            .and_then(|r| r.value)
            .map(|v| v.round() as i32)
    }

    pub fn fan_rpm(&self, name: &str) -> Option<u32> {
        self.find(name)
            .filter(|r| r.unit.contains("RPM"))
            .and_then(|r| r.value)
            .filter(|v| *v >= 0.0)
            .map(|v| v.round() as u32)
    }

    pub fn fan_names(&self) -> impl Iterator<Item = &str> {
        self.readings.iter().filter(|r| r.unit.contains("RPM")).map(|r| r.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
