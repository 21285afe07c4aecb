//! In-memory FanInterface / DriveTempSource for exercising the control loop without a BMC.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::hardware::types::{FanMode, SdrReading, SensorSample, SensorTable, Zone};
use crate::hardware::{DriveTempSource, FanInterface};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ReadFanMode,
    SetFanMode(FanMode),
    ReadSensorTable,
    SetDuty(Zone, u8),
    ReadDuty(Zone),
    Reset,
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    fan_mode: Option<FanMode>,
    cpu_temp: Option<f64>,
    /// Fan RPMs handed out by successive SDR reads; the last one repeats
    rpm_script: VecDeque<(Option<u32>, Option<u32>)>,
    duties: HashMap<Zone, u8>,
    /// Duty read back per zone instead of the last one set; the last value repeats
    readback_script: HashMap<Zone, VecDeque<u8>>,
    cache: Option<SensorTable>,
    fail_set_duty: bool,
}

/// Reports CPU temp as "CPU Temp", CPU fan as "FAN1" and peripheral fan as "FANA".
pub struct MockFanInterface {
    state: Mutex<MockState>,
}

impl MockFanInterface {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                fan_mode: Some(FanMode::Full),
                cpu_temp: Some(40.0),
                rpm_script: VecDeque::from(vec![(Some(1000), Some(1000))]),
                ..Default::default()
            }),
        }
    }

    pub fn set_cpu_temp(&self, temp: Option<f64>) {
        self.state.lock().unwrap().cpu_temp = temp;
    }

    pub fn set_fan_mode_reading(&self, mode: Option<FanMode>) {
        self.state.lock().unwrap().fan_mode = mode;
    }

    /// (cpu fan rpm, peripheral fan rpm) per SDR read
    pub fn script_rpm(&self, script: Vec<(Option<u32>, Option<u32>)>) {
        self.state.lock().unwrap().rpm_script = script.into();
    }

    pub fn script_readback(&self, zone: Zone, values: Vec<u8>) {
        self.state.lock().unwrap().readback_script.insert(zone, values.into());
    }

    pub fn fail_set_duty(&self, fail: bool) {
        self.state.lock().unwrap().fail_set_duty = fail;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn set_duty_calls(&self) -> Vec<(Zone, u8)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetDuty(zone, duty) => Some((zone, duty)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }
}

#[async_trait]
impl FanInterface for MockFanInterface {
    async fn read_fan_mode(&self) -> Result<FanMode> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ReadFanMode);
        state.fan_mode.ok_or_else(|| anyhow!("no fan mode"))
    }

    async fn set_fan_mode(&self, mode: FanMode) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SetFanMode(mode));
        state.fan_mode = Some(mode);
        Ok(())
    }

    async fn read_sensor_table(&self) -> Result<SensorTable> {
        let mut state = self.state.lock().unwrap();
        if let Some(cached) = state.cache.clone() {
            return Ok(cached);
        }
        state.calls.push(Call::ReadSensorTable);

        let (cpu_rpm, hd_rpm) = if state.rpm_script.len() > 1 {
            state.rpm_script.pop_front().unwrap_or_default()
        } else {
            state.rpm_script.front().copied().unwrap_or_default()
        };

        let reading = |name: &str, value: Option<f64>, unit: &str| SdrReading {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            status: "ok".to_string(),
        };
        let table = SensorTable {
            readings: vec![
                reading("CPU Temp", state.cpu_temp, "degrees C"),
                reading("FAN1", cpu_rpm.map(f64::from), "RPM"),
                reading("FANA", hd_rpm.map(f64::from), "RPM"),
            ],
        };
        state.cache = Some(table.clone());
        Ok(table)
    }

    async fn invalidate_cache(&self) {
        self.state.lock().unwrap().cache = None;
    }

    async fn set_duty(&self, zone: Zone, percent: u8) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SetDuty(zone, percent));
        if state.fail_set_duty {
            return Err(anyhow!("ipmitool raw failed"));
        }
        state.duties.insert(zone, percent);
        Ok(())
    }

    async fn read_duty(&self, zone: Zone) -> Result<u8> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ReadDuty(zone));
        if let Some(script) = state.readback_script.get_mut(&zone) {
            let value = if script.len() > 1 { script.pop_front() } else { script.front().copied() };
            if let Some(value) = value {
                return Ok(value);
            }
        }
        state.duties.get(&zone).copied().ok_or_else(|| anyhow!("no duty"))
    }

    async fn reset_controller(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Reset);
        state.cache = None;
        Ok(())
    }
}

/// Drive source replaying one batch of samples per drive cycle; the last batch repeats.
pub struct MockDriveSource {
    batches: Mutex<VecDeque<HashMap<String, SensorSample>>>,
}

impl MockDriveSource {
    pub fn new(batches: Vec<Vec<SensorSample>>) -> Self {
        let batches = batches
            .into_iter()
            .map(|batch| batch.into_iter().map(|s| (s.source_id.clone(), s)).collect())
            .collect();
        Self { batches: Mutex::new(batches) }
    }

    /// Move to the next batch (called once per drive cycle by the test).
    pub fn advance(&self) {
        let mut batches = self.batches.lock().unwrap();
        if batches.len() > 1 {
            batches.pop_front();
        }
    }
}

#[async_trait]
impl DriveTempSource for MockDriveSource {
    async fn sample(&self, device: &str) -> SensorSample {
        self.batches
            .lock()
            .unwrap()
            .front()
            .and_then(|batch| batch.get(device).cloned())
            .unwrap_or_else(|| SensorSample::unavailable(device))
    }
}
