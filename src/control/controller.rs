//! The control loop: one drive cycle polls the drives, runs the PD regulator, checks
//! that the fans agree with what was commanded, then runs the nested CPU iterations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::types::ControllerConfig;
use crate::control::actuator::Actuator;
use crate::control::consistency::{CheckAction, CheckState, ConsistencyChecker, Observation, ZoneObservation};
use crate::control::cpu::{coast_down, CpuRegulator};
use crate::control::drive::DriveRegulator;
use crate::control::state::ControlState;
use crate::daemon::status::{write_status, StatusRecord};
use crate::hardware::types::{DutyCommand, FanMode, SensorSample, SensorTable, SpinState, Zone};
use crate::hardware::{DriveTempSource, FanInterface};

pub struct Controller {
    config: ControllerConfig,
    fans: Arc<dyn FanInterface>,
    drive_source: Arc<dyn DriveTempSource>,
    drives: Vec<String>,
    state: ControlState,
    drive_regulator: DriveRegulator,
    cpu_regulator: CpuRegulator,
    actuator: Actuator,
    checker: ConsistencyChecker,
    /// Most recent SDR snapshot, for fan RPMs in the status record
    last_table: Option<SensorTable>,
    drives_valid: usize,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        fans: Arc<dyn FanInterface>,
        drive_source: Arc<dyn DriveTempSource>,
        drives: Vec<String>,
    ) -> Self {
        Self {
            state: ControlState::from_config(&config),
            drive_regulator: DriveRegulator::new(config.drive_period_minutes()),
            cpu_regulator: CpuRegulator::new(&config.cpu),
            actuator: Actuator::new(),
            checker: ConsistencyChecker::new(&config),
            config,
            fans,
            drive_source,
            drives,
            last_table: None,
            drives_valid: 0,
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn consistency_state(&self) -> CheckState {
        self.checker.state()
    }

    fn secs(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    /// Put the BMC into the control mode. Runs once, before the first cycle.
    pub async fn start(&mut self) {
        let mode = self.config.ipmi.control_mode;
        match self.fans.read_fan_mode().await {
            Ok(current) if current == mode => info!("BMC fan mode already {}", current),
            Ok(current) => {
                info!("BMC fan mode is {}, switching to {}", current, mode);
                self.set_control_mode().await;
            }
            Err(e) => {
                warn!("Could not read BMC fan mode ({}), setting {}", e, mode);
                self.set_control_mode().await;
            }
        }
        self.actuator.force_resync_all();
    }

    /// Runs until the future is dropped. Interface errors never end the loop.
    pub async fn run(&mut self) {
        self.start().await;
        loop {
            self.run_drive_cycle().await;
        }
    }

    pub async fn run_drive_cycle(&mut self) {
        let temps = self.drive_phase().await;
        tokio::time::sleep(Self::secs(self.config.timing.fan_settle_secs)).await;
        self.check_phase().await;
        self.log_summary(&temps);
        self.publish_status().await;

        for _ in 0..self.config.cpu_iterations_per_cycle() {
            self.cpu_iteration().await;
            tokio::time::sleep(Self::secs(self.config.timing.cpu_period_secs)).await;
        }
    }

    /// Hand the fans back to the BMC.
    pub async fn shutdown(&self) {
        let mode = self.config.ipmi.exit_fan_mode;
        info!("Restoring BMC fan mode {}", mode);
        if let Err(e) = self.fans.set_fan_mode(mode).await {
            error!("Failed to restore fan mode {}: {}", mode, e);
        }
    }

    async fn set_control_mode(&self) {
        if let Err(e) = self.fans.set_fan_mode(self.config.ipmi.control_mode).await {
            warn!("Failed to set fan mode {}: {}", self.config.ipmi.control_mode, e);
        }
    }

    async fn apply(&mut self, cmd: DutyCommand) {
        self.actuator.apply(self.fans.as_ref(), cmd).await;
    }

    async fn poll_drives(&self) -> Vec<SensorSample> {
        let mut samples = Vec::with_capacity(self.drives.len());
        for drive in &self.drives {
            samples.push(self.drive_source.sample(drive).await);
        }
        samples
    }

    /// Fresh SDR read for a new logical cycle.
    async fn refresh_table(&mut self) -> Option<SensorTable> {
        self.fans.invalidate_cache().await;
        match self.fans.read_sensor_table().await {
            Ok(table) => {
                self.last_table = Some(table.clone());
                Some(table)
            }
            Err(e) => {
                warn!("SDR read failed: {}", e);
                None
            }
        }
    }

    /// Returns the per-drive temperature column for the cycle summary.
    async fn drive_phase(&mut self) -> String {
        let samples = self.poll_drives().await;
        let update = self.drive_regulator.update(&mut self.state, &samples);
        self.drives_valid = update.stats.map(|s| s.count).unwrap_or(0);

        let temps: Vec<String> = samples
            .iter()
            .map(|s| match (s.valid_temperature(), s.spin) {
                (Some(t), _) => t.to_string(),
                (None, SpinState::Standby) => "*".to_string(),
                (None, _) => "?".to_string(),
            })
            .collect();

        match update.stats {
            Some(_) => debug!(
                "err {:.2} P {:.2} D {:.2} delta {} | drive fans {}% -> {}%",
                update.error, update.proportional, update.derivative, update.delta,
                update.previous_duty, update.duty
            ),
            None => warn!(
                "No valid drive temperatures; drive fans {}% -> {}% (minimum)",
                update.previous_duty, update.duty
            ),
        }

        if let Some(cmd) = update.command {
            self.apply(cmd).await;
        }
        temps.join(" ")
    }

    fn log_summary(&self, temps: &str) {
        let status = self.status_record();
        let deg = |v: Option<String>| v.map(|t| format!("{}°C", t)).unwrap_or_else(|| "n/a".to_string());
        let rpm = |v: Option<u32>| v.map(|r| r.to_string()).unwrap_or_else(|| "?".to_string());
        info!(
            "Drives [{}] mean {} max {} | CPU {} | drive fans {}% ({} RPM) | CPU fans {}% ({} RPM)",
            temps,
            deg(status.mean_drive_temp.map(|m| format!("{:.2}", m))),
            deg(status.max_drive_temp.map(|m| m.to_string())),
            deg(status.cpu_temp.map(|c| c.to_string())),
            status.drive_duty,
            rpm(status.peripheral_fan_rpm),
            status.cpu_duty,
            rpm(status.cpu_fan_rpm),
        );
    }

    async fn observe(&mut self) -> Observation {
        let table = self.refresh_table().await;

        let fan_mode: Option<FanMode> = match self.fans.read_fan_mode().await {
            Ok(mode) => Some(mode),
            Err(e) => {
                debug!("Fan mode unavailable: {}", e);
                None
            }
        };

        let mut zones = Vec::with_capacity(Zone::ALL.len());
        for zone in Zone::ALL {
            // Nothing sent to this zone yet; its fans still run whatever the BMC chose
            if self.actuator.last_applied(zone).is_none() {
                continue;
            }
            let commanded = match zone {
                Zone::Cpu => self.state.cpu_duty,
                Zone::Peripheral => self.state.drive_duty,
            };
            let rpm = table.as_ref().and_then(|t| t.fan_rpm(&self.config.zone(zone).fan_sensor));
            let readback = if self.config.consistency.verify_duty_readback {
                self.fans.read_duty(zone).await.ok()
            } else {
                None
            };
            zones.push(ZoneObservation { zone, commanded, rpm, readback });
        }

        Observation { fan_mode, zones }
    }

    /// Re-assert fan mode and both duties. With `reset`, cold-reset the BMC first.
    async fn correct(&mut self, reset: bool) {
        if reset {
            if let Err(e) = self.fans.reset_controller().await {
                error!("BMC cold reset failed: {}", e);
            }
            tokio::time::sleep(Self::secs(self.config.timing.bmc_reset_wait_secs)).await;
        }

        self.set_control_mode().await;
        self.actuator.force_resync_all();
        let cpu = DutyCommand { zone: Zone::Cpu, duty_percent: self.state.cpu_duty };
        let peripheral = DutyCommand { zone: Zone::Peripheral, duty_percent: self.state.drive_duty };
        self.apply(cpu).await;
        self.apply(peripheral).await;
        tokio::time::sleep(Self::secs(self.config.timing.fan_settle_secs)).await;
    }

    async fn check_phase(&mut self) {
        let mut observation = self.observe().await;
        if !self.config.consistency.enabled {
            return;
        }

        // Terminates: at most max_retries retries, one escalation, then Accept/None
        loop {
            let mismatches = self.checker.find_mismatches(&observation);
            for m in &mismatches {
                warn!("Fan mismatch: {}", m);
            }

            match self.checker.observe(!mismatches.is_empty()) {
                CheckAction::None => {
                    if !mismatches.is_empty() {
                        debug!("Mismatch tolerated (state {})", self.checker.state());
                    }
                    break;
                }
                CheckAction::Retry { attempt } => {
                    warn!("Correcting fan state, attempt {}/{}", attempt, self.config.consistency.max_retries);
                    self.correct(false).await;
                }
                CheckAction::Escalate => {
                    error!(
                        "Fan state still wrong after {} corrections; cold-resetting BMC",
                        self.config.consistency.max_retries
                    );
                    self.correct(true).await;
                }
                CheckAction::Accept => {
                    error!("Fan mismatch persists after BMC reset; continuing in degraded state");
                    break;
                }
            }
            observation = self.observe().await;
        }
    }

    async fn cpu_iteration(&mut self) {
        let cpu_temp = match self.refresh_table().await {
            Some(table) => table.temperature(&self.config.cpu.temp_sensor),
            None => None,
        };
        if cpu_temp.is_none() {
            debug!("No CPU temperature this iteration; holding CPU fans at {}%", self.state.cpu_duty);
        }

        if let Some(cmd) = self.cpu_regulator.update(&mut self.state, cpu_temp) {
            info!("CPU {}°C -> CPU fans {}%", cpu_temp.unwrap_or_default(), cmd.duty_percent);
            self.apply(cmd).await;
        }

        if self.config.coast_down {
            if let Some(cmd) = coast_down(&mut self.state) {
                info!("Drives cooling; coasting drive fans down to {}%", cmd.duty_percent);
                self.apply(cmd).await;
            }
        }

        self.publish_status().await;
    }

    pub fn status_record(&self) -> StatusRecord {
        let rpm = |zone: Zone| {
            self.last_table
                .as_ref()
                .and_then(|t| t.fan_rpm(&self.config.zone(zone).fan_sensor))
        };
        let state = self.state();
        StatusRecord {
            timestamp: chrono::Local::now().to_rfc3339(),
            drives_valid: self.drives_valid,
            drives_total: self.drives.len(),
            max_drive_temp: state.last_max_temp,
            mean_drive_temp: state.last_mean_temp,
            cpu_temp: state.last_cpu_temp,
            drive_duty: state.drive_duty,
            cpu_duty: state.cpu_duty,
            cpu_fan_rpm: rpm(Zone::Cpu),
            peripheral_fan_rpm: rpm(Zone::Peripheral),
            consistency: self.consistency_state().to_string(),
        }
    }

    async fn publish_status(&self) {
        let path = PathBuf::from(&self.config.status_file);
        if let Err(e) = write_status(&path, &self.status_record()).await {
            warn!("Failed to write status file: {}", e);
        }
    }
}

/// One read of every input, for `--test`.
pub struct SelfTestReport {
    pub samples: Vec<SensorSample>,
    pub table: Option<SensorTable>,
    pub fan_mode: Option<FanMode>,
}

pub async fn self_test(fans: &dyn FanInterface, drive_source: &dyn DriveTempSource, drives: &[String]) -> SelfTestReport {
    let mut samples = Vec::with_capacity(drives.len());
    for drive in drives {
        samples.push(drive_source.sample(drive).await);
    }
    fans.invalidate_cache().await;
    SelfTestReport {
        samples,
        table: fans.read_sensor_table().await.ok(),
        fan_mode: fans.read_fan_mode().await.ok(),
    }
}
