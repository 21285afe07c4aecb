//! IPMI fan interface: implements FanInterface with ipmitool raw/sdr commands.
//! Command bytes come from the config templates; nothing vendor-specific is hardcoded here.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::types::{ControllerConfig, IpmiSettings};
use crate::hardware::ipmi::commands::{interpolate, translate_duty};
use crate::hardware::types::{FanMode, SensorTable, Zone};
use crate::hardware::FanInterface;
use crate::system::{executor, parser};

pub struct IpmiFanInterface {
    settings: IpmiSettings,
    cpu_zone_id: u8,
    peripheral_zone_id: u8,
    dry_run: bool,
    /// Last SDR table; one bulk read serves every consumer within a cycle
    sdr_cache: Mutex<Option<SensorTable>>,
}

impl IpmiFanInterface {
    pub fn new(config: &ControllerConfig, dry_run: bool) -> Self {
        if dry_run {
            info!("Dry run: mutating ipmitool commands will only be logged");
        }
        Self {
            settings: config.ipmi.clone(),
            cpu_zone_id: config.cpu_fans.zone_id,
            peripheral_zone_id: config.drive_fans.zone_id,
            dry_run,
            sdr_cache: Mutex::new(None),
        }
    }

    fn zone_id(&self, zone: Zone) -> u8 {
        match zone {
            Zone::Cpu => self.cpu_zone_id,
            Zone::Peripheral => self.peripheral_zone_id,
        }
    }

    async fn run_mutating_raw(&self, bytes: &str) -> Result<()> {
        if self.dry_run {
            info!("[DRY RUN] Would execute: ipmitool raw {}", bytes);
            return Ok(());
        }
        executor::run_ipmitool_raw(bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl FanInterface for IpmiFanInterface {
    async fn read_fan_mode(&self) -> Result<FanMode> {
        let response = executor::run_ipmitool_raw(&self.settings.commands.get_fan_mode).await?;
        parser::parse_fan_mode(&response).ok_or_else(|| anyhow!("Unparseable fan mode response: {:?}", response.trim()))
    }

    async fn set_fan_mode(&self, mode: FanMode) -> Result<()> {
        let bytes = interpolate(&self.settings.commands.set_fan_mode, None, None, Some(mode.code()));
        info!("Setting BMC fan mode to {} -> ipmitool raw {}", mode, bytes);
        self.run_mutating_raw(&bytes).await
    }

    async fn read_sensor_table(&self) -> Result<SensorTable> {
        let mut cache = self.sdr_cache.lock().await;
        if let Some(ref cached) = *cache {
            debug!("SDR served from cache");
            return Ok(cached.clone());
        }

        let csv = executor::run_ipmitool_sdr_csv().await?;
        let table = parser::parse_sdr_csv(&csv);
        if table.is_empty() {
            // Empty output is the only failure signal some BMCs give; don't cache it
            return Err(anyhow!("ipmitool sdr returned no readings"));
        }
        debug!("SDR read: {} readings", table.readings.len());
        *cache = Some(table.clone());
        Ok(table)
    }

    async fn invalidate_cache(&self) {
        let mut cache = self.sdr_cache.lock().await;
        *cache = None;
    }

    async fn set_duty(&self, zone: Zone, percent: u8) -> Result<()> {
        let duty = translate_duty(percent, self.settings.speed_translation);
        let bytes = interpolate(&self.settings.commands.set_duty, Some(self.zone_id(zone)), Some(&duty), None);
        debug!("Setting {} zone to {}% -> ipmitool raw {}", zone, percent, bytes);
        self.run_mutating_raw(&bytes).await
    }

    async fn read_duty(&self, zone: Zone) -> Result<u8> {
        let bytes = interpolate(&self.settings.commands.get_duty, Some(self.zone_id(zone)), None, None);
        let response = executor::run_ipmitool_raw(&bytes).await?;
        parser::parse_duty_readback(&response)
            .ok_or_else(|| anyhow!("Unparseable duty response for {} zone: {:?}", zone, response.trim()))
    }

    async fn reset_controller(&self) -> Result<()> {
        warn!("Cold-resetting BMC; sensors and fan control will be unavailable until it returns");
        if self.dry_run {
            info!("[DRY RUN] Would execute: ipmitool bmc reset cold");
        } else {
            executor::run_ipmitool_bmc_reset_cold().await?;
        }
        self.invalidate_cache().await;
        Ok(())
    }
}
