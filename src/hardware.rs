//! Hardware seams: the BMC fan/sensor interface and the per-drive temperature source.

use anyhow::Result;
use async_trait::async_trait;

pub mod ipmi;
pub mod smart;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use ipmi::ipmi_fan::IpmiFanInterface;
pub use smart::smartctl_source::SmartctlDriveSource;

use types::{FanMode, SensorSample, SensorTable, Zone};

/// BMC fan controller and sensor repository.
///
/// Every call is synchronous from the loop's point of view and may take seconds.
#[async_trait]
pub trait FanInterface: Send + Sync {
    async fn read_fan_mode(&self) -> Result<FanMode>;

    async fn set_fan_mode(&self, mode: FanMode) -> Result<()>;

    /// Bulk SDR read. Cached until `invalidate_cache` is called.
    async fn read_sensor_table(&self) -> Result<SensorTable>;

    /// Drop the cached SDR table (call at the start of every logical cycle)
    async fn invalidate_cache(&self);

    async fn set_duty(&self, zone: Zone, percent: u8) -> Result<()>;

    async fn read_duty(&self, zone: Zone) -> Result<u8>;

    /// Cold reset of the BMC
    async fn reset_controller(&self) -> Result<()>;
}

/// Per-device temperature and spin state. Never fails: problems become an unavailable sample.
#[async_trait]
pub trait DriveTempSource: Send + Sync {
    async fn sample(&self, device: &str) -> SensorSample;
}
