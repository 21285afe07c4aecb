//! DriveTempSource backed by `smartctl -n standby -A`, JSON first with a text fallback.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::hardware::smart::formats::FormatChain;
use crate::hardware::types::{SensorSample, SpinState};
use crate::hardware::DriveTempSource;
use crate::system::executor::{self, ToolOutput};

#[derive(Default)]
pub struct SmartctlDriveSource {
    formats: FormatChain,
}

fn mentions_standby(text: &str) -> bool {
    let upper = text.to_ascii_uppercase();
    upper.contains("STANDBY") || upper.contains("SLEEP MODE")
}

/// A JSON report echoes its own argv (which includes "-n standby"), so only its
/// messages are searched.
fn reports_standby(report: &str) -> bool {
    match serde_json::from_str::<Value>(report) {
        Ok(v) => v["smartctl"]["messages"]
            .as_array()
            .map(|msgs| msgs.iter().filter_map(|m| m["string"].as_str()).any(mentions_standby))
            .unwrap_or(false),
        Err(_) => mentions_standby(report),
    }
}

impl SmartctlDriveSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a smartctl report. Standby wins over any temperature in the report.
    pub fn classify(&self, device: &str, report: &str) -> SensorSample {
        if reports_standby(report) {
            return SensorSample::standby(device);
        }

        match self.formats.extract(report) {
            Some((temp, format)) => {
                trace!("{}: {}°C via {} format", device, temp, format);
                SensorSample { source_id: device.to_string(), temperature: Some(temp), spin: SpinState::Spinning }
            }
            None => SensorSample::unavailable(device),
        }
    }

    fn from_output(&self, device: &str, output: &ToolOutput) -> SensorSample {
        let sample = self.classify(device, &output.stdout);
        if sample.spin == SpinState::Unknown {
            debug!("{}: no temperature in smartctl output (exit {:?})", device, output.exit_code);
        }
        sample
    }
}

#[async_trait]
impl DriveTempSource for SmartctlDriveSource {
    async fn sample(&self, device: &str) -> SensorSample {
        let output = match executor::run_smartctl_attributes(device, true).await {
            Ok(output) if serde_json::from_str::<Value>(&output.stdout).is_ok() => output,
            Ok(_) => {
                // smartctl before 7.0 rejects --json
                debug!("{}: smartctl gave no JSON, retrying with text output", device);
                match executor::run_smartctl_attributes(device, false).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!("{}: {}", device, e);
                        return SensorSample::unavailable(device);
                    }
                }
            }
            Err(e) => {
                warn!("{}: {}", device, e);
                return SensorSample::unavailable(device);
            }
        };
        self.from_output(device, &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_SPINNING: &str = r#"{"json_format_version":[1,0],"smartctl":{"version":[7,3],"argv":["smartctl","--json=c","-n","standby","-A","/dev/sda"],"exit_status":0},"device":{"name":"/dev/sda","type":"sat","protocol":"ATA"},"temperature":{"current":34}}"#;

    const JSON_STANDBY: &str = r#"{"json_format_version":[1,0],"smartctl":{"version":[7,3],"argv":["smartctl","--json=c","-n","standby","-A","/dev/sdb"],"messages":[{"string":"Device is in STANDBY mode, exit(2)","severity":"information"}],"exit_status":2},"device":{"name":"/dev/sdb","type":"sat","protocol":"ATA"}}"#;

    #[test]
    fn test_standby_report() {
        let source = SmartctlDriveSource::new();
        let report = "smartctl 7.2\nDevice is in STANDBY mode, exit(2)\n";
        assert_eq!(source.classify("/dev/sda", report), SensorSample::standby("/dev/sda"));
    }

    #[test]
    fn test_spinning_report() {
        let source = SmartctlDriveSource::new();
        let report = "194 Temperature_Celsius     0x0022   117   094   000    Old_age   Always       -       35\n";
        assert_eq!(source.classify("/dev/sdb", report), SensorSample::spinning("/dev/sdb", 35));
    }

    #[test]
    fn test_json_reports() {
        let source = SmartctlDriveSource::new();
        // argv mentions "standby" but no message does
        assert_eq!(source.classify("/dev/sda", JSON_SPINNING), SensorSample::spinning("/dev/sda", 34));
        assert_eq!(source.classify("/dev/sdb", JSON_STANDBY), SensorSample::standby("/dev/sdb"));
    }

    #[test]
    fn test_unparseable_report() {
        let source = SmartctlDriveSource::new();
        let sample = source.classify("/dev/sdc", "Smartctl open device: /dev/sdc failed: No such device\n");
        assert_eq!(sample.spin, SpinState::Unknown);
        assert_eq!(sample.temperature, None);
    }
}
