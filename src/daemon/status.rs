//! Status record: a small JSON file overwritten after every regulator update
//! for external monitoring, plus the `--status` printer.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::types::ControllerConfig;
use crate::daemon::lock::{is_locked, read_holder_pid};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub timestamp: String,
    pub drives_valid: usize,
    pub drives_total: usize,
    pub max_drive_temp: Option<i32>,
    pub mean_drive_temp: Option<f64>,
    pub cpu_temp: Option<i32>,
    pub drive_duty: u8,
    pub cpu_duty: u8,
    pub cpu_fan_rpm: Option<u32>,
    pub peripheral_fan_rpm: Option<u32>,
    pub consistency: String,
}

/// Replace the status file atomically (write a sibling temp file, then rename).
pub async fn write_status(path: &Path, record: &StatusRecord) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("tmp");
    let content = serde_json::to_string_pretty(record)?;
    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {:?}", tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}

pub async fn read_status(path: &Path) -> Result<Option<StatusRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path).await?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>, unit: &str) -> String {
    value.map(|v| format!("{}{}", v, unit)).unwrap_or_else(|| "n/a".to_string())
}

pub async fn show_status(config: &ControllerConfig) -> Result<()> {
    println!("\x1b[32mnas-fanctl v{} ({})\x1b[0m", env!("CARGO_PKG_VERSION"), std::env::consts::ARCH);
    println!("================================");

    let lock_path = Path::new(&config.lock_file);
    if is_locked(lock_path) {
        println!("Controller: Running (PID: {})", fmt_opt(read_holder_pid(lock_path), ""));
    } else {
        println!("Controller: Not running");
    }

    match read_status(Path::new(&config.status_file)).await? {
        Some(status) => {
            println!("\nLast update: {}", status.timestamp);
            println!("   Drives:      {}/{} reporting", status.drives_valid, status.drives_total);
            println!(
                "   Drive temp:  max {} / mean {}",
                fmt_opt(status.max_drive_temp, "°C"),
                fmt_opt(status.mean_drive_temp.map(|m| format!("{:.2}", m)), "°C")
            );
            println!("   CPU temp:    {}", fmt_opt(status.cpu_temp, "°C"));
            println!("   Drive fans:  {}% ({})", status.drive_duty, fmt_opt(status.peripheral_fan_rpm, " RPM"));
            println!("   CPU fans:    {}% ({})", status.cpu_duty, fmt_opt(status.cpu_fan_rpm, " RPM"));
            println!("   Consistency: {}", status.consistency);
        }
        None => println!("\nNo status file at {}", config.status_file),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StatusRecord {
        StatusRecord {
            timestamp: "2026-10-19T12:00:00+00:00".to_string(),
            drives_valid: 5,
            drives_total: 6,
            max_drive_temp: Some(39),
            mean_drive_temp: Some(36.8),
            cpu_temp: Some(44),
            drive_duty: 42,
            cpu_duty: 48,
            cpu_fan_rpm: Some(900),
            peripheral_fan_rpm: None,
            consistency: "ok".to_string(),
        }
    }

    #[tokio::test]
    async fn test_write_replaces_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        write_status(&path, &record()).await.unwrap();
        let mut next = record();
        next.drive_duty = 50;
        write_status(&path, &next).await.unwrap();

        assert_eq!(read_status(&path).await.unwrap(), Some(next));
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_status_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_status(&dir.path().join("none.json")).await.unwrap(), None);
    }
}
