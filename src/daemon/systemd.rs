use std::fs;
use std::path::Path;
use std::process;

use anyhow::{Context, Result};

use crate::daemon::{SYSTEMD_SERVICE_NAME, SYSTEMD_SERVICE_PATH, SYSTEMD_SERVICE_TEMPLATE};

/// Check if systemd is available on this system
pub fn has_systemd() -> bool {
    Path::new("/run/systemd/system").exists()
}

fn require_root(flag: &str) -> Result<()> {
    if unsafe { libc::geteuid() } != 0 {
        return Err(anyhow::anyhow!("Root privileges required. Run with: sudo nas-fanctl {}", flag));
    }
    Ok(())
}

/// Unit file text for a binary at `exe_path` reading `config_path`.
pub fn render_unit(exe_path: &Path, config_path: &Path) -> String {
    let work_dir = exe_path.parent().unwrap_or_else(|| Path::new("/"));
    SYSTEMD_SERVICE_TEMPLATE
        .replace("{{EXEC_PATH}}", &exe_path.to_string_lossy())
        .replace("{{CONFIG_PATH}}", &config_path.to_string_lossy())
        .replace("{{WORK_DIR}}", &work_dir.to_string_lossy())
}

fn systemctl(args: &[&str]) -> bool {
    process::Command::new("systemctl")
        .args(args)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Install or repair the systemd service (idempotent)
pub fn install_systemd_service(config_path: &Path) -> Result<()> {
    require_root("--install-service")?;

    if !has_systemd() {
        println!("❌ systemd not detected on this system.");
        println!("   Run the controller from your init system with: nas-fanctl --config {:?}", config_path);
        return Ok(());
    }

    let exe_path = std::env::current_exe()?;
    let config_path = if config_path.is_absolute() {
        config_path.to_path_buf()
    } else {
        std::env::current_dir()?.join(config_path)
    };
    let service_content = render_unit(&exe_path, &config_path);

    let service_path = Path::new(SYSTEMD_SERVICE_PATH);
    if service_path.exists() {
        if let Ok(existing_content) = fs::read_to_string(service_path) {
            if existing_content == service_content {
                println!("✓ Service is already installed and up-to-date");
                return Ok(());
            }
        }
        println!("! Existing service file found - updating...");
    }

    fs::write(service_path, &service_content).context("Failed to write service file")?;
    println!("✓ Service file created: {}", SYSTEMD_SERVICE_PATH);

    if systemctl(&["daemon-reload"]) {
        println!("✓ Systemd daemon reloaded");
    } else {
        println!("⚠ Failed to reload systemd daemon (run: systemctl daemon-reload)");
    }

    let unit = format!("{}.service", SYSTEMD_SERVICE_NAME);
    if systemctl(&["enable", &unit]) {
        println!("✓ Service enabled (will start on boot)");
    } else {
        println!("⚠ Failed to enable service (run: systemctl enable {})", unit);
    }

    println!();
    println!("Start now with: sudo systemctl start {}", SYSTEMD_SERVICE_NAME);
    Ok(())
}

/// Stop, disable and remove the systemd service
pub fn uninstall_systemd_service() -> Result<()> {
    require_root("--uninstall-service")?;

    if !has_systemd() {
        println!("❌ systemd not detected on this system.");
        return Ok(());
    }

    let service_path = Path::new(SYSTEMD_SERVICE_PATH);
    if !service_path.exists() {
        println!("✓ Service is not installed");
        return Ok(());
    }

    // Stopping hands the fans back to the BMC through the controller's shutdown path
    systemctl(&["stop", SYSTEMD_SERVICE_NAME]);
    println!("✓ Service stopped");

    systemctl(&["disable", SYSTEMD_SERVICE_NAME]);
    println!("✓ Service disabled");

    fs::remove_file(service_path)?;
    println!("✓ Service file removed");

    systemctl(&["daemon-reload"]);
    println!("✓ Systemd daemon reloaded");

    Ok(())
}
