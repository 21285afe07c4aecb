//! ipmitool / smartctl subprocess executor.
//! Respects NAS_FANCTL_IPMI_HOST to route ipmitool over LAN (emulator or remote BMC).

use anyhow::{anyhow, Context, Result};
use tracing::{debug, trace};

/// Raw output of a finished tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub exit_code: Option<i32>,
}

/// Build an ipmitool Command with the correct interface flags.
/// If NAS_FANCTL_IPMI_HOST is set, routes via LAN to a remote BMC.
/// Otherwise, uses the local /dev/ipmi0 interface.
pub fn build_ipmitool_command() -> std::process::Command {
    let mut cmd = std::process::Command::new("ipmitool");

    if let Ok(host) = std::env::var("NAS_FANCTL_IPMI_HOST") {
        let port = std::env::var("NAS_FANCTL_IPMI_PORT").unwrap_or_else(|_| "623".to_string());
        let user = std::env::var("NAS_FANCTL_IPMI_USER").unwrap_or_else(|_| "ADMIN".to_string());
        let pass = std::env::var("NAS_FANCTL_IPMI_PASS").unwrap_or_else(|_| "ADMIN".to_string());
        debug!("IPMI routing to remote BMC: {}:{}", host, port);
        cmd.args(["-I", "lanplus", "-H", &host, "-p", &port, "-U", &user, "-P", &pass]);
    } else {
        cmd.args(["-I", "open"]);
    }

    cmd
}

async fn run_checked(cmd: std::process::Command, what: &str) -> Result<String> {
    let output = tokio::process::Command::from(cmd)
        .output()
        .await
        .with_context(|| format!("Failed to execute {}", what))?;

    if !output.status.success() {
        return Err(anyhow!("{} failed: {}", what, String::from_utf8_lossy(&output.stderr).trim()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Execute `ipmitool -c sdr list full` and return the CSV output.
pub async fn run_ipmitool_sdr_csv() -> Result<String> {
    let mut cmd = build_ipmitool_command();
    cmd.args(["-c", "sdr", "list", "full"]);

    trace!("Executing: ipmitool {:?}", cmd.get_args().collect::<Vec<_>>());
    run_checked(cmd, "ipmitool sdr").await
}

/// Execute `ipmitool raw <bytes>` for OEM commands (fan mode, zone duty).
pub async fn run_ipmitool_raw(bytes: &str) -> Result<String> {
    let mut cmd = build_ipmitool_command();
    cmd.arg("raw");
    for byte in bytes.split_whitespace() {
        cmd.arg(byte);
    }

    debug!("Executing: ipmitool raw {}", bytes);
    run_checked(cmd, "ipmitool raw").await
}

/// Execute `ipmitool bmc reset cold`. The BMC is unreachable for a while afterwards.
pub async fn run_ipmitool_bmc_reset_cold() -> Result<String> {
    let mut cmd = build_ipmitool_command();
    cmd.args(["bmc", "reset", "cold"]);

    debug!("Executing: ipmitool bmc reset cold");
    run_checked(cmd, "ipmitool bmc reset cold").await
}

/// Execute `smartctl [--json=c] -n standby -A <device>`.
///
/// smartctl encodes drive state in its exit status bits (and exits 2 for a drive
/// in standby), so the output is returned regardless of the exit status.
pub async fn run_smartctl_attributes(device: &str, json: bool) -> Result<ToolOutput> {
    let mut cmd = std::process::Command::new("smartctl");
    if json {
        cmd.arg("--json=c");
    }
    cmd.args(["-n", "standby", "-A", device]);

    trace!("Executing: smartctl {:?}", cmd.get_args().collect::<Vec<_>>());

    let output = tokio::process::Command::from(cmd)
        .output()
        .await
        .with_context(|| format!("Failed to execute smartctl for {}", device))?;

    Ok(ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        exit_code: output.status.code(),
    })
}
