//! Command-line argument definitions (clap).

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "nas-fanctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Drive and CPU temperature fan controller for IPMI storage servers", long_about = None)]
pub struct Args {
    /// Config file (default: config.json next to the executable)
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<String>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log fan commands instead of sending them
    #[arg(long = "dry-run", help_heading = "Control")]
    pub dry_run: bool,

    // === Diagnostics ===
    /// Read every sensor once, print the results and exit
    #[arg(long, help_heading = "Diagnostics")]
    pub test: bool,

    /// Show controller status
    #[arg(short = 'i', long, help_heading = "Diagnostics")]
    pub status: bool,

    /// Validate the configuration and print it as JSON
    #[arg(long = "check-config", help_heading = "Diagnostics")]
    pub check_config: bool,

    /// Write the effective configuration (defaults filled in) to the config path
    #[arg(long = "init-config", help_heading = "Diagnostics")]
    pub init_config: bool,

    // === Service ===
    /// Install systemd service for auto-start on boot
    #[arg(short = 'I', long = "install-service", help_heading = "Service")]
    pub install_service: bool,

    /// Uninstall systemd service
    #[arg(short = 'U', long = "uninstall-service", help_heading = "Service")]
    pub uninstall_service: bool,
}
