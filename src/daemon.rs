//! Process-level concerns: instance lock, status file, systemd unit.

pub mod lock;
pub mod status;
pub mod systemd;

pub const SYSTEMD_SERVICE_NAME: &str = "nas-fanctl";
pub const SYSTEMD_SERVICE_PATH: &str = "/etc/systemd/system/nas-fanctl.service";

pub const SYSTEMD_SERVICE_TEMPLATE: &str = r#"[Unit]
Description=NAS drive and CPU fan controller
After=local-fs.target

[Service]
Type=simple
ExecStart={{EXEC_PATH}} --config {{CONFIG_PATH}}
Restart=on-failure
RestartSec=10
User=root
WorkingDirectory={{WORK_DIR}}
StandardOutput=journal
StandardError=journal
KillSignal=SIGTERM
TimeoutStopSec=30

[Install]
WantedBy=multi-user.target
"#;
