//! nas-fanctl entry point: CLI dispatch, instance lock, signal handlers, control loop.

mod app;
mod config;
mod control;
mod daemon;
mod hardware;
mod system;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use app::cli::Args;
use app::logging::{filter_for_level, init_tracing, reload_level};
use config::persistence::{load_config, resolve_config_path, save_config};
use config::types::ControllerConfig;
use control::controller::{self_test, Controller};
use daemon::lock::InstanceLock;
use daemon::status::show_status;
use daemon::systemd::{install_systemd_service, uninstall_systemd_service};
use hardware::smart::discovery::resolve_drives;
use hardware::{DriveTempSource, FanInterface, IpmiFanInterface, SmartctlDriveSource};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Priority: 1. --log-level flag, 2. LOG_LEVEL env, 3. config file, 4. default (info)
    let explicit_level = args.log_level.clone().or_else(|| std::env::var("LOG_LEVEL").ok());
    let initial_filter = match explicit_level.as_deref() {
        Some(level) => filter_for_level(level).unwrap_or_else(|| {
            eprintln!("Invalid log level '{}'. Using INFO. Valid levels: TRACE, DEBUG, INFO, WARN, ERROR", level);
            "info"
        }),
        None => "info",
    };
    init_tracing(initial_filter);

    let config_path = resolve_config_path(args.config.as_deref())?;

    if args.uninstall_service {
        return uninstall_systemd_service();
    }
    if args.install_service {
        return install_systemd_service(&config_path);
    }

    let config = load_config(&config_path).await?;

    if explicit_level.is_none() {
        match filter_for_level(&config.log_level) {
            Some(filter) => {
                reload_level(filter);
            }
            None => warn!("Unknown log_level '{}' in config, keeping INFO", config.log_level),
        }
    }

    if args.status {
        return show_status(&config).await;
    }

    if args.check_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        println!("\n✓ Configuration is valid ({:?})", config_path);
        return Ok(());
    }

    if args.init_config {
        return save_config(&config, &config_path).await;
    }

    // Nothing touches the BMC before the lock is held
    let lock = InstanceLock::acquire(Path::new(&config.lock_file))?;

    let fans: Arc<dyn FanInterface> = Arc::new(IpmiFanInterface::new(&config, args.dry_run));
    let drive_source: Arc<dyn DriveTempSource> = Arc::new(SmartctlDriveSource::new());
    let drives = resolve_drives(&config.drives, &config.exclude_drives);

    if args.test {
        return run_test_pass(fans.as_ref(), drive_source.as_ref(), &drives, &config).await;
    }

    info!(
        "nas-fanctl v{} starting: {} drives, setpoint {}°C, drive period {}s, CPU period {}s{}",
        env!("CARGO_PKG_VERSION"),
        drives.len(),
        config.pid.setpoint,
        config.timing.drive_period_secs,
        config.timing.cpu_period_secs,
        if args.dry_run { " (dry run)" } else { "" }
    );

    spawn_log_level_reloader(config_path.clone())?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut controller = Controller::new(config, fans, drive_source, drives);

    tokio::select! {
        _ = controller.run() => {}
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received (Ctrl+C)"),
        _ = sigterm.recv() => info!("Shutdown signal received (SIGTERM)"),
    }

    controller.shutdown().await;
    info!("Controller stopped, releasing {:?}", lock.path());
    drop(lock);
    Ok(())
}

/// SIGHUP re-reads the config file and applies its log level.
fn spawn_log_level_reloader(config_path: PathBuf) -> Result<()> {
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        loop {
            sighup.recv().await;
            info!("SIGHUP received, reloading log level configuration");

            match load_config(&config_path).await {
                Ok(new_config) => match filter_for_level(&new_config.log_level) {
                    Some(filter) if reload_level(filter) => {
                        info!("Log level reloaded: {}", new_config.log_level.to_uppercase())
                    }
                    Some(_) => error!("Failed to reload log level"),
                    None => warn!("Unknown log_level '{}', keeping current level", new_config.log_level),
                },
                Err(e) => error!("Failed to reload config: {:#}", e),
            }
        }
    });
    Ok(())
}

async fn run_test_pass(
    fans: &dyn FanInterface,
    drive_source: &dyn DriveTempSource,
    drives: &[String],
    config: &ControllerConfig,
) -> Result<()> {
    info!("Running in test mode");
    let report = self_test(fans, drive_source, drives).await;

    println!("Drives ({}):", report.samples.len());
    for sample in &report.samples {
        match sample.valid_temperature() {
            Some(t) => println!("   {:<16} {}°C", sample.source_id, t),
            None => println!("   {:<16} {:?}", sample.source_id, sample.spin),
        }
    }

    match &report.table {
        Some(table) => {
            let cpu = table.temperature(&config.cpu.temp_sensor);
            println!("CPU temp ({}): {}", config.cpu.temp_sensor, cpu.map(|t| format!("{}°C", t)).unwrap_or("n/a".into()));
            println!("Fans:");
            for name in table.fan_names() {
                let rpm = table.fan_rpm(name).map(|r| format!("{} RPM", r)).unwrap_or("n/a".into());
                println!("   {:<16} {}", name, rpm);
            }
        }
        None => println!("SDR: unavailable"),
    }

    match report.fan_mode {
        Some(mode) => println!("BMC fan mode: {}", mode),
        None => println!("BMC fan mode: unavailable"),
    }

    if report.table.is_none() {
        return Err(anyhow::anyhow!("Could not read the BMC sensor repository"));
    }
    Ok(())
}
