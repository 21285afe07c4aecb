//! Drive list resolution: explicit config list, or glob discovery of whole disks.

use std::collections::BTreeSet;

use tracing::{info, warn};

const DISCOVERY_PATTERNS: [&str; 3] = ["/dev/sd[a-z]", "/dev/sd[a-z][a-z]", "/dev/nvme[0-9]*n1"];

/// Devices to poll each drive cycle, sorted and de-duplicated, minus `exclude`.
pub fn resolve_drives(configured: &[String], exclude: &[String]) -> Vec<String> {
    let candidates: BTreeSet<String> = if configured.is_empty() {
        discover(&DISCOVERY_PATTERNS)
    } else {
        configured.iter().cloned().collect()
    };

    let drives: Vec<String> = candidates
        .into_iter()
        .filter(|d| !exclude.iter().any(|e| e == d))
        .collect();

    if drives.is_empty() {
        warn!("No drives to monitor; peripheral fans will sit at their minimum duty");
    } else {
        info!("Monitoring {} drives: {}", drives.len(), drives.join(" "));
    }
    drives
}

fn discover(patterns: &[&str]) -> BTreeSet<String> {
    patterns
        .iter()
        .filter_map(|p| glob::glob(p).ok())
        .flat_map(|paths| paths.filter_map(Result::ok))
        .map(|p| p.to_string_lossy().to_string())
        .collect()
}
