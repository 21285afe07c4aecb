//! ipmitool-backed fan interface.

pub mod commands;
pub mod ipmi_fan;
