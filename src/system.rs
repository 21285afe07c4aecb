//! Subprocess plumbing for the external tools (ipmitool, smartctl) and their output parsers.

pub mod executor;
pub mod parser;
