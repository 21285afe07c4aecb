//! smartctl-backed drive temperature source.

pub mod discovery;
pub mod formats;
pub mod smartctl_source;
