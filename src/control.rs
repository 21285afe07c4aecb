//! Regulators, actuator, consistency checking and the loop that drives them.

pub mod actuator;
pub mod consistency;
pub mod controller;
pub mod cpu;
pub mod drive;
pub mod state;
