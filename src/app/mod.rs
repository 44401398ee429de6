//! Application core: the heater domain behind port traits.
//!
//! This module wires the control engine and the autotune session into one
//! service. All interaction with hardware and storage happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
