//! Switch inputs and heater output drivers.

pub mod heater_output;
pub mod input;
