//! Closed-loop heater control.
//!
//! | Module        | Role                                              |
//! |---------------|---------------------------------------------------|
//! | `heater`      | per-tick engine: mode, faults, algorithm, output  |
//! | `pid`         | PID with slope look-ahead and anti-windup         |
//! | `hysteresis`  | deadband on/off                                   |
//! | `output`      | clamp, hold timers, ramp, PWM / window drive      |

pub mod heater;
pub mod hysteresis;
pub mod output;
pub mod pid;

pub use heater::{ControlAuthority, HeaterController, PID_INTERVAL_MS};
