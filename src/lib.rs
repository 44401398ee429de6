//! FrostGuard battery heater controller library.
//!
//! Exposes the pure-logic core (control engine, fault supervision, autotune)
//! behind port traits, plus the host adapters used by the simulator and the
//! integration tests.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod autotune;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod mode;
pub mod pins;
pub mod safety;
pub mod sensors;
