//! Inbound commands to the heater service.
//!
//! These represent actions requested by the outside world (message bus,
//! web API, local console) that the
//! [`HeaterService`](super::service::HeaterService) validates and applies.

use crate::autotune::Aggressiveness;
use crate::config::HeaterConfig;
use crate::mode::ControlMode;

/// Commands that external adapters can send into the heater core.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaterCommand {
    /// Set the requested mode (the mode switch cycles from here).
    SetMode(ControlMode),

    /// Runtime enable / disable; not persisted.
    SetEnabled(bool),

    /// Clear latched faults once no condition is active.
    ResetFaults,

    /// Force an output percentage for a bounded time.
    StartOutputTest { pct: f32, duration_ms: u32 },

    CancelOutputTest,

    /// Validate, persist and apply a complete configuration.
    ApplyConfig(Box<HeaterConfig>),

    StartAutotune {
        auto_save: bool,
        aggressiveness: Aggressiveness,
        /// 0 = regime default.
        max_duration_s: u32,
    },

    AbortAutotune,

    /// Write finished autotune gains into the configuration, persist, apply.
    CommitAutotune,

    /// Return a finished, failed or aborted session to idle.
    DiscardAutotune,
}
